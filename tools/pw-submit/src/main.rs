//! pw-submit: submit a platform document write exactly once.
//!
//! Signed bytes are cached in `--store` before broadcast. Running the same
//! command again after a timeout replays them instead of signing anew.
//!
//! Exit codes: `0` confirmed, `1` rejected, `2` outcome unknown (run again).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use shared_crypto::Ed25519KeyPair;
use tracing::info;
use tracing_subscriber::EnvFilter;

use write_submitter::{
    ContractId, FieldValue, FileBackedPendingStore, IdempotentWriteSubmitter, IdentityId,
    JsonRpcWriteChannel, SequencedWriteChannel, SimulatedPlatform, SubmitterConfig, WriteResult,
    WriteSpec, WriteSubmitterApi,
};

/// pw-submit: exactly-once platform document writes
#[derive(Parser, Debug)]
#[command(name = "pw-submit")]
#[command(about = "Submit a signed document write, replaying cached bytes after a timeout")]
struct Args {
    /// JSON-RPC gateway endpoint URL
    #[arg(short, long, default_value = "http://127.0.0.1:26657")]
    endpoint: String,

    /// Pending-write cache file
    #[arg(long, default_value = "pw-pending.bin")]
    store: PathBuf,

    /// Use an in-process simulated platform instead of the gateway
    #[arg(long)]
    simulate: bool,

    /// Data contract id (64 hex chars)
    #[arg(long)]
    contract: Option<String>,

    /// Document type within the contract
    #[arg(long, default_value = "note")]
    collection: String,

    /// Ed25519 signing seed (64 hex chars)
    #[arg(long, env = "PW_SIGNING_SEED", hide_env_values = true)]
    owner_seed: Option<String>,

    /// Document field as key=value (repeatable)
    #[arg(long = "field", value_parser = parse_field)]
    fields: Vec<(String, FieldValue)>,

    /// Retry ambiguous outcomes with backoff
    #[arg(long)]
    retry: bool,

    /// Print cached pending writes and exit
    #[arg(long)]
    list_pending: bool,

    /// Evict expired cache entries and exit
    #[arg(long)]
    purge_expired: bool,
}

/// Parse `key=value`. Integers and booleans are typed, anything else is text.
fn parse_field(raw: &str) -> Result<(String, FieldValue), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{}`", raw))?;
    if name.is_empty() {
        return Err("field name is empty".to_string());
    }
    Ok((name.to_string(), parse_value(value)))
}

fn parse_value(value: &str) -> FieldValue {
    if let Ok(i) = value.parse::<i64>() {
        return FieldValue::Integer(i);
    }
    match value {
        "true" => FieldValue::Bool(true),
        "false" => FieldValue::Bool(false),
        _ => FieldValue::Text(value.to_string()),
    }
}

fn exit_code(result: &WriteResult) -> ExitCode {
    match result {
        WriteResult::Confirmed(_) => ExitCode::SUCCESS,
        WriteResult::Rejected(_) => ExitCode::from(1),
        WriteResult::Ambiguous(_) => ExitCode::from(2),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = SubmitterConfig::from_env();
    config.validate().context("invalid submitter configuration")?;

    let key = args
        .owner_seed
        .as_deref()
        .map(Ed25519KeyPair::from_seed_hex)
        .transpose()
        .context("invalid --owner-seed")?;

    let channel: Arc<dyn SequencedWriteChannel> = if args.simulate {
        let platform = SimulatedPlatform::new();
        if let Some(key) = &key {
            platform.register_identity(&key.public_key());
        }
        info!("[pw-submitter] Using simulated platform");
        Arc::new(platform)
    } else {
        Arc::new(
            JsonRpcWriteChannel::new(&args.endpoint)
                .with_context(|| format!("cannot create client for {}", args.endpoint))?,
        )
    };

    let store = FileBackedPendingStore::open(&args.store)
        .with_context(|| format!("cannot open pending store {}", args.store.display()))?;
    let submitter = IdempotentWriteSubmitter::new(channel, Arc::new(store), config.clone());

    if args.list_pending {
        println!("{}", serde_json::to_string_pretty(&submitter.pending_writes())?);
        return Ok(ExitCode::SUCCESS);
    }

    if args.purge_expired {
        let removed = submitter.purge_expired();
        println!("{}", serde_json::json!({ "removed": removed }));
        return Ok(ExitCode::SUCCESS);
    }

    let key = key.ok_or_else(|| anyhow!("--owner-seed or PW_SIGNING_SEED is required"))?;
    let contract = args
        .contract
        .as_deref()
        .ok_or_else(|| anyhow!("--contract is required"))?;
    let contract = ContractId::from_hex(contract)
        .ok_or_else(|| anyhow!("--contract must be 64 hex characters"))?;

    let owner = IdentityId::from_public_key(&key.public_key());
    let spec = args
        .fields
        .into_iter()
        .fold(WriteSpec::create(contract, args.collection, owner), |spec, (name, value)| {
            spec.field(name, value)
        });
    info!(
        "[pw-submitter] Submitting {} to {}",
        spec.operation_id(),
        if args.simulate { "simulated platform" } else { args.endpoint.as_str() }
    );

    let result = if args.retry {
        submitter.submit_with_retry(&spec, &key, &config.retry).await
    } else {
        submitter.submit_write(&spec, &key).await
    };

    if let WriteResult::Rejected(reason) = &result {
        eprintln!("{}", reason.user_message());
    }
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(exit_code(&result))
}
