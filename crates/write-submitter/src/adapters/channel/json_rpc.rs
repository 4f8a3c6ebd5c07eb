//! JSON-RPC 2.0 channel to a platform gateway.
//!
//! | Method | Params | Result |
//! |--------|--------|--------|
//! | `platform_getWriteStatus` | `[operation_id, document_id]` | `null` or `WriteStatus` |
//! | `platform_getIdentityNonce` | `[identity]` | last used nonce (`u64`) |
//! | `platform_broadcastStateTransition` | `[payload_hex]` | `{"status": "accepted" \| "alreadyProcessed"}` |
//! | `platform_waitForStateTransitionResult` | `[transition_hash, timeout_ms]` | `WriteStatus` |
//!
//! Ids and payloads are lowercase hex.

use crate::domain::{
    ChannelError, ConfirmationSource, ConfirmedWrite, DocumentId, IdentityId, OperationId,
    RejectionReason, SignedPayload,
};
use crate::ports::outbound::{BroadcastAck, SequencedWriteChannel};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Signature did not verify.
pub const ERR_INVALID_SIGNATURE: i64 = 1001;
/// Nonce stale or out of order. `data` carries `{expected, actual}`.
pub const ERR_INVALID_NONCE: i64 = 1002;
/// Document failed contract validation.
pub const ERR_SCHEMA_VIOLATION: i64 = 1003;
/// Identity unknown or not permitted.
pub const ERR_UNAUTHORIZED: i64 = 1004;
/// Document already exists or changed.
pub const ERR_DOCUMENT_CONFLICT: i64 = 1005;
/// This exact transition was already processed.
pub const ERR_ALREADY_PROCESSED: i64 = 1006;

const STATUS_ACCEPTED: &str = "accepted";
const STATUS_ALREADY_PROCESSED: &str = "alreadyProcessed";

/// Extra time on top of the confirmation wait for the HTTP round trip.
const CONFIRMATION_SLACK: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize)]
struct JsonRpcRequest<T> {
    jsonrpc: &'static str,
    method: &'static str,
    params: T,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    // Missing and null both decode as None
    result: Option<T>,
    error: Option<JsonRpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Status of an accepted write as reported by the gateway.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteStatus {
    /// Nonce the accepted transition carried.
    #[serde(default)]
    pub nonce: Option<u64>,
    /// Height it was included at.
    #[serde(default)]
    pub block_height: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct BroadcastStatus {
    status: String,
}

#[derive(Debug, Deserialize)]
struct NonceMismatch {
    expected: u64,
    actual: u64,
}

/// `SequencedWriteChannel` over HTTP JSON-RPC.
pub struct JsonRpcWriteChannel {
    client: Client,
    endpoint: String,
    request_id: AtomicU64,
}

impl JsonRpcWriteChannel {
    /// Create a channel to `endpoint` with a default 10 s request timeout.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ChannelError> {
        Self::with_timeout(endpoint, Duration::from_secs(10))
    }

    /// Create a channel with a custom per-request timeout.
    pub fn with_timeout(
        endpoint: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, ChannelError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ChannelError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            request_id: AtomicU64::new(1),
        })
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Call a JSON-RPC method. `timeout` overrides the client default.
    async fn call<P, R>(
        &self,
        method: &'static str,
        params: P,
        timeout: Option<Duration>,
    ) -> Result<Option<R>, RpcFailure>
    where
        P: Serialize + Send,
        R: serde::de::DeserializeOwned + Send,
    {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id(),
        };
        debug!("[pw-submitter] → {} (id {})", method, request.id);

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RpcFailure::Channel(map_transport_error(e)))?;

        let body: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| RpcFailure::Channel(map_transport_error(e)))?;

        match body.error {
            Some(error) => Err(RpcFailure::Rpc(error)),
            None => Ok(body.result),
        }
    }
}

/// A call either failed in transit or came back with an RPC error object.
enum RpcFailure {
    Channel(ChannelError),
    Rpc(JsonRpcError),
}

impl RpcFailure {
    fn into_channel_error(self) -> ChannelError {
        match self {
            Self::Channel(err) => err,
            Self::Rpc(err) => map_rpc_error(&err),
        }
    }
}

fn map_transport_error(err: reqwest::Error) -> ChannelError {
    if err.is_timeout() {
        ChannelError::Timeout
    } else if err.is_decode() {
        ChannelError::Protocol(err.to_string())
    } else {
        ChannelError::Transport(err.to_string())
    }
}

/// Map a gateway error object onto a channel error.
///
/// Positive codes are deterministic refusals; negative codes are JSON-RPC
/// protocol failures and leave the outcome unknown.
pub fn map_rpc_error(error: &JsonRpcError) -> ChannelError {
    let reason = match error.code {
        ERR_INVALID_SIGNATURE => RejectionReason::InvalidSignature,
        ERR_INVALID_NONCE => {
            let mismatch = error
                .data
                .clone()
                .and_then(|data| serde_json::from_value::<NonceMismatch>(data).ok());
            match mismatch {
                Some(m) => RejectionReason::InvalidSequence {
                    expected: m.expected,
                    actual: m.actual,
                },
                None => RejectionReason::Other(error.message.clone()),
            }
        }
        ERR_SCHEMA_VIOLATION => RejectionReason::SchemaViolation(error.message.clone()),
        ERR_UNAUTHORIZED => RejectionReason::Unauthorized(error.message.clone()),
        ERR_DOCUMENT_CONFLICT => RejectionReason::DocumentConflict(error.message.clone()),
        code if code > 0 => RejectionReason::Other(error.message.clone()),
        code => {
            return ChannelError::Protocol(format!("RPC error {}: {}", code, error.message))
        }
    };
    ChannelError::Rejected(reason)
}

fn confirmed_from_status(
    operation_id: OperationId,
    document_id: DocumentId,
    status: WriteStatus,
    source: ConfirmationSource,
) -> ConfirmedWrite {
    ConfirmedWrite {
        operation_id,
        document_id,
        sequence: status.nonce,
        block_height: status.block_height,
        source,
    }
}

#[async_trait]
impl SequencedWriteChannel for JsonRpcWriteChannel {
    async fn lookup_write(
        &self,
        operation_id: &OperationId,
        document_id: &DocumentId,
    ) -> Result<Option<ConfirmedWrite>, ChannelError> {
        let status: Option<WriteStatus> = self
            .call(
                "platform_getWriteStatus",
                [operation_id.to_hex(), document_id.to_hex()],
                None,
            )
            .await
            .map_err(RpcFailure::into_channel_error)?;

        Ok(status.map(|s| {
            confirmed_from_status(*operation_id, *document_id, s, ConfirmationSource::ExistenceCheck)
        }))
    }

    async fn fetch_next_sequence(&self, identity: &IdentityId) -> Result<u64, ChannelError> {
        let current: Option<u64> = self
            .call("platform_getIdentityNonce", [identity.to_hex()], None)
            .await
            .map_err(RpcFailure::into_channel_error)?;

        // An identity that never wrote reports no nonce
        Ok(current.unwrap_or(0).saturating_add(1))
    }

    async fn broadcast(&self, payload: &SignedPayload) -> Result<BroadcastAck, ChannelError> {
        let result: Result<Option<BroadcastStatus>, RpcFailure> = self
            .call(
                "platform_broadcastStateTransition",
                [hex::encode(&payload.bytes)],
                None,
            )
            .await;

        match result {
            Ok(Some(status)) => match status.status.as_str() {
                STATUS_ACCEPTED => Ok(BroadcastAck::Accepted),
                STATUS_ALREADY_PROCESSED => Ok(BroadcastAck::AlreadyProcessed),
                other => Err(ChannelError::Protocol(format!(
                    "unknown broadcast status {:?}",
                    other
                ))),
            },
            // No status means we cannot tell whether the gateway took it
            Ok(None) => Err(ChannelError::Protocol(
                "broadcast returned no status".to_string(),
            )),
            Err(RpcFailure::Rpc(error)) if error.code == ERR_ALREADY_PROCESSED => {
                Ok(BroadcastAck::AlreadyProcessed)
            }
            Err(failure) => Err(failure.into_channel_error()),
        }
    }

    async fn await_confirmation(
        &self,
        payload: &SignedPayload,
        timeout: Duration,
    ) -> Result<ConfirmedWrite, ChannelError> {
        let status: Option<WriteStatus> = self
            .call(
                "platform_waitForStateTransitionResult",
                (
                    hex::encode(payload.transition_hash()),
                    timeout.as_millis() as u64,
                ),
                Some(timeout + CONFIRMATION_SLACK),
            )
            .await
            .map_err(RpcFailure::into_channel_error)?;

        // A null result means the gateway gave up waiting
        let status = status.ok_or(ChannelError::Timeout)?;
        Ok(confirmed_from_status(
            payload.operation_id,
            payload.document_id,
            status,
            ConfirmationSource::Broadcast,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ContractId, WriteSpec};
    use crate::ports::outbound::sign_operation;
    use parking_lot::Mutex;
    use shared_crypto::Ed25519KeyPair;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn rpc_error(code: i64, data: Option<serde_json::Value>) -> JsonRpcError {
        JsonRpcError {
            code,
            message: "refused".to_string(),
            data,
        }
    }

    #[test]
    fn test_rejection_codes() {
        assert_eq!(
            map_rpc_error(&rpc_error(ERR_INVALID_SIGNATURE, None)),
            ChannelError::Rejected(RejectionReason::InvalidSignature)
        );
        assert_eq!(
            map_rpc_error(&rpc_error(ERR_DOCUMENT_CONFLICT, None)),
            ChannelError::Rejected(RejectionReason::DocumentConflict("refused".into()))
        );
        assert_eq!(
            map_rpc_error(&rpc_error(4242, None)),
            ChannelError::Rejected(RejectionReason::Other("refused".into()))
        );
    }

    #[test]
    fn test_nonce_mismatch_data() {
        let err = map_rpc_error(&rpc_error(
            ERR_INVALID_NONCE,
            Some(serde_json::json!({ "expected": 5, "actual": 3 })),
        ));
        assert_eq!(
            err,
            ChannelError::Rejected(RejectionReason::InvalidSequence {
                expected: 5,
                actual: 3
            })
        );
    }

    #[test]
    fn test_negative_codes_are_ambiguous() {
        let err = map_rpc_error(&rpc_error(-32603, None));
        assert!(matches!(err, ChannelError::Protocol(_)));
        assert!(err.classify().is_retryable());
    }

    #[test]
    fn test_write_status_decoding() {
        let status: WriteStatus =
            serde_json::from_value(serde_json::json!({ "nonce": 4, "blockHeight": 99 })).unwrap();
        assert_eq!(status.nonce, Some(4));
        assert_eq!(status.block_height, Some(99));

        let response: JsonRpcResponse<WriteStatus> =
            serde_json::from_value(serde_json::json!({ "jsonrpc": "2.0", "id": 1, "result": null }))
                .unwrap();
        assert!(response.result.is_none());
        assert!(response.error.is_none());
    }

    fn decode_response<R: serde::de::DeserializeOwned>(
        value: serde_json::Value,
    ) -> JsonRpcResponse<R> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_generic_response_without_result_field() {
        let response: JsonRpcResponse<u64> =
            decode_response(serde_json::json!({ "jsonrpc": "2.0", "id": 3 }));
        assert!(response.result.is_none());

        let response: JsonRpcResponse<u64> = decode_response(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 4,
            "error": { "code": ERR_UNAUTHORIZED, "message": "no such identity" }
        }));
        assert_eq!(response.error.map(|e| e.code), Some(ERR_UNAUTHORIZED));
    }

    // ==========================================================================
    // STUB GATEWAY
    // ==========================================================================

    /// Serves one canned body per connection and records the methods called.
    struct StubGateway {
        url: String,
        methods: Arc<Mutex<Vec<String>>>,
    }

    impl StubGateway {
        async fn start(replies: Vec<serde_json::Value>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("http://{}", listener.local_addr().unwrap());
            let methods = Arc::new(Mutex::new(Vec::new()));
            let seen = Arc::clone(&methods);

            tokio::spawn(async move {
                for reply in replies {
                    let (mut socket, _) = listener.accept().await.unwrap();
                    let request = read_request(&mut socket).await;
                    if let Some(method) = request["method"].as_str() {
                        seen.lock().push(method.to_string());
                    }
                    let body = reply.to_string();
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    socket.write_all(response.as_bytes()).await.unwrap();
                    let _ = socket.shutdown().await;
                }
            });

            Self { url, methods }
        }

        fn channel(&self) -> JsonRpcWriteChannel {
            JsonRpcWriteChannel::with_timeout(&self.url, Duration::from_secs(5)).unwrap()
        }

        fn methods(&self) -> Vec<String> {
            self.methods.lock().clone()
        }
    }

    async fn read_request(socket: &mut TcpStream) -> serde_json::Value {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return serde_json::Value::Null;
            }
            buf.extend_from_slice(&chunk[..n]);

            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let headers = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            let body_start = end + 4;
            if buf.len() >= body_start + length {
                return serde_json::from_slice(&buf[body_start..body_start + length]).unwrap();
            }
        }
    }

    fn ok(result: serde_json::Value) -> serde_json::Value {
        serde_json::json!({ "jsonrpc": "2.0", "id": 1, "result": result })
    }

    fn err(code: i64, message: &str) -> serde_json::Value {
        serde_json::json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": code, "message": message } })
    }

    fn payload() -> SignedPayload {
        let key = Ed25519KeyPair::from_seed([0x11; 32]);
        let spec = WriteSpec::create(
            ContractId::from_bytes([7; 32]),
            "note",
            IdentityId::from_bytes([1; 32]),
        )
        .field("text", "hello");
        sign_operation(&spec.build_operation(), &key, 1).unwrap()
    }

    #[tokio::test]
    async fn test_next_sequence_follows_last_used_nonce() {
        let gateway = StubGateway::start(vec![ok(serde_json::json!(4)), ok(serde_json::Value::Null)]).await;
        let channel = gateway.channel();
        let identity = IdentityId::from_bytes([1; 32]);

        assert_eq!(channel.fetch_next_sequence(&identity).await.unwrap(), 5);
        // Fresh identity
        assert_eq!(channel.fetch_next_sequence(&identity).await.unwrap(), 1);
        assert_eq!(gateway.methods(), vec!["platform_getIdentityNonce"; 2]);
    }

    #[tokio::test]
    async fn test_lookup_decodes_write_status() {
        let gateway = StubGateway::start(vec![
            ok(serde_json::json!({ "nonce": 3, "blockHeight": 12 })),
            ok(serde_json::Value::Null),
        ])
        .await;
        let channel = gateway.channel();
        let payload = payload();

        let found = channel
            .lookup_write(&payload.operation_id, &payload.document_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.operation_id, payload.operation_id);
        assert_eq!(found.sequence, Some(3));
        assert_eq!(found.block_height, Some(12));
        assert_eq!(found.source, ConfirmationSource::ExistenceCheck);

        assert!(channel
            .lookup_write(&payload.operation_id, &payload.document_id)
            .await
            .unwrap()
            .is_none());
        assert_eq!(gateway.methods(), vec!["platform_getWriteStatus"; 2]);
    }

    #[tokio::test]
    async fn test_broadcast_acknowledgements() {
        let gateway = StubGateway::start(vec![
            ok(serde_json::json!({ "status": "accepted" })),
            ok(serde_json::json!({ "status": "alreadyProcessed" })),
            err(ERR_ALREADY_PROCESSED, "duplicate transition"),
            err(ERR_INVALID_SIGNATURE, "bad signature"),
        ])
        .await;
        let channel = gateway.channel();
        let payload = payload();

        assert_eq!(channel.broadcast(&payload).await.unwrap(), BroadcastAck::Accepted);
        assert_eq!(
            channel.broadcast(&payload).await.unwrap(),
            BroadcastAck::AlreadyProcessed
        );
        assert_eq!(
            channel.broadcast(&payload).await.unwrap(),
            BroadcastAck::AlreadyProcessed
        );
        assert_eq!(
            channel.broadcast(&payload).await.unwrap_err(),
            ChannelError::Rejected(RejectionReason::InvalidSignature)
        );
        assert_eq!(gateway.methods(), vec!["platform_broadcastStateTransition"; 4]);
    }

    #[tokio::test]
    async fn test_unclear_broadcast_reply_is_ambiguous() {
        let gateway = StubGateway::start(vec![
            ok(serde_json::json!({ "status": "queued" })),
            ok(serde_json::Value::Null),
            serde_json::json!("gateway restarting"),
        ])
        .await;
        let channel = gateway.channel();
        let payload = payload();

        for _ in 0..3 {
            let err = channel.broadcast(&payload).await.unwrap_err();
            assert!(matches!(err, ChannelError::Protocol(_)), "got {:?}", err);
            assert!(err.classify().is_retryable());
        }
    }

    #[tokio::test]
    async fn test_confirmation_wait() {
        let gateway = StubGateway::start(vec![
            ok(serde_json::Value::Null),
            ok(serde_json::json!({ "nonce": 1, "blockHeight": 9 })),
        ])
        .await;
        let channel = gateway.channel();
        let payload = payload();

        assert_eq!(
            channel
                .await_confirmation(&payload, Duration::from_millis(200))
                .await
                .unwrap_err(),
            ChannelError::Timeout
        );

        let confirmed = channel
            .await_confirmation(&payload, Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(confirmed.document_id, payload.document_id);
        assert_eq!(confirmed.sequence, Some(1));
        assert_eq!(confirmed.block_height, Some(9));
        assert_eq!(confirmed.source, ConfirmationSource::Broadcast);
        assert_eq!(
            gateway.methods(),
            vec!["platform_waitForStateTransitionResult"; 2]
        );
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_transport_error() {
        // Bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let channel =
            JsonRpcWriteChannel::with_timeout(format!("http://{}", addr), Duration::from_secs(2))
                .unwrap();
        let err = channel
            .fetch_next_sequence(&IdentityId::from_bytes([1; 32]))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Transport(_) | ChannelError::Timeout));
        assert!(err.classify().is_retryable());
    }
}
