//! # Expiry Policy
//!
//! Cached payloads older than the retention window are abandoned; beyond the
//! entry cap the oldest go first.

use super::config::SubmitterConfig;
use super::value_objects::Timestamp;
use crate::ports::outbound::StoredEntry;

/// Age and count limits for the pending-write store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExpiryPolicy {
    retention_ms: u64,
    max_entries: usize,
}

impl ExpiryPolicy {
    /// Create a policy.
    pub fn new(retention_ms: u64, max_entries: usize) -> Self {
        Self {
            retention_ms,
            max_entries,
        }
    }

    /// Policy from submitter configuration.
    pub fn from_config(config: &SubmitterConfig) -> Self {
        Self::new(config.retention_ms(), config.max_cached_entries)
    }

    /// True once an entry cached at `cached_at` has outlived retention.
    ///
    /// Entries stamped in the future (clock moved backwards) are kept.
    pub fn is_expired(&self, cached_at: Timestamp, now: Timestamp) -> bool {
        now.saturating_sub(cached_at) > self.retention_ms
    }

    /// Keys to evict: every expired entry, then the oldest survivors until the
    /// cap holds.
    pub fn select_evictions(&self, entries: &[StoredEntry], now: Timestamp) -> Vec<String> {
        let (expired, mut live): (Vec<&StoredEntry>, Vec<&StoredEntry>) = entries
            .iter()
            .partition(|entry| self.is_expired(entry.cached_at, now));

        let mut evictions: Vec<String> = expired.into_iter().map(|e| e.key.clone()).collect();

        if live.len() > self.max_entries {
            live.sort_by(|a, b| a.cached_at.cmp(&b.cached_at).then_with(|| a.key.cmp(&b.key)));
            let excess = live.len() - self.max_entries;
            evictions.extend(live.into_iter().take(excess).map(|e| e.key.clone()));
        }

        evictions
    }
}
