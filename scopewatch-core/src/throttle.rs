//! Throttle ledger: last-send time per report key
//!
//! A key is recorded when its report is *accepted for a delivery attempt*,
//! before the attempt runs. A failed or slow delivery therefore never lets
//! the same key re-qualify inside the cooldown window.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Report, ThrottleKey};

/// Default cooldown between sends of the same key (7 days)
pub const DEFAULT_COOLDOWN_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Mapping from throttle key to last accepted send, in epoch milliseconds.
///
/// Serializes as a plain JSON object (`lastSent` in the persisted layout).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThrottleLedger {
    entries: BTreeMap<String, i64>,
}

impl ThrottleLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from persisted `(key, millis)` pairs
    pub fn from_entries(entries: impl IntoIterator<Item = (String, i64)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// True iff `key` was never recorded or its cooldown has fully elapsed.
    pub fn should_send(&self, key: &ThrottleKey, now: DateTime<Utc>, cooldown: Duration) -> bool {
        match self.entries.get(key.as_str()) {
            None => true,
            Some(&last) => now.timestamp_millis() - last > cooldown.num_milliseconds(),
        }
    }

    /// Record an accepted send of `key` at `now`
    pub fn record(&mut self, key: &ThrottleKey, now: DateTime<Utc>) {
        self.entries
            .insert(key.as_str().to_string(), now.timestamp_millis());
    }

    /// Filter candidates through the ledger, recording every one that passes.
    ///
    /// Returns the admitted reports in candidate order.
    pub fn admit(
        &mut self,
        candidates: Vec<Report>,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Vec<Report> {
        let mut admitted = Vec::with_capacity(candidates.len());
        for report in candidates {
            let key = report.throttle_key();
            if self.should_send(&key, now, cooldown) {
                self.record(&key, now);
                admitted.push(report);
            } else {
                tracing::debug!(key = %key, "Report throttled");
            }
        }
        admitted
    }

    /// Fold another ledger in, keeping the later timestamp per key
    pub fn merge(&mut self, other: &ThrottleLedger) {
        for (key, &last_sent) in &other.entries {
            let entry = self.entries.entry(key.clone()).or_insert(last_sent);
            *entry = (*entry).max(last_sent);
        }
    }

    pub fn last_sent(&self, key: &ThrottleKey) -> Option<i64> {
        self.entries.get(key.as_str()).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }
}
