//! Per-timestamp iteration counter (spec.md §4.H, §9 Open Questions).
//!
//! Grounded on `spadeAuditBridge.c`'s `current_time_iterations` buffer: a
//! bounded scratch table valid for a single observed timestamp, linearly
//! scanned and reset whenever the timestamp advances. The open question is
//! resolved as: exceeding the bound is a recoverable warning, and the
//! count falls back to the last successful value recorded for that key
//! (tracked separately, surviving resets) rather than returning an error.

use std::collections::HashMap;

use super::types::Timestamp;

/// Bound on distinct `(tid, loopid, iteration)` keys tracked within a single
/// timestamp, mirroring the source's 1000-entry buffer.
pub const BUFFER_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Key {
    tid: i64,
    loopid: i64,
    iteration: i64,
}

#[derive(Debug, Default)]
pub struct IterationCounter {
    current_timestamp: Option<Timestamp>,
    current: HashMap<Key, i64>,
    last_known: HashMap<Key, i64>,
}

impl IterationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next count for `(tid, loopid, iteration)` at `at`.
    /// Resets the per-timestamp buffer first if `at` differs from the
    /// timestamp of the previous call.
    pub fn get(&mut self, tid: i64, loopid: i64, iteration: i64, at: Timestamp) -> i64 {
        if self.current_timestamp != Some(at) {
            self.current.clear();
            self.current_timestamp = Some(at);
        }
        let key = Key {
            tid,
            loopid,
            iteration,
        };
        if let Some(count) = self.current.get_mut(&key) {
            *count += 1;
            self.last_known.insert(key, *count);
            return *count;
        }
        if self.current.len() >= BUFFER_SIZE {
            let fallback = self.last_known.get(&key).copied().unwrap_or(0);
            log::warn!(
                "iteration counter buffer full at timestamp {at}, falling back to last known \
                 count {fallback} for tid={tid} loopid={loopid} iteration={iteration}"
            );
            return fallback;
        }
        self.current.insert(key, 0);
        self.last_known.insert(key, 0);
        0
    }
}
