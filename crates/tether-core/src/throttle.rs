//! ErrorThrottle: per-key failure counter with a sliding time window.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

use chrono::Duration;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::domain::RequestKey;
use crate::ports::Clock;

/// Throttle thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottlePolicy {
    /// A key is throttled once its failure count goes above this value.
    pub max_errors: u32,

    /// Window, in milliseconds, measured from the most recent failure.
    pub window_ms: i64,
}

impl ThrottlePolicy {
    pub const MAX_ERROR_COUNT: u32 = 8;
    pub const MAX_ERROR_PERIOD_MS: i64 = 120_000;

    pub fn window(&self) -> Duration {
        Duration::milliseconds(self.window_ms)
    }
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            max_errors: Self::MAX_ERROR_COUNT,
            window_ms: Self::MAX_ERROR_PERIOD_MS,
        }
    }
}

/// Failure history of one key. Created on its first recorded failure.
#[derive(Debug, Default)]
pub struct ErrorRecord {
    count: AtomicU32,
    last_failure_ms: AtomicI64,
}

impl ErrorRecord {
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }

    pub fn last_failure_ms(&self) -> i64 {
        self.last_failure_ms.load(Ordering::Acquire)
    }
}

/// Counts failures per `RequestKey` and decides when a key must back off.
pub struct ErrorThrottle {
    policy: ThrottlePolicy,
    clock: Arc<dyn Clock>,
    records: Mutex<HashMap<RequestKey, Arc<ErrorRecord>>>,
}

impl ErrorThrottle {
    pub fn new(policy: ThrottlePolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            clock,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &ThrottlePolicy {
        &self.policy
    }

    /// Record one failure for `key` and return the new count.
    pub fn record_failure(&self, key: RequestKey) -> u32 {
        let mut records = self.records.lock();
        let record = records.entry(key).or_default();
        record
            .last_failure_ms
            .store(self.clock.now().timestamp_millis(), Ordering::Release);
        record.count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Whether `key` must be rejected without executing.
    ///
    /// Once the window since the last failure has elapsed the record is
    /// dropped and the key is released.
    pub fn is_throttled(&self, key: RequestKey) -> bool {
        let mut records = self.records.lock();
        let Some(record) = records.get(&key) else {
            return false;
        };
        let elapsed_ms = self.clock.now().timestamp_millis() - record.last_failure_ms();
        if elapsed_ms >= self.policy.window_ms {
            records.remove(&key);
            return false;
        }
        record.count() > self.policy.max_errors
    }

    /// Keys with a live failure record.
    pub fn tracked_keys(&self) -> usize {
        self.records.lock().len()
    }

    /// Current failure count for `key` (0 if never failed).
    pub fn failures(&self, key: RequestKey) -> u32 {
        self.records
            .lock()
            .get(&key)
            .map(|record| record.count())
            .unwrap_or(0)
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}
