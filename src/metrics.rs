use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::router::{Dispatch, IgnoreReason};

/// Interaction dispatch counters, shared across handler tasks.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    received: AtomicU64,
    ignored: AtomicU64,
    unknown: AtomicU64,
    rejected: AtomicU64,
    not_found: AtomicU64,
    executed: AtomicU64,
    failed: AtomicU64,
    uptime_sec: AtomicU64,
}

/// Point-in-time copy of [`DispatchMetrics`] for the heartbeat log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_sec: u64,
    pub received: u64,
    pub ignored: u64,
    pub unknown: u64,
    pub rejected: u64,
    pub not_found: u64,
    pub executed: u64,
    pub failed: u64,
    pub memory_bytes: u64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one finished dispatch.
    pub fn record(&self, outcome: &Dispatch) {
        self.received.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            Dispatch::Ignored(IgnoreReason::UnknownCommand(_))
            | Dispatch::Ignored(IgnoreReason::UnknownMenu(_)) => &self.unknown,
            Dispatch::Ignored(_) => &self.ignored,
            Dispatch::Rejected => &self.rejected,
            Dispatch::NotFound => &self.not_found,
            Dispatch::Executed => &self.executed,
            Dispatch::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment uptime (called every heartbeat interval)
    pub fn increment_uptime(&self, seconds: u64) {
        self.uptime_sec.fetch_add(seconds, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_sec: self.uptime_sec.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            unknown: self.unknown.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            memory_bytes: resident_memory(),
        }
    }
}

impl MetricsSnapshot {
    /// Share of handled interactions whose handler completed without a
    /// platform failure.
    pub fn success_rate(&self) -> f64 {
        let handled = self.executed + self.failed;
        if handled == 0 {
            return 100.0;
        }
        (self.executed as f64 / handled as f64) * 100.0
    }
}

/// Resident set size from /proc, 0 elsewhere.
fn resident_memory() -> u64 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    if let Some(kb) = line.split_whitespace().nth(1) {
                        if let Ok(kb) = kb.parse::<u64>() {
                            return kb * 1024;
                        }
                    }
                }
            }
        }
    }
    0
}
