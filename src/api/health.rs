//! Shared health counters for the /health endpoint.
//! Bumped by the access resolver and the scan handler.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct HealthState {
    /// Access Oracle calls that errored or timed out.
    oracle_failures: AtomicU64,
    /// Slip Reader calls that errored.
    scan_failures: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_oracle_failures(&self) {
        self.oracle_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_scan_failures(&self) {
        self.scan_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn oracle_failures(&self) -> u64 {
        self.oracle_failures.load(Ordering::Relaxed)
    }

    pub fn scan_failures(&self) -> u64 {
        self.scan_failures.load(Ordering::Relaxed)
    }
}
