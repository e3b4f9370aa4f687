//! Global atomic counters for scriptgate.
//!
//! Counters are bumped silently at the call site. [`Metrics::flush`] emits
//! the current values as one `tracing::info!` event, typically at the end of
//! a CLI command or a watchdog tick.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    scripts_scored: AtomicU64,
    autofix_actions: AtomicU64,
    sections_regenerated: AtomicU64,
    promotions: AtomicU64,
    corrupt_reads: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            scripts_scored: AtomicU64::new(0),
            autofix_actions: AtomicU64::new(0),
            sections_regenerated: AtomicU64::new(0),
            promotions: AtomicU64::new(0),
            corrupt_reads: AtomicU64::new(0),
        }
    }

    pub fn inc_scripts_scored(&self) {
        self.scripts_scored.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "scripts_scored", "counter incremented");
    }

    /// Add the number of actions from one autofix pass.
    pub fn add_autofix_actions(&self, n: u64) {
        self.autofix_actions.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "autofix_actions", n, "counter incremented");
    }

    pub fn inc_sections_regenerated(&self) {
        self.sections_regenerated.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "sections_regenerated", "counter incremented");
    }

    pub fn inc_promotions(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "promotions", "counter incremented");
    }

    /// A persisted file was present but could not be parsed.
    pub fn inc_corrupt_reads(&self) {
        self.corrupt_reads.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "corrupt_reads", "counter incremented");
    }

    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            scripts_scored = self.scripts_scored(),
            autofix_actions = self.autofix_actions(),
            sections_regenerated = self.sections_regenerated(),
            promotions = self.promotions(),
            corrupt_reads = self.corrupt_reads(),
        );
    }

    pub fn scripts_scored(&self) -> u64 {
        self.scripts_scored.load(Ordering::Relaxed)
    }

    pub fn autofix_actions(&self) -> u64 {
        self.autofix_actions.load(Ordering::Relaxed)
    }

    pub fn sections_regenerated(&self) -> u64 {
        self.sections_regenerated.load(Ordering::Relaxed)
    }

    pub fn promotions(&self) -> u64 {
        self.promotions.load(Ordering::Relaxed)
    }

    pub fn corrupt_reads(&self) -> u64 {
        self.corrupt_reads.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.scripts_scored.store(0, Ordering::Relaxed);
        self.autofix_actions.store(0, Ordering::Relaxed);
        self.sections_regenerated.store(0, Ordering::Relaxed);
        self.promotions.store(0, Ordering::Relaxed);
        self.corrupt_reads.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_scripts_scored();
        m.inc_scripts_scored();
        m.add_autofix_actions(5);
        m.inc_sections_regenerated();
        m.inc_promotions();
        m.inc_corrupt_reads();
        assert_eq!(m.scripts_scored(), 2);
        assert_eq!(m.autofix_actions(), 5);
        assert_eq!(m.sections_regenerated(), 1);
        assert_eq!(m.promotions(), 1);
        assert_eq!(m.corrupt_reads(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_scripts_scored();
        m.add_autofix_actions(3);
        m.inc_promotions();
        m.reset();
        assert_eq!(m.scripts_scored(), 0);
        assert_eq!(m.autofix_actions(), 0);
        assert_eq!(m.promotions(), 0);
    }
}
