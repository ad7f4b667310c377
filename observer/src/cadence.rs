use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Mempool scan period, published after each cycle and read by the scan
/// loop before it sleeps. Backs off as the day's RPC budget burns down;
/// the block scanner stays on its fixed period because confirmed-block
/// scans are cheap and correctness-critical.
#[derive(Debug)]
pub struct Cadence {
    period_secs: AtomicU64,
}

impl Cadence {
    pub fn new() -> Self {
        Self {
            period_secs: AtomicU64::new(60),
        }
    }

    pub fn current(&self) -> Duration {
        Duration::from_secs(self.period_secs.load(Ordering::Relaxed))
    }

    /// Map budget usage in `[0, 1]` to the next period and publish it.
    pub fn observe_usage(&self, usage: f64) -> u64 {
        let secs = if usage > 0.8 {
            300
        } else if usage > 0.6 {
            180
        } else if usage > 0.4 {
            120
        } else {
            60
        };

        self.period_secs.store(secs, Ordering::Relaxed);
        secs
    }
}

impl Default for Cadence {
    fn default() -> Self {
        Self::new()
    }
}
