use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Minimal counters for operational visibility.
#[derive(Clone, Default)]
pub struct Counters {
    pub attempts: Arc<AtomicU64>,
    pub committed: Arc<AtomicU64>,

    // rejections
    pub sold_out: Arc<AtomicU64>,
    pub busy: Arc<AtomicU64>,

    // failures
    pub compensated: Arc<AtomicU64>,
    pub compensation_failed: Arc<AtomicU64>,
    pub failed: Arc<AtomicU64>,

    // notifications
    pub notify_enqueued: Arc<AtomicU64>,
    pub notify_dropped: Arc<AtomicU64>,
    pub notify_delivered: Arc<AtomicU64>,
    pub notify_failed: Arc<AtomicU64>,
}

/// Point-in-time copy of [`Counters`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub attempts: u64,
    pub committed: u64,
    pub sold_out: u64,
    pub busy: u64,
    pub compensated: u64,
    pub compensation_failed: u64,
    pub failed: u64,
    pub notify_enqueued: u64,
    pub notify_dropped: u64,
    pub notify_delivered: u64,
    pub notify_failed: u64,
}

pub(crate) fn bump(c: &AtomicU64) {
    c.fetch_add(1, Ordering::Relaxed);
}

impl Counters {
    pub fn snapshot(&self) -> CountersSnapshot {
        let load = |c: &Arc<AtomicU64>| c.load(Ordering::Relaxed);
        CountersSnapshot {
            attempts: load(&self.attempts),
            committed: load(&self.committed),
            sold_out: load(&self.sold_out),
            busy: load(&self.busy),
            compensated: load(&self.compensated),
            compensation_failed: load(&self.compensation_failed),
            failed: load(&self.failed),
            notify_enqueued: load(&self.notify_enqueued),
            notify_dropped: load(&self.notify_dropped),
            notify_delivered: load(&self.notify_delivered),
            notify_failed: load(&self.notify_failed),
        }
    }
}
