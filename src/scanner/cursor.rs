use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out offsets `0..total` to workers, each exactly once.
///
/// Claiming is the only compound operation and it happens in a single
/// `fetch_update`, so no lock is held while a worker probes.
#[derive(Debug)]
pub struct WorkCursor {
    next: AtomicU64,
    total: u64,
}

impl WorkCursor {
    #[must_use]
    pub const fn new(total: u64) -> Self {
        Self {
            next: AtomicU64::new(0),
            total,
        }
    }

    /// Returns the next unclaimed offset, or `None` once every offset is taken.
    #[must_use]
    pub fn claim_next(&self) -> Option<u64> {
        self.next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |next| {
                (next < self.total).then_some(next + 1)
            })
            .ok()
    }

    #[must_use]
    pub fn next_offset(&self) -> u64 {
        self.next.load(Ordering::Acquire)
    }

    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }
}
