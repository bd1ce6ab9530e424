//! Non-blocking, bounded permit accounting.
//!
//! [`PermitCounter`] is the only piece of shared mutable state a
//! [`crate::Bulkhead`] owns directly. `try_acquire` and `release` are
//! wait-free: a compare-exchange loop on a single [`AtomicUsize`], no locks,
//! no queueing.
use {
    crate::error::InvariantViolation,
    core::sync::atomic::{AtomicUsize, Ordering},
};

/// Tracks how many of a fixed `limit` permits are currently available.
///
/// `0 <= available <= limit` is maintained as a hard invariant: every
/// operation that could push `available` outside that range checks it before
/// returning, surfacing [`InvariantViolation`] on breach rather than silently
/// continuing with broken accounting.
#[derive(Debug)]
pub(crate) struct PermitCounter {
    available: AtomicUsize,
    limit: usize,
}

impl PermitCounter {
    /// Creates a new [`PermitCounter`] with all `limit` permits available.
    pub(crate) const fn new(limit: usize) -> Self {
        Self {
            available: AtomicUsize::new(limit),
            limit,
        }
    }

    /// Attempts to acquire one permit.
    ///
    /// Returns `true` iff a permit was acquired. Never blocks. On success,
    /// the acquire uses [`Ordering::Acquire`] so that the factory invocation
    /// the caller performs immediately afterward happens-after whatever the
    /// releasing thread published before its [`Self::release`].
    pub(crate) fn try_acquire(&self) -> bool {
        let mut current = self.available.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                return false;
            }

            match self.available.compare_exchange_weak(
                current,
                current - 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Releases one permit, returning the new available count.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantViolation`] if the resulting count would exceed
    /// `limit` — this is a detected bug (a double release, most likely), not
    /// a recoverable condition.
    pub(crate) fn release(&self) -> Result<usize, InvariantViolation> {
        let previous = self.available.fetch_add(1, Ordering::Release);
        let observed = previous + 1;
        self.check(observed as i64)?;
        Ok(observed)
    }

    /// Returns a best-effort snapshot of the available count.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantViolation`] if the snapshot falls outside
    /// `0..=limit`.
    pub(crate) fn snapshot(&self) -> Result<usize, InvariantViolation> {
        let observed = self.available.load(Ordering::Acquire);
        self.check(observed as i64)?;
        Ok(observed)
    }

    /// The configured limit.
    pub(crate) const fn limit(&self) -> usize {
        self.limit
    }

    /// Validates `observed` falls within `0..=limit`.
    fn check(&self, observed: i64) -> Result<(), InvariantViolation> {
        if observed < 0 || observed as usize > self.limit {
            return Err(InvariantViolation {
                observed,
                limit: self.limit,
            });
        }

        Ok(())
    }
}
