//! The [`Bulkhead`] itself: the public entry point tying permit accounting,
//! listener dispatch, and handle construction together.
use {
    crate::{
        classify::TerminalKind,
        error::{BulkheadError, CallerError, InvariantViolation},
        handle::{BulkheadHandle, Outcome},
        listener::{dispatch_admitted, dispatch_rejected, dispatch_released, Listener, NoopListener},
        permit::PermitCounter,
    },
    core::fmt,
    futures::future::{BoxFuture, Future, FutureExt},
    std::{
        panic::{catch_unwind, AssertUnwindSafe},
        sync::Arc,
    },
};

/// An in-process admission-control primitive bounding how many operations may
/// run concurrently.
///
/// A [`Bulkhead`] is cheap to clone (it is itself just an `Arc` pair
/// internally) and safe to share across threads and tasks. `submit` never
/// blocks: an operation is either admitted immediately or rejected
/// immediately, and the bulkhead never spawns a task or owns a runtime of its
/// own — the [`BulkheadHandle`] it returns only makes progress while
/// something polls it.
pub struct Bulkhead {
    permits: Arc<PermitCounter>,
    listener: Arc<dyn Listener>,
}

impl Bulkhead {
    /// Creates a new [`Bulkhead`] that admits at most `limit` concurrent
    /// operations, reporting events to `listener`.
    ///
    /// # Errors
    ///
    /// Returns [`CallerError::NonPositiveLimit`] if `limit` is `0`. No permit
    /// accounting exists yet at this point, so this check never consumes a
    /// permit.
    pub fn new(limit: usize, listener: Arc<dyn Listener>) -> Result<Self, CallerError> {
        if limit == 0 {
            return Err(CallerError::NonPositiveLimit(limit));
        }

        Ok(Self {
            permits: Arc::new(PermitCounter::new(limit)),
            listener,
        })
    }

    /// Creates a new [`Bulkhead`] with a [`NoopListener`].
    ///
    /// # Errors
    ///
    /// Returns [`CallerError::NonPositiveLimit`] if `limit` is `0`.
    pub fn unobserved(limit: usize) -> Result<Self, CallerError> {
        Self::new(limit, Arc::new(NoopListener))
    }

    /// Submits `factory` for admission.
    ///
    /// If a permit is available, it is acquired immediately, `factory` is
    /// invoked synchronously to produce the operation's future, and the
    /// returned [`BulkheadHandle`] drives that future to completion as it is
    /// polled. If no permit is available, the factory is never invoked and
    /// the returned handle is already terminal with
    /// [`BulkheadError::Rejected`].
    ///
    /// A panic while invoking `factory` is caught and surfaces as
    /// [`BulkheadError::FactoryPanicked`] — the permit is still released, and
    /// `on_released` still fires, exactly as it would for any other failure.
    pub fn submit<F, Fut, T, E>(&self, factory: F) -> BulkheadHandle<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: std::error::Error + Send + 'static,
    {
        if !self.permits.try_acquire() {
            dispatch_rejected(&*self.listener);
            log::debug!(
                "bulkhead rejected submission: 0/{} available",
                self.permits.limit()
            );
            return BulkheadHandle::immediate(Outcome::Failure(BulkheadError::Rejected));
        }

        dispatch_admitted(&*self.listener);
        log::trace!("bulkhead admitted submission");

        match catch_unwind(AssertUnwindSafe(factory)) {
            Ok(future) => self.register(future.boxed()),
            Err(panic) => self.release_immediately(BulkheadError::FactoryPanicked(panic)),
        }
    }

    /// The configured concurrency limit.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.permits.limit()
    }

    /// A best-effort snapshot of how many permits are currently available.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantViolation`] if permit accounting has detected a
    /// broken invariant — this indicates a bug, not a normal operating
    /// condition.
    pub fn available(&self) -> Result<usize, InvariantViolation> {
        self.permits.snapshot()
    }

    /// A best-effort snapshot of how many operations are currently admitted
    /// and in flight.
    ///
    /// # Errors
    ///
    /// See [`Self::available`].
    pub fn in_flight(&self) -> Result<usize, InvariantViolation> {
        self.available().map(|available| self.limit() - available)
    }

    fn register<T, E>(&self, future: BoxFuture<'static, Result<T, E>>) -> BulkheadHandle<T, E>
    where
        E: std::error::Error + Send + 'static,
    {
        match BulkheadHandle::driving(future, Arc::clone(&self.permits), Arc::clone(&self.listener)) {
            Ok(handle) => handle,
            Err(registration_error) => self.release_immediately(BulkheadError::Registration(registration_error)),
        }
    }

    /// Releases the just-acquired permit for a submission that never became a
    /// driven handle (factory panic or registration failure), dispatching
    /// `on_released` iff the release itself succeeds.
    fn release_immediately<T, E>(&self, error: BulkheadError<E>) -> BulkheadHandle<T, E>
    where
        E: std::error::Error + 'static,
    {
        let outcome = match self.permits.release() {
            Ok(available) => {
                dispatch_released(&*self.listener, TerminalKind::Failure, Some(error.as_dyn_error()));
                log::trace!("bulkhead released permit (Failure) before admission; {available} now available");
                Outcome::Failure(error)
            }
            Err(violation) => {
                log::error!("bulkhead invariant violation releasing an unadmitted submission: {violation}");
                Outcome::Failure(BulkheadError::InvariantViolation(violation))
            }
        };

        BulkheadHandle::immediate(outcome)
    }
}

impl Clone for Bulkhead {
    fn clone(&self) -> Self {
        Self {
            permits: Arc::clone(&self.permits),
            listener: Arc::clone(&self.listener),
        }
    }
}

impl fmt::Debug for Bulkhead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bulkhead")
            .field("limit", &self.limit())
            .field("available", &self.permits.snapshot().ok())
            .finish()
    }
}
