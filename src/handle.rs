//! The admission record and the future-like handle returned by
//! [`crate::Bulkhead::submit`].
//!
//! This is the heart of the crate: guaranteeing that exactly one `release()`
//! happens per admitted submission no matter which of underlying completion,
//! caller cancellation, or (in principle) terminal-observer registration
//! failure gets there first. See `DESIGN.md` for why the released/outcome
//! bookkeeping below is guarded by a short-lived [`std::sync::Mutex`] rather
//! than a second raw atomic alongside [`crate::permit::PermitCounter`]'s own.
use {
    crate::{
        classify::{classify, TerminalKind},
        error::BulkheadError,
        listener::{dispatch_released, Listener},
        permit::PermitCounter,
    },
    core::{
        fmt,
        future::Future,
        pin::Pin,
        task::{Context, Poll, Waker},
    },
    futures::future::BoxFuture,
    std::sync::{Arc, Mutex, PoisonError},
};

/// The terminal output of a [`BulkheadHandle`].
///
/// A distinct sum type rather than a plain [`Result`], because
/// [`Outcome::Cancelled`] is its own terminal state (`spec.md` §3's Handle
/// definition), not a kind of [`Outcome::Failure`]. Note the asymmetry this
/// preserves: cancellation of the *caller's operation* (observed by
/// [`crate::classify::classify`] as [`TerminalKind::Cancelled`]) still
/// surfaces here as [`Outcome::Failure`] carrying that cancellation marker —
/// only cancelling the *handle itself* via [`BulkheadHandle::cancel`] produces
/// [`Outcome::Cancelled`].
#[derive(Debug)]
pub enum Outcome<T, E> {
    /// The admitted operation completed without error.
    Success(T),
    /// The admitted operation failed, the factory panicked, registration
    /// failed, or an accounting invariant broke.
    Failure(BulkheadError<E>),
    /// The handle was cancelled by the caller.
    Cancelled,
}

impl<T, E> Outcome<T, E> {
    /// Returns `true` if `self` is [`Outcome::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns `true` if `self` is [`Outcome::Cancelled`].
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Converts `self` into a [`Result`], collapsing [`Outcome::Cancelled`]
    /// into `Err(None)` and [`Outcome::Failure`] into `Err(Some(error))`.
    pub fn into_result(self) -> Result<T, Option<BulkheadError<E>>> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(error) => Err(Some(error)),
            Self::Cancelled => Err(None),
        }
    }
}

/// Shared state between a [`BulkheadHandle`] and the admitted operation's
/// future, reference-counted so that the handle can be polled from one place
/// while [`BulkheadHandle::cancel`] is called from another.
struct Shared<T, E> {
    inner: Mutex<Inner<T, E>>,
    permits: Arc<PermitCounter>,
    listener: Arc<dyn Listener>,
}

struct Inner<T, E> {
    /// The operation's future, present until it (or a cancellation) claims
    /// this admission.
    future: Option<BoxFuture<'static, Result<T, E>>>,
    /// Set once a terminal [`Outcome`] has been computed but not yet
    /// delivered through a `poll()` call.
    outcome: Option<Outcome<T, E>>,
    /// The waker from the most recent `Pending` poll, used to wake a pending
    /// poller when [`BulkheadHandle::cancel`] completes concurrently.
    waker: Option<Waker>,
    /// `true` once some path (underlying completion, cancel, or registration
    /// failure) has claimed the right to release this admission's permit.
    /// This is the flag `spec.md` §4.3 describes as CAS-guarded; here the
    /// "compare-and-set" is a checked mutation under [`Shared::inner`]'s lock
    /// rather than a standalone atomic (see `DESIGN.md`).
    released: bool,
    /// `true` once [`Outcome::Cancelled`] has actually been produced by
    /// [`BulkheadHandle::cancel`] — distinct from `released`, which can also
    /// be set by ordinary completion or by the supplier's own cancellation
    /// (which never sets this, per the asymmetry in `spec.md` §9).
    cancelled: bool,
}

impl<T, E> Shared<T, E>
where
    E: std::error::Error + 'static,
{
    /// Registers the terminal observer for a freshly admitted operation.
    ///
    /// In this implementation registration is a plain data-structure write
    /// and cannot fail. The `Result` is kept because `spec.md` §9 calls out
    /// that attaching a terminal observer can fail in other implementation
    /// strategies (for instance obtaining a runtime handle to drive the
    /// future on a borrowed executor), and the asymmetric handling of that
    /// failure (§4.3 step 7) is part of the contract regardless of whether
    /// *this* strategy can trigger it.
    fn try_register(
        future: BoxFuture<'static, Result<T, E>>,
        permits: Arc<PermitCounter>,
        listener: Arc<dyn Listener>,
    ) -> Result<Arc<Self>, crate::error::RegistrationError> {
        Ok(Arc::new(Self {
            inner: Mutex::new(Inner {
                future: Some(future),
                outcome: None,
                waker: None,
                released: false,
                cancelled: false,
            }),
            permits,
            listener,
        }))
    }

    /// Claims this admission for ordinary completion, releasing the permit
    /// and dispatching `on_released`. Returns `None` if
    /// [`BulkheadHandle::cancel`] already claimed it first.
    fn finish_from_result(&self, result: Result<T, E>) -> Option<Outcome<T, E>> {
        {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if inner.released {
                return None;
            }
            inner.released = true;
        }

        Some(match self.permits.release() {
            Ok(available) => {
                let kind = classify(result.as_ref().err());
                // Only TerminalKind::Failure carries an error to the listener; a
                // cancelled supplier result still reports `None`, per spec.md §4.4.
                let error_ref: Option<&(dyn std::error::Error + 'static)> = match kind {
                    TerminalKind::Failure => {
                        result.as_ref().err().map(|e| e as &(dyn std::error::Error + 'static))
                    }
                    TerminalKind::Success | TerminalKind::Cancelled => None,
                };
                dispatch_released(&*self.listener, kind, error_ref);
                log::trace!("bulkhead released permit ({kind:?}); {available} now available");
                match result {
                    Ok(value) => Outcome::Success(value),
                    Err(error) => Outcome::Failure(BulkheadError::Operation(error)),
                }
            }
            Err(violation) => {
                log::error!("bulkhead invariant violation on release: {violation}");
                Outcome::Failure(BulkheadError::InvariantViolation(violation))
            }
        })
    }

    /// Claims this admission for cancellation. Returns `None` if ordinary
    /// completion (or a prior cancel) already claimed it first.
    fn finish_cancelled(&self) -> Option<Outcome<T, E>> {
        {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if inner.released {
                return None;
            }
            inner.released = true;
        }

        Some(match self.permits.release() {
            Ok(available) => {
                dispatch_released(&*self.listener, TerminalKind::Cancelled, None);
                log::trace!("bulkhead released permit (Cancelled); {available} now available");
                Outcome::Cancelled
            }
            Err(violation) => {
                log::error!("bulkhead invariant violation on cancel release: {violation}");
                Outcome::Failure(BulkheadError::InvariantViolation(violation))
            }
        })
    }

    /// Stores a claimed-but-not-yet-polled terminal outcome and wakes
    /// whoever was last polling this handle, if anyone.
    fn store_and_wake(&self, outcome: Outcome<T, E>, cancelled: bool) {
        let waker = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.outcome = Some(outcome);
            inner.cancelled = cancelled;
            inner.waker.take()
        };

        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

/// The future-like object returned by [`crate::Bulkhead::submit`].
///
/// Implements [`Future`] with `Output = `[`Outcome<T, E>`]; polling it drives
/// the underlying operation's future (nothing else does — this crate spawns
/// no tasks). Also exposes synchronous, non-blocking introspection and
/// cancellation, independent of whether anyone is polling.
pub struct BulkheadHandle<T, E> {
    kind: HandleKind<T, E>,
}

enum HandleKind<T, E> {
    /// Already terminal at construction (rejected, factory panicked, or
    /// registration failed) — no admitted operation to drive.
    Immediate(Option<Outcome<T, E>>),
    /// An admitted operation in flight (or already finished but not yet
    /// polled to completion).
    Driving(Arc<Shared<T, E>>),
}

impl<T, E> fmt::Debug for BulkheadHandle<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkheadHandle")
            .field("done", &self.is_done())
            .finish()
    }
}

impl<T, E> BulkheadHandle<T, E>
where
    E: std::error::Error + 'static,
{
    /// Creates a handle that is already in a terminal state.
    pub(crate) fn immediate(outcome: Outcome<T, E>) -> Self {
        Self {
            kind: HandleKind::Immediate(Some(outcome)),
        }
    }

    /// Creates a handle driving `future`, freshly admitted.
    pub(crate) fn driving(
        future: BoxFuture<'static, Result<T, E>>,
        permits: Arc<PermitCounter>,
        listener: Arc<dyn Listener>,
    ) -> Result<Self, crate::error::RegistrationError> {
        let shared = Shared::try_register(future, permits, listener)?;
        Ok(Self {
            kind: HandleKind::Driving(shared),
        })
    }

    /// Attempts to cancel this handle.
    ///
    /// Returns `true` iff this call performed the cancellation — i.e. it won
    /// the race against ordinary completion (or a prior cancel). On success,
    /// releases the permit, dispatches `on_released(Cancelled, None)`, and
    /// transitions the handle to [`Outcome::Cancelled`]. Idempotent: a second
    /// call, or a call that loses the race to a completion that already
    /// finished, returns `false` and performs no additional release or
    /// dispatch.
    ///
    /// Never cancels, interrupts, or otherwise touches the underlying
    /// operation's future — it simply stops being polled once nothing
    /// observes this handle as pending anymore.
    pub fn cancel(&self) -> bool {
        match &self.kind {
            HandleKind::Immediate(_) => false,
            HandleKind::Driving(shared) => match shared.finish_cancelled() {
                Some(outcome) => {
                    shared.store_and_wake(outcome, true);
                    true
                }
                None => false,
            },
        }
    }

    /// Returns `true` if this handle has reached a terminal state.
    ///
    /// Best-effort and non-linearizable with respect to a concurrent
    /// completion or cancellation landing at the same instant.
    #[must_use]
    pub fn is_done(&self) -> bool {
        match &self.kind {
            HandleKind::Immediate(_) => true,
            HandleKind::Driving(shared) => {
                shared.inner.lock().unwrap_or_else(PoisonError::into_inner).released
            }
        }
    }

    /// Returns `true` if this handle was cancelled via [`Self::cancel`].
    ///
    /// `false` for a handle whose underlying operation was itself cancelled
    /// (that surfaces as [`Outcome::Failure`] instead — see [`Outcome`]'s
    /// docs).
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match &self.kind {
            HandleKind::Immediate(_) => false,
            HandleKind::Driving(shared) => {
                shared.inner.lock().unwrap_or_else(PoisonError::into_inner).cancelled
            }
        }
    }
}

impl<T, E> Future for BulkheadHandle<T, E>
where
    E: std::error::Error + 'static,
{
    type Output = Outcome<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        let shared = match &mut this.kind {
            HandleKind::Immediate(outcome) => {
                return match outcome.take() {
                    Some(outcome) => Poll::Ready(outcome),
                    None => panic!("BulkheadHandle polled after completion"),
                };
            }
            HandleKind::Driving(shared) => Arc::clone(shared),
        };

        loop {
            let mut inner = shared.inner.lock().unwrap_or_else(PoisonError::into_inner);

            if let Some(outcome) = inner.outcome.take() {
                return Poll::Ready(outcome);
            }

            let Some(mut future) = inner.future.take() else {
                // Another path has claimed this admission (or set `released`) but has not
                // yet stored its outcome; wait to be woken once it does.
                inner.waker = Some(cx.waker().clone());
                return Poll::Pending;
            };
            drop(inner);

            match future.as_mut().poll(cx) {
                Poll::Pending => {
                    let mut inner = shared.inner.lock().unwrap_or_else(PoisonError::into_inner);
                    if let Some(outcome) = inner.outcome.take() {
                        // cancel() won while we were polling the underlying future.
                        return Poll::Ready(outcome);
                    }
                    inner.future = Some(future);
                    inner.waker = Some(cx.waker().clone());
                    return Poll::Pending;
                }
                Poll::Ready(result) => {
                    return match shared.finish_from_result(result) {
                        Some(outcome) => Poll::Ready(outcome),
                        None => continue, // cancel() claimed it first; loop to pick up its outcome.
                    };
                }
            }
        }
    }
}
