//! Defines the errors surfaced by a [`crate::Bulkhead`].
//!
//! Four kinds of error are distinguished, matching the four ways a submission
//! can fail to become (or stay) a successfully admitted operation: rejection
//! at admission, failure of the admitted operation itself, misuse by the
//! caller, and a broken accounting invariant.
use {
    core::{any::Any, fmt},
    std::sync::Arc,
    thiserror::Error as ThisError,
};

/// The payload of a caught panic, as returned by [`std::panic::catch_unwind`].
pub type Panic = Box<dyn Any + Send + 'static>;

/// The failure carried by a terminal, non-success, non-cancelled [`crate::Outcome`].
///
/// Exactly one of these is produced per admitted submission that does not
/// succeed; [`Self::Operation`] carries the original error returned by the
/// caller's future completely unchanged — the bulkhead never stringifies,
/// boxes away, or otherwise reinterprets it.
#[derive(ThisError)]
pub enum BulkheadError<E> {
    /// No permit was available at submission time. The factory was never
    /// invoked.
    #[error("bulkhead rejected submission: no permit available")]
    Rejected,
    /// The factory panicked while being invoked.
    #[error("bulkhead factory panicked")]
    FactoryPanicked(Panic),
    /// Attaching the terminal observer to the admitted operation failed.
    #[error("bulkhead failed to register terminal observer: {0}")]
    Registration(#[from] RegistrationError),
    /// Releasing the permit detected a broken accounting invariant.
    #[error(transparent)]
    InvariantViolation(#[from] InvariantViolation),
    /// The admitted operation's future completed with this error.
    #[error(transparent)]
    Operation(E),
}

impl<E> BulkheadError<E> {
    /// Returns `self` as a [`std::error::Error`] trait object, erasing `E`.
    ///
    /// Used to hand listeners a type-erased view of the failure without
    /// requiring [`crate::Listener`] to be generic over every operation's
    /// error type.
    #[must_use]
    pub fn as_dyn_error(&self) -> &(dyn std::error::Error + 'static)
    where
        E: std::error::Error + 'static,
    {
        self
    }
}

/// A detected inconsistency in permit accounting.
///
/// Indicates a bug in the bulkhead itself, in a caller that extends it, or in
/// a misbehaving [`crate::Listener`] — never a normal operating condition.
#[derive(Clone, Copy, Debug, ThisError)]
#[error("bulkhead permit accounting invariant broken: available = {observed}, limit = {limit}")]
pub struct InvariantViolation {
    /// The value observed outside of `0..=limit`.
    pub observed: i64,
    /// The configured limit the observed value should have stayed within.
    pub limit: usize,
}

/// An error attaching the terminal observer to an admitted operation's future.
///
/// Carries no payload beyond a description in the current implementation (see
/// `DESIGN.md`), but is kept as a distinct, constructible type so that the
/// asymmetric handling `spec.md` §9 requires (dispatch `on_released` only if
/// the subsequent checked release itself succeeds) has a concrete error to
/// exercise in tests.
#[derive(Clone, Debug, ThisError)]
#[error("failed to register terminal observer: {0}")]
pub struct RegistrationError(pub(crate) Arc<str>);

impl RegistrationError {
    /// Creates a new [`RegistrationError`] describing `reason`.
    #[must_use]
    pub fn new(reason: impl Into<Arc<str>>) -> Self {
        Self(reason.into())
    }
}

/// A programmer error detected synchronously at the call site.
///
/// Never consumes a permit; [`crate::Bulkhead::new`] is the only fallible
/// constructor, and it fails before any permit accounting exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
pub enum CallerError {
    /// [`crate::Bulkhead::new`] was called with a limit of `0`.
    #[error("bulkhead limit must be positive, got {0}")]
    NonPositiveLimit(usize),
}

impl<E> PartialEq for BulkheadError<E>
where
    E: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Rejected, Self::Rejected) => true,
            (Self::Registration(a), Self::Registration(b)) => a.0 == b.0,
            (Self::InvariantViolation(a), Self::InvariantViolation(b)) => {
                a.observed == b.observed && a.limit == b.limit
            }
            (Self::Operation(a), Self::Operation(b)) => a == b,
            // FactoryPanicked payloads are not comparable.
            _ => false,
        }
    }
}

impl<E> fmt::Debug for BulkheadError<E>
where
    E: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected => f.write_str("BulkheadError::Rejected"),
            Self::FactoryPanicked(_) => f.write_str("BulkheadError::FactoryPanicked(..)"),
            Self::Registration(error) => write!(f, "BulkheadError::Registration({:?})", error),
            Self::InvariantViolation(error) => {
                write!(f, "BulkheadError::InvariantViolation({:?})", error)
            }
            Self::Operation(error) => write!(f, "BulkheadError::Operation({:?})", error),
        }
    }
}
