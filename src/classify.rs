//! Classifies the outcome of an admitted operation.
//!
//! A pure function, [`classify`], mapping an optional error to one of
//! [`TerminalKind::Success`], [`TerminalKind::Failure`], or
//! [`TerminalKind::Cancelled`]. Nothing here touches permit accounting or
//! dispatches a listener — see [`crate::handle`] and [`crate::listener`] for
//! that.
use core::fmt;

/// The terminal kind of an admitted operation, as reported to a
/// [`crate::Listener`]'s `on_released`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminalKind {
    /// The operation completed without error.
    Success,
    /// The operation completed with an error other than cancellation.
    Failure,
    /// The operation (or the handle) was cancelled.
    Cancelled,
}

/// The cancellation marker this crate recognizes.
///
/// An admitted operation's future should resolve to an error containing this
/// type — either directly or one [`std::error::Error::source`] hop away — to
/// be classified [`TerminalKind::Cancelled`] rather than
/// [`TerminalKind::Failure`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("operation was cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Classifies `error` into a [`TerminalKind`].
///
/// `None` is [`TerminalKind::Success`]. An error is [`TerminalKind::Cancelled`]
/// if it *is* [`Cancelled`], or if its [`std::error::Error::source`] is — this
/// single hop is the "completion-wrapper" unwrap `spec.md` §4.2 requires;
/// deeper chains are not inspected. Every other error is
/// [`TerminalKind::Failure`].
#[must_use]
pub fn classify<E>(error: Option<&E>) -> TerminalKind
where
    E: std::error::Error + 'static,
{
    let Some(error) = error else {
        return TerminalKind::Success;
    };

    let as_dyn: &(dyn std::error::Error + 'static) = error;
    if as_dyn.is::<Cancelled>() {
        return TerminalKind::Cancelled;
    }

    if let Some(source) = as_dyn.source() {
        if source.is::<Cancelled>() {
            return TerminalKind::Cancelled;
        }
    }

    TerminalKind::Failure
}
