//! An in-process admission-control primitive bounding concurrent async work.
//!
//! A [`Bulkhead`] guards a block of code with a fixed number of permits.
//! [`Bulkhead::submit`] never blocks: it either admits the submission (and
//! invokes the supplied factory to obtain the operation's future) or rejects
//! it immediately if no permit is free. The returned [`BulkheadHandle`] is
//! itself a [`std::future::Future`] whose `Output` is an [`Outcome`] — drive
//! it to completion the normal way, or cancel it with
//! [`BulkheadHandle::cancel`] at any time. Exactly one permit release and at
//! most one [`Listener::on_released`] dispatch happens per admitted
//! submission, regardless of which of completion, cancellation, or a
//! factory panic reaches the terminal state first.
//!
//! ```
//! use bulkhead::Bulkhead;
//!
//! let bulkhead = Bulkhead::unobserved(4)?;
//! let outcome = futures::executor::block_on(
//!     bulkhead.submit(|| async { Ok::<_, std::convert::Infallible>(1 + 1) }),
//! );
//! assert!(outcome.is_success());
//! # Ok::<(), bulkhead::CallerError>(())
//! ```

mod bulkhead;
mod classify;
mod error;
mod handle;
mod listener;
mod permit;

pub use crate::{
    bulkhead::Bulkhead,
    classify::{Cancelled, TerminalKind},
    error::{BulkheadError, CallerError, InvariantViolation, Panic, RegistrationError},
    handle::{BulkheadHandle, Outcome},
    listener::{Listener, NoopListener},
};
