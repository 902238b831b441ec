//! Deferred values and `then`-chaining.
//!
//! A [`Deferred`] stands for the eventual success or failure of a
//! computation. Whoever owns the computation settles it exactly once with
//! [`Deferred::resolve`] or [`Deferred::reject`]; everyone else composes on
//! top of it with [`Deferred::then`], which hands back a new derived
//! [`Deferred`]. Callbacks run synchronously on the settling thread: there is
//! no scheduler behind this crate.
//!
//! # Examples
//!
//! ```
//! use promise_chain::{Deferred, Status};
//!
//! let d = Deferred::<i32, String>::new();
//! let r = d.map(|x| x + 1);
//! assert_eq!(r.status(), Status::Pending);
//!
//! d.resolve(41).unwrap();
//! assert_eq!(r.value(), Some(Ok(42)));
//! ```
use std::fmt;

use thiserror::Error;

mod deferred;
mod dependent;
mod drain;
pub mod future;
mod wrap;

pub use deferred::{Deferred, FailureHandler, SettlementRecord};
pub use wrap::{wrap, IntoDeferred, Resolution};

/// Where a [`Deferred`] is in its lifecycle. Both settled states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Pending,
    Fulfilled,
    Rejected,
}

impl Status {
    pub fn is_settled(self) -> bool {
        !matches!(self, Status::Pending)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Pending => f.write_str("pending"),
            Status::Fulfilled => f.write_str("fulfilled"),
            Status::Rejected => f.write_str("rejected"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error<T, E> {
    /// A second settlement was attempted. `attempted` is the payload that was
    /// refused: `Ok` for a resolve, `Err` for a reject. The deferred keeps its
    /// first outcome.
    #[error(
        "cannot {} a deferred that is already {status}",
        attempt_verb(.attempted)
    )]
    AlreadySettled {
        status: Status,
        attempted: Result<T, E>,
    },
}

fn attempt_verb<T, E>(attempted: &Result<T, E>) -> &'static str {
    match attempted {
        Ok(_) => "resolve",
        Err(_) => "reject",
    }
}

impl<T, E> Error<T, E> {
    /// The status the deferred was already in.
    pub fn status(&self) -> Status {
        match self {
            Error::AlreadySettled { status, .. } => *status,
        }
    }

    /// Hands the refused payload back.
    pub fn into_attempted(self) -> Result<T, E> {
        match self {
            Error::AlreadySettled { attempted, .. } => attempted,
        }
    }
}
