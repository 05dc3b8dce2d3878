//! Cooperative cancellation.
//!
//! A [`CancellationToken`] is shared between the caller that requests a stop
//! and the task that drives a subprocess or a batch.

mod token;

pub use token::CancellationToken;
