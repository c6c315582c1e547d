//! Cooperative cancellation and guaranteed teardown.
//!
//! A pipeline invocation can only be aborted externally; when that
//! happens, provisioned environments and scratch state must still be
//! released. The token is checked between steps, and the cleanup registry
//! runs teardown callbacks in LIFO order on both failure and abort paths.

mod cleanup;
mod token;

pub use cleanup::{CleanupGuard, CleanupRegistry};
pub use token::CancellationToken;
