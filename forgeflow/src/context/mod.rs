//! Run identity and the mutable context of a pipeline invocation.

mod execution;
mod identity;

pub use execution::{BuildContext, ScratchRoot};
pub use identity::RunIdentity;
