//! Routed table access: resolution, statement building and dispatch.

pub mod accessor;
pub mod dispatch;

pub use accessor::{InsertOutcome, TableAccessor};
pub use dispatch::{DispatchDescriptor, DispatchTarget};
