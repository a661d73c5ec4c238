//! Tool dispatch
//!
//! [`ToolRegistry`] maps tool names to handlers and is frozen once built.
//! [`Dispatcher`] runs one handler per call, times it, and appends exactly one
//! record to the ledger.

mod dispatcher;
mod registry;

pub use dispatcher::{DispatchResponse, Dispatcher};
pub use registry::{ToolRegistry, ToolRegistryBuilder};
