//! ecoshim - tool dispatcher and operation history for a personal automation ecosystem
//!
//! Each tool wraps an existing automation (downloads organizer, Notion context
//! sync, tax OCR, Monarch sync, financial service). Every dispatched call is
//! timed and appended to an SQLite ledger that can be queried for history.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod ipc;
pub mod ledger;

pub use config::{Config, WriteFailurePolicy};
pub use dispatch::{DispatchResponse, Dispatcher, ToolRegistry};
pub use error::{HandlerError, Result, ShimError, StorageError};
pub use ledger::{Ledger, NewOperation, OperationRecord};
