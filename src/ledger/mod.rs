//! Operation history ledger.
//!
//! Every dispatched handler call is appended here exactly once, after the
//! handler returns. The ledger never updates rows; deletion is reserved for the
//! explicit `purge` maintenance command.
//!
//! # Example
//!
//! ```ignore
//! use ecoshim::ledger::{Ledger, NewOperation};
//! use serde_json::json;
//!
//! let ledger = Ledger::open("/tmp/history.db")?;
//! ledger.record(&NewOperation::succeeded("sync_notion_context", &json!({}), &json!("ok"), 1200))?;
//!
//! for record in ledger.query(20)? {
//!     println!("{} {} {}", record.id, record.tool_name, record.success);
//! }
//! ```

mod record;
mod store;

pub use record::{NewOperation, OperationRecord, format_timestamp, now_timestamp, truncate_chars};
pub use store::Ledger;
