//! stdio transport
//!
//! Exposes the dispatcher as newline-delimited JSON over stdin/stdout:
//! - `tools/list`: registered tools with their schemas
//! - `tools/call`: dispatch one tool and record it
//! - `history`: read recent ledger records

pub mod messages;
pub mod server;

pub use messages::{ErrorCode, Methods, Request, Response, RpcError};
pub use server::{DEFAULT_HISTORY_LIMIT, HISTORY_TOOL, MAX_HISTORY_LIMIT, Server, history_entry};
