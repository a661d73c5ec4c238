//! Command-line interface: the stdio server plus local tools for calling
//! handlers and inspecting the history ledger.

pub mod commands;

pub use commands::{Cli, Commands};
