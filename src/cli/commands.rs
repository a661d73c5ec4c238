//! CLI command definitions using clap.
//!
//! - serve: JSON Lines server on stdin/stdout
//! - tools: list registered tools
//! - call: dispatch one tool and print the response
//! - history: show recent ledger records
//! - purge: delete ledger records

use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;

/// ecoshim - tool dispatcher and operation history for the automation ecosystem
#[derive(Parser, Debug)]
#[command(name = "ecoshim")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve tool calls as JSON Lines over stdin/stdout
    Serve,

    /// List registered tools
    Tools,

    /// Dispatch a single tool call
    Call {
        /// Tool name, e.g. organize_downloads
        tool: String,

        /// Parameters as a JSON object
        #[arg(short, long, default_value = "{}")]
        params: String,
    },

    /// Show recent operations, newest first
    History {
        /// Number of records to show
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,

        /// Only show operations of this tool
        #[arg(short, long)]
        tool: Option<String>,
    },

    /// Delete ledger records
    #[command(group(ArgGroup::new("scope").required(true).args(["all", "before"])))]
    Purge {
        /// Delete every record
        #[arg(long)]
        all: bool,

        /// Delete records captured before this RFC 3339 timestamp
        #[arg(long)]
        before: Option<String>,

        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}
