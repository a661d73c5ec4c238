//! Tool handlers
//!
//! Each handler is a thin adapter around one external collaborator: a Python
//! automation launched as a subprocess, a local probe, or an HTTP service.
//! Handlers own their parameter schema and reject malformed input before
//! touching the collaborator.

mod briefing;
mod command;
mod context_sync;
mod downloads;
mod financial;
mod monarch;
mod probes;
mod status;
mod tax_ocr;

pub use briefing::DailyBriefingTool;
pub use command::{CommandOutput, OUTPUT_TAIL_CHARS, run_command, tail_chars};
pub use context_sync::SyncNotionContextTool;
pub use downloads::{FileType, OrganizeDownloadsTool};
pub use financial::FinancialSummaryTool;
pub use monarch::SyncMonarchTool;
pub use probes::{StatusSummary, SystemStatus, format_time_ago};
pub use status::{EcosystemStatusTool, ReconciliationTool};
pub use tax_ocr::ExtractTaxDocumentsTool;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HandlerError;

/// A tool that can be dispatched by name
#[async_trait]
pub trait Handler: Send + Sync {
    /// Tool name as seen by callers
    fn name(&self) -> &'static str;

    /// Human-readable description
    fn description(&self) -> &'static str;

    /// JSON Schema for input parameters
    fn input_schema(&self) -> Value;

    /// Perform the external action and return a JSON-serializable result
    async fn execute(&self, params: &Value) -> Result<Value, HandlerError>;
}

/// Tool definition advertised to callers
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDefinition {
    pub fn of(handler: &dyn Handler) -> Self {
        Self {
            name: handler.name().to_string(),
            description: handler.description().to_string(),
            input_schema: handler.input_schema(),
        }
    }
}

/// Parameters for tools that take none.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoParams {}

/// Decode a handler's typed parameters. `null` is treated as an empty mapping.
pub fn parse_params<T: DeserializeOwned>(params: &Value) -> Result<T, HandlerError> {
    let value = match params {
        Value::Null => Value::Object(Default::default()),
        Value::Object(_) => params.clone(),
        other => {
            return Err(HandlerError::InvalidParams(format!(
                "expected an object, got {}",
                json_kind(other)
            )));
        }
    };
    serde_json::from_value(value).map_err(|e| HandlerError::InvalidParams(e.to_string()))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Schema for a tool without parameters
pub fn empty_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {},
        "additionalProperties": false
    })
}
