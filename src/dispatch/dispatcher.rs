//! Dispatcher: handler invocation plus one ledger append per call

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::WriteFailurePolicy;
use crate::error::{Result, ShimError};
use crate::ledger::{Ledger, NewOperation};

use super::registry::ToolRegistry;

/// Outcome of one dispatched call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchResponse {
    pub success: bool,

    /// Handler output, or the error message as a JSON string
    pub result: Value,

    /// Time spent inside the handler
    pub duration_ms: u64,

    /// Ledger id of the appended record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<i64>,

    /// Set when the record could not be written and the policy is `degrade`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_error: Option<String>,
}

pub struct Dispatcher {
    registry: ToolRegistry,
    ledger: Arc<Ledger>,
    on_write_failure: WriteFailurePolicy,
}

impl Dispatcher {
    pub fn new(registry: ToolRegistry, ledger: Arc<Ledger>, on_write_failure: WriteFailurePolicy) -> Self {
        Self {
            registry,
            ledger,
            on_write_failure,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Run `tool_name` with `parameters` and record the outcome.
    ///
    /// Unknown tools fail before any handler runs and leave the ledger untouched.
    /// Handler failures are not errors here: they come back as
    /// `success = false` responses.
    pub async fn dispatch(&self, tool_name: &str, parameters: Value) -> Result<DispatchResponse> {
        let handler = self
            .registry
            .get(tool_name)
            .ok_or_else(|| ShimError::UnknownTool(tool_name.to_string()))?;

        log::info!("Dispatching {}", tool_name);

        let start = Instant::now();
        let outcome = handler.execute(&parameters).await;
        let elapsed = start.elapsed();
        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        let (success, result, op) = match outcome {
            Ok(value) => {
                log::info!("{} succeeded in {}ms", tool_name, duration_ms);
                let op = NewOperation::succeeded(tool_name, &parameters, &value, duration_ms);
                (true, value, op)
            }
            Err(e) => {
                let detail = e.to_string();
                log::warn!("{} failed after {}ms: {}", tool_name, duration_ms, detail);
                let op = NewOperation::failed(tool_name, &parameters, detail.clone(), duration_ms);
                (false, Value::String(detail), op)
            }
        };

        let mut response = DispatchResponse {
            success,
            result,
            duration_ms,
            record_id: None,
            ledger_error: None,
        };

        match self.ledger.record(&op) {
            Ok(id) => response.record_id = Some(id),
            Err(e) => {
                log::error!("Failed to record {} in ledger: {}", tool_name, e);
                match self.on_write_failure {
                    WriteFailurePolicy::Strict => return Err(ShimError::Storage(e)),
                    WriteFailurePolicy::Degrade => response.ledger_error = Some(e.to_string()),
                }
            }
        }

        Ok(response)
    }
}
