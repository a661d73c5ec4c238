//! sync_monarch_transactions tool - pushes recent Monarch transactions into Notion

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::Config;
use crate::error::HandlerError;

use super::command::run_command;
use super::{Handler, parse_params};

const MAX_DAYS: u32 = 365;

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SyncParams {
    days: u32,
    dry_run: bool,
    database_id: Option<String>,
}

impl Default for SyncParams {
    fn default() -> Self {
        Self {
            days: 7,
            dry_run: false,
            database_id: None,
        }
    }
}

impl SyncParams {
    fn validate(&self) -> Result<(), HandlerError> {
        if !(1..=MAX_DAYS).contains(&self.days) {
            return Err(HandlerError::InvalidParams(format!(
                "days must be between 1 and {}, got {}",
                MAX_DAYS, self.days
            )));
        }
        if let Some(id) = &self.database_id
            && id.trim().is_empty()
        {
            return Err(HandlerError::InvalidParams("database_id must not be empty".to_string()));
        }
        Ok(())
    }

    fn to_args(&self) -> Vec<String> {
        let mut args = vec!["--days".to_string(), self.days.to_string()];
        if self.dry_run {
            args.push("--dry-run".to_string());
        }
        if let Some(id) = &self.database_id {
            args.push("--database-id".to_string());
            args.push(id.clone());
        }
        args
    }
}

/// The sync script pretty-prints a JSON object after any progress lines.
fn parse_sync_report(stdout: &str) -> Option<Value> {
    let trimmed = stdout.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed)
        && value.is_object()
    {
        return Some(value);
    }
    let start = stdout.find("\n{")? + 1;
    serde_json::from_str::<Value>(stdout[start..].trim())
        .ok()
        .filter(Value::is_object)
}

pub struct SyncMonarchTool {
    config: Arc<Config>,
}

impl SyncMonarchTool {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Handler for SyncMonarchTool {
    fn name(&self) -> &'static str {
        "sync_monarch_transactions"
    }

    fn description(&self) -> &'static str {
        "Copy recent Monarch Money transactions into the Notion transactions database, skipping duplicates."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "days": {"type": "integer", "minimum": 1, "maximum": MAX_DAYS, "description": "Days of history to sync (default: 7)"},
                "dry_run": {"type": "boolean", "description": "Preview without creating pages"},
                "database_id": {"type": "string", "description": "Override the Notion database ID"}
            },
            "additionalProperties": false
        })
    }

    async fn execute(&self, params: &Value) -> Result<Value, HandlerError> {
        let params: SyncParams = parse_params(params)?;
        params.validate()?;

        let repo = &self.config.paths.monarch_mcp;
        let script = repo.join(&self.config.monarch.sync_script);
        if !script.is_file() {
            return Err(HandlerError::NotInstalled(format!(
                "Monarch sync script not found at {}",
                script.display()
            )));
        }

        let mut args = vec![script.to_string_lossy().into_owned()];
        args.extend(params.to_args());

        let output = run_command(&self.config.python, &args, Some(repo), self.config.timeouts.monarch_sync_ms).await?;
        let report = parse_sync_report(&output.stdout);

        if !output.success {
            // A partial sync still prints its summary; prefer it over the raw stream.
            if let Some(summary) = report.as_ref().and_then(|r| r.get("summary")).and_then(Value::as_str) {
                return Err(HandlerError::CommandFailed {
                    command: output.command,
                    code: output.code,
                    stderr: summary.to_string(),
                });
            }
            output.clone().check()?;
        }

        let report = report.ok_or_else(|| {
            HandlerError::MalformedOutput(format!(
                "sync script did not print a JSON summary: {}",
                output.stdout_tail().unwrap_or_default()
            ))
        })?;

        log::info!(
            "Monarch sync: {} synced, {} skipped (dry_run={})",
            report.get("synced").unwrap_or(&Value::Null),
            report.get("skipped").unwrap_or(&Value::Null),
            params.dry_run
        );

        Ok(json!({
            "success": report.get("success").and_then(Value::as_bool).unwrap_or(true),
            "days": params.days,
            "dry_run": params.dry_run,
            "synced": report.get("synced").cloned().unwrap_or(json!(0)),
            "skipped": report.get("skipped").cloned().unwrap_or(json!(0)),
            "errors": report.get("errors").cloned().unwrap_or(json!(0)),
            "summary": report.get("summary").cloned(),
        }))
    }
}
