//! sync_notion_context tool - runs the treehouse context sync script

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::config::Config;
use crate::error::HandlerError;

use super::command::run_command;
use super::probes::{context_changelog, file_mtime};
use super::{Handler, NoParams, empty_schema, parse_params};

pub struct SyncNotionContextTool {
    config: Arc<Config>,
}

impl SyncNotionContextTool {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// `sync.py` at the repo root, else `src/sync.py`.
    fn locate_script(&self) -> Option<PathBuf> {
        let repo = &self.config.paths.context_sync;
        [repo.join("sync.py"), repo.join("src/sync.py")]
            .into_iter()
            .find(|p| p.is_file())
    }
}

#[async_trait]
impl Handler for SyncNotionContextTool {
    fn name(&self) -> &'static str {
        "sync_notion_context"
    }

    fn description(&self) -> &'static str {
        "Sync the latest Notion context into the treehouse-context-sync repository."
    }

    fn input_schema(&self) -> Value {
        empty_schema()
    }

    async fn execute(&self, params: &Value) -> Result<Value, HandlerError> {
        parse_params::<NoParams>(params)?;

        let repo = &self.config.paths.context_sync;
        if !repo.exists() {
            return Err(HandlerError::NotInstalled(format!(
                "treehouse-context-sync not found at {}",
                repo.display()
            )));
        }
        let script = self
            .locate_script()
            .ok_or_else(|| HandlerError::NotInstalled("sync.py not found in treehouse-context-sync".to_string()))?;

        let output = run_command(
            &self.config.python,
            &[script.to_string_lossy().into_owned()],
            Some(repo),
            self.config.timeouts.context_sync_ms,
        )
        .await?
        .check()?;

        let last_sync = file_mtime(&context_changelog(repo)).map(|t| t.to_rfc3339());

        Ok(json!({
            "success": true,
            "output": output.stdout_tail(),
            "last_sync": last_sync,
        }))
    }
}
