//! get_ecosystem_status and run_reconciliation tools

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use serde_json::{Value, json};

use crate::config::Config;
use crate::error::HandlerError;

use super::probes::{self, Health, StatusSummary};
use super::{Handler, NoParams, empty_schema, parse_params};

/// Reports health of every wrapped automation
pub struct EcosystemStatusTool {
    config: Arc<Config>,
}

impl EcosystemStatusTool {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Handler for EcosystemStatusTool {
    fn name(&self) -> &'static str {
        "get_ecosystem_status"
    }

    fn description(&self) -> &'static str {
        "Health and pending work for the downloads organizer, tax watcher, Monarch session, context sync and tax OCR."
    }

    fn input_schema(&self) -> Value {
        empty_schema()
    }

    async fn execute(&self, params: &Value) -> Result<Value, HandlerError> {
        parse_params::<NoParams>(params)?;

        let systems = probes::collect(&self.config).await;
        let attention_items: Vec<String> = systems.iter().flat_map(|s| s.labelled_attention()).collect();
        let summary = StatusSummary::from_statuses(&systems);

        Ok(json!({
            "timestamp": Local::now().to_rfc3339(),
            "systems": systems,
            "attention_items": attention_items,
            "summary": summary,
        }))
    }
}

/// Lists everything that needs a human: attention items plus systems that are down
pub struct ReconciliationTool {
    config: Arc<Config>,
}

impl ReconciliationTool {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Handler for ReconciliationTool {
    fn name(&self) -> &'static str {
        "run_reconciliation"
    }

    fn description(&self) -> &'static str {
        "Cross-check all automations and list outstanding issues."
    }

    fn input_schema(&self) -> Value {
        empty_schema()
    }

    async fn execute(&self, params: &Value) -> Result<Value, HandlerError> {
        parse_params::<NoParams>(params)?;

        let systems = probes::collect(&self.config).await;
        let mut issues = Vec::new();
        for system in &systems {
            if system.health() == Health::NotRunning && system.status != "idle" {
                issues.push(format!("{}: {}", system.name, system.status.replace('_', " ")));
            }
            issues.extend(system.attention.iter().map(|item| format!("{}: {}", system.name, item)));
        }

        Ok(json!({
            "checked_at": Local::now().to_rfc3339(),
            "issue_count": issues.len(),
            "issues": issues,
            "summary": StatusSummary::from_statuses(&systems),
        }))
    }
}
