//! Immutable handler registry

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::Config;
use crate::handlers::{
    DailyBriefingTool, EcosystemStatusTool, ExtractTaxDocumentsTool, FinancialSummaryTool, Handler, OrganizeDownloadsTool,
    ReconciliationTool, SyncMonarchTool, SyncNotionContextTool, ToolDefinition,
};

/// Name → handler table, fixed after [`ToolRegistryBuilder::build`].
pub struct ToolRegistry {
    handlers: BTreeMap<&'static str, Box<dyn Handler>>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    /// Registry with every ecosystem tool wired to `config`
    pub fn standard(config: Arc<Config>) -> Self {
        Self::builder()
            .register(EcosystemStatusTool::new(config.clone()))
            .register(ReconciliationTool::new(config.clone()))
            .register(OrganizeDownloadsTool::new(config.clone()))
            .register(SyncNotionContextTool::new(config.clone()))
            .register(ExtractTaxDocumentsTool::new(config.clone()))
            .register(SyncMonarchTool::new(config.clone()))
            .register(FinancialSummaryTool::new(config.clone()))
            .register(DailyBriefingTool::new(config))
            .build()
    }

    pub fn get(&self, name: &str) -> Option<&dyn Handler> {
        self.handlers.get(name).map(|h| h.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered tool names in sorted order
    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.handlers.values().map(|h| ToolDefinition::of(h.as_ref())).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Collects handlers before the registry is frozen
#[derive(Default)]
pub struct ToolRegistryBuilder {
    handlers: BTreeMap<&'static str, Box<dyn Handler>>,
}

impl ToolRegistryBuilder {
    /// Add a handler. A later registration under the same name replaces the earlier one.
    pub fn register(mut self, handler: impl Handler + 'static) -> Self {
        let name = handler.name();
        if self.handlers.insert(name, Box::new(handler)).is_some() {
            log::warn!("Handler {} registered twice; keeping the latest", name);
        }
        self
    }

    pub fn build(self) -> ToolRegistry {
        ToolRegistry { handlers: self.handlers }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use async_trait::async_trait;
    use serde_json::{Value, json};

    struct Echo(&'static str);

    #[async_trait]
    impl Handler for Echo {
        fn name(&self) -> &'static str {
            self.0
        }

        fn description(&self) -> &'static str {
            "Echo parameters back"
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, params: &Value) -> Result<Value, HandlerError> {
            Ok(params.clone())
        }
    }

    #[test]
    fn test_standard_registry_has_every_tool() {
        let registry = ToolRegistry::standard(Arc::new(Config::default()));

        assert_eq!(
            registry.names(),
            vec![
                "extract_tax_documents",
                "get_daily_briefing",
                "get_ecosystem_status",
                "get_financial_summary",
                "organize_downloads",
                "run_reconciliation",
                "sync_monarch_transactions",
                "sync_notion_context",
            ]
        );
        assert_eq!(registry.len(), 8);
    }

    #[test]
    fn test_definitions_carry_schemas() {
        let registry = ToolRegistry::standard(Arc::new(Config::default()));
        let defs = registry.definitions();

        assert_eq!(defs.len(), registry.len());
        for def in &defs {
            assert!(!def.description.is_empty(), "{} has no description", def.name);
            assert_eq!(def.input_schema["type"], "object", "{} schema", def.name);
        }
    }

    #[test]
    fn test_lookup() {
        let registry = ToolRegistry::builder().register(Echo("echo")).build();

        assert!(registry.contains("echo"));
        assert_eq!(registry.get("echo").map(|h| h.name()), Some("echo"));
        assert!(registry.get("nonexistent_tool").is_none());
    }

    #[test]
    fn test_duplicate_registration_replaces() {
        let registry = ToolRegistry::builder().register(Echo("echo")).register(Echo("echo")).build();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_empty_registry() {
        let registry = ToolRegistry::builder().build();
        assert!(registry.is_empty());
        assert!(registry.definitions().is_empty());
    }
}
