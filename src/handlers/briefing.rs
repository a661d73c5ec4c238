//! get_daily_briefing tool - one digest of system health, pending documents and finances

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::Config;
use crate::error::HandlerError;

use super::financial::FinancialSummaryTool;
use super::probes::{self, Health, MEDIA_EXTENSIONS, PDF_EXTENSIONS, SystemStatus};
use super::{Handler, parse_params};

/// Attention items shown in the text rendering
const TEXT_ATTENTION_ITEMS: usize = 5;

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct BriefingParams {
    include_financial: bool,
}

impl Default for BriefingParams {
    fn default() -> Self {
        Self { include_financial: true }
    }
}

#[derive(Debug, Default, Serialize, PartialEq)]
struct EcosystemDigest {
    healthy: usize,
    attention_needed: usize,
    attention_items: Vec<String>,
}

impl EcosystemDigest {
    /// An idle system counts as healthy here.
    fn from_statuses(statuses: &[SystemStatus]) -> Self {
        let mut digest = Self::default();
        for status in statuses {
            if status.health() == Health::Healthy || status.status == "idle" {
                digest.healthy += 1;
            } else {
                digest.attention_needed += 1;
            }
            digest.attention_items.extend(status.labelled_attention());
        }
        digest
    }
}

#[derive(Debug, Default, Serialize, PartialEq)]
struct PendingDocuments {
    pending_pdfs: usize,
    pending_media: usize,
    needs_review: usize,
    total_pending: usize,
}

impl PendingDocuments {
    fn collect(config: &Config) -> Self {
        let downloads = &config.paths.downloads_dir;
        let pending_pdfs = probes::count_files(downloads, PDF_EXTENSIONS);
        let pending_media = probes::count_files(downloads, MEDIA_EXTENSIONS);
        let needs_review = probes::needs_review_count(&config.paths.notion_rules.join(&config.ocr.checkpoint)).unwrap_or(0);
        Self {
            pending_pdfs,
            pending_media,
            needs_review,
            total_pending: pending_pdfs + pending_media + needs_review,
        }
    }
}

#[derive(Debug, Serialize)]
struct Briefing {
    generated_at: String,
    greeting: &'static str,
    date: String,
    ecosystem: EcosystemDigest,
    documents: PendingDocuments,
    #[serde(skip_serializing_if = "Option::is_none")]
    financial: Option<Value>,
    summary: String,
}

impl Briefing {
    fn new(
        now: DateTime<Local>,
        ecosystem: EcosystemDigest,
        documents: PendingDocuments,
        financial: Option<Value>,
    ) -> Self {
        let summary = summary_line(&ecosystem, &documents);
        Self {
            generated_at: now.to_rfc3339(),
            greeting: greeting(now.hour()),
            date: now.format("%A, %B %d, %Y").to_string(),
            ecosystem,
            documents,
            financial,
            summary,
        }
    }

    /// Markdown rendering for notifications and Notion pages
    fn to_text(&self) -> String {
        let mut lines = vec![
            format!("# {}!", self.greeting),
            format!("**{}**", self.date),
            String::new(),
            format!("*{}*", self.summary),
            String::new(),
            "## Ecosystem Status".to_string(),
            format!("- Healthy: {}", self.ecosystem.healthy),
            format!("- Needs attention: {}", self.ecosystem.attention_needed),
        ];
        lines.extend(
            self.ecosystem
                .attention_items
                .iter()
                .take(TEXT_ATTENTION_ITEMS)
                .map(|item| format!("  - {}", item)),
        );

        lines.push(String::new());
        lines.push("## Pending Documents".to_string());
        lines.push(format!("- PDFs: {}", self.documents.pending_pdfs));
        lines.push(format!("- Media: {}", self.documents.pending_media));
        lines.push(format!("- Needs review: {}", self.documents.needs_review));

        if let Some(financial) = &self.financial {
            lines.push(String::new());
            lines.push("## Financial Summary".to_string());
            match financial.get("error").and_then(Value::as_str) {
                Some(error) => lines.push(format!("- {}", error)),
                None => {
                    let figure = |key: &str| financial.get(key).and_then(Value::as_f64).unwrap_or(0.0);
                    lines.push(format!("- Net worth: {}", format_money(figure("net_worth"))));
                    lines.push(format!("- MTD Income: {}", format_money(figure("mtd_income"))));
                    lines.push(format!("- MTD Expenses: {}", format_money(figure("mtd_expenses").abs())));
                }
            }
        }

        lines.join("\n")
    }
}

fn greeting(hour: u32) -> &'static str {
    match hour {
        0..=11 => "Good morning",
        12..=16 => "Good afternoon",
        _ => "Good evening",
    }
}

fn summary_line(ecosystem: &EcosystemDigest, documents: &PendingDocuments) -> String {
    let mut parts = Vec::new();
    if ecosystem.attention_needed > 0 {
        parts.push(format!("{} system(s) need attention", ecosystem.attention_needed));
    } else {
        parts.push(format!("All {} systems healthy", ecosystem.healthy));
    }
    if documents.total_pending > 0 {
        parts.push(format!("{} document(s) pending", documents.total_pending));
    }
    format!("{}.", parts.join(". "))
}

/// `1234.5` → `$1,234.50`
fn format_money(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, grouped, cents % 100)
}

pub struct DailyBriefingTool {
    config: Arc<Config>,
    financial: FinancialSummaryTool,
}

impl DailyBriefingTool {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            financial: FinancialSummaryTool::new(config.clone()),
            config,
        }
    }
}

#[async_trait]
impl Handler for DailyBriefingTool {
    fn name(&self) -> &'static str {
        "get_daily_briefing"
    }

    fn description(&self) -> &'static str {
        "Morning digest: system health, documents waiting in Downloads or review, and optionally finances."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "include_financial": {
                    "type": "boolean",
                    "description": "Include balances and month-to-date cash flow (default: true)"
                }
            },
            "additionalProperties": false
        })
    }

    async fn execute(&self, params: &Value) -> Result<Value, HandlerError> {
        let params: BriefingParams = parse_params(params)?;

        let statuses = probes::collect(&self.config).await;
        let ecosystem = EcosystemDigest::from_statuses(&statuses);
        let documents = PendingDocuments::collect(&self.config);

        // A financial outage degrades the briefing instead of failing it.
        let financial = if params.include_financial {
            Some(match self.financial.execute(&Value::Null).await {
                Ok(summary) => summary,
                Err(e) => {
                    log::warn!("Briefing without financial data: {}", e);
                    json!({ "error": e.to_string() })
                }
            })
        } else {
            None
        };

        let briefing = Briefing::new(Local::now(), ecosystem, documents, financial);
        let text = briefing.to_text();

        let mut value = serde_json::to_value(&briefing)
            .map_err(|e| HandlerError::MalformedOutput(format!("briefing: {}", e)))?;
        value["text"] = Value::String(text);
        Ok(value)
    }
}
