//! organize_downloads tool - runs the downloads organizer for PDFs and media

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::Config;
use crate::error::HandlerError;

use super::command::{CommandOutput, run_command};
use super::probes::{MEDIA_EXTENSIONS, PDF_EXTENSIONS, count_files};
use super::{Handler, parse_params};

/// Which organizer passes to run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Media,
    #[default]
    All,
}

impl FileType {
    fn runs_pdf(self) -> bool {
        matches!(self, Self::Pdf | Self::All)
    }

    fn runs_media(self) -> bool {
        matches!(self, Self::Media | Self::All)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Media => "media",
            Self::All => "all",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct OrganizeParams {
    #[serde(alias = "type")]
    file_type: FileType,
    dry_run: bool,
}

type PassOutcome = Result<CommandOutput, HandlerError>;

fn pass_summary(outcome: &PassOutcome) -> Value {
    match outcome {
        Ok(output) => output.summary(),
        Err(e) => json!({"success": false, "output": null, "error": e.to_string()}),
    }
}

/// Exit code of a failed pass; `None` inside when it never exited.
fn pass_failure(outcome: &PassOutcome) -> Option<Option<i32>> {
    match outcome {
        Ok(output) if output.success => None,
        Ok(output) => Some(output.code),
        Err(_) => Some(None),
    }
}

pub struct OrganizeDownloadsTool {
    config: Arc<Config>,
}

impl OrganizeDownloadsTool {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    async fn run_pass(&self, pass: &str, dry_run: bool, timeout_ms: u64) -> PassOutcome {
        let args = vec![
            "-m".to_string(),
            "downloads_organizer".to_string(),
            pass.to_string(),
            if dry_run { "--dry-run" } else { "--yes" }.to_string(),
        ];
        let cwd = self.config.paths.downloads_organizer.join("src");
        run_command(&self.config.python, &args, Some(&cwd), timeout_ms).await
    }
}

#[async_trait]
impl Handler for OrganizeDownloadsTool {
    fn name(&self) -> &'static str {
        "organize_downloads"
    }

    fn description(&self) -> &'static str {
        "Sort PDFs and/or media out of the Downloads folder. Use dry_run to preview."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_type": {
                    "type": "string",
                    "enum": ["pdf", "media", "all"],
                    "description": "Which files to organize (default: all)"
                },
                "dry_run": {
                    "type": "boolean",
                    "description": "Preview without moving files (default: false)"
                }
            },
            "additionalProperties": false
        })
    }

    async fn execute(&self, params: &Value) -> Result<Value, HandlerError> {
        let params: OrganizeParams = parse_params(params)?;

        let repo = &self.config.paths.downloads_organizer;
        if !repo.exists() {
            return Err(HandlerError::NotInstalled(format!(
                "downloads-organizer not found at {}",
                repo.display()
            )));
        }

        let timeouts = &self.config.timeouts;
        let pdf = if params.file_type.runs_pdf() {
            Some(self.run_pass("pdf", params.dry_run, timeouts.pdf_ms).await)
        } else {
            None
        };
        let media = if params.file_type.runs_media() {
            Some(self.run_pass("media", params.dry_run, timeouts.media_ms).await)
        } else {
            None
        };

        let downloads = &self.config.paths.downloads_dir;
        let report = json!({
            "file_type": params.file_type.as_str(),
            "dry_run": params.dry_run,
            "pdf": pdf.as_ref().map(pass_summary),
            "media": media.as_ref().map(pass_summary),
            "remaining": {
                "pdfs": count_files(downloads, PDF_EXTENSIONS),
                "media": count_files(downloads, MEDIA_EXTENSIONS),
            },
        });

        // Both passes have run; a failure carries the whole report.
        let failed: Vec<(&str, Option<i32>)> = [("pdf", &pdf), ("media", &media)]
            .into_iter()
            .filter_map(|(name, outcome)| Some((name, pass_failure(outcome.as_ref()?)?)))
            .collect();
        if let Some(&(_, code)) = failed.first() {
            let passes: Vec<&str> = failed.iter().map(|(name, _)| *name).collect();
            log::warn!("downloads organizer failed on {} pass", passes.join(" and "));
            return Err(HandlerError::CommandFailed {
                command: format!("downloads_organizer {}", passes.join(",")),
                code,
                stderr: report.to_string(),
            });
        }

        Ok(report)
    }
}
