//! extract_tax_documents tool - runs the notion-rules OCR pipeline

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::Config;
use crate::error::HandlerError;

use super::command::run_command;
use super::probes::needs_review_count;
use super::{Handler, parse_params};

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ExtractParams {
    dry_run: bool,
    tax_year: Option<u16>,
    limit: Option<u32>,
}

impl ExtractParams {
    fn validate(&self) -> Result<(), HandlerError> {
        if let Some(year) = self.tax_year
            && !(2000..=2100).contains(&year)
        {
            return Err(HandlerError::InvalidParams(format!("tax_year out of range: {}", year)));
        }
        if self.limit == Some(0) {
            return Err(HandlerError::InvalidParams("limit must be > 0".to_string()));
        }
        Ok(())
    }

    fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.dry_run {
            args.push("--dry-run".to_string());
        }
        if let Some(year) = self.tax_year {
            args.push("--year".to_string());
            args.push(year.to_string());
        }
        if let Some(limit) = self.limit {
            args.push("--limit".to_string());
            args.push(limit.to_string());
        }
        args
    }
}

pub struct ExtractTaxDocumentsTool {
    config: Arc<Config>,
}

impl ExtractTaxDocumentsTool {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

/// The pipeline prints a JSON report as its last non-empty line.
fn parse_report(stdout: &str) -> Option<Value> {
    let last = stdout.lines().rev().find(|l| !l.trim().is_empty())?;
    serde_json::from_str::<Value>(last.trim()).ok().filter(Value::is_object)
}

#[async_trait]
impl Handler for ExtractTaxDocumentsTool {
    fn name(&self) -> &'static str {
        "extract_tax_documents"
    }

    fn description(&self) -> &'static str {
        "Run OCR extraction over pending tax documents and report how many need review."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "dry_run": {"type": "boolean", "description": "Scan without writing results"},
                "tax_year": {"type": "integer", "description": "Only process documents for this tax year"},
                "limit": {"type": "integer", "description": "Maximum documents to process"}
            },
            "additionalProperties": false
        })
    }

    async fn execute(&self, params: &Value) -> Result<Value, HandlerError> {
        let params: ExtractParams = parse_params(params)?;
        params.validate()?;

        let repo = &self.config.paths.notion_rules;
        let script = repo.join(&self.config.ocr.script);
        if !script.is_file() {
            return Err(HandlerError::NotInstalled(format!(
                "OCR pipeline not found at {}",
                script.display()
            )));
        }

        let mut args = vec![script.to_string_lossy().into_owned()];
        args.extend(params.to_args());

        let output = run_command(&self.config.python, &args, Some(repo), self.config.timeouts.ocr_ms)
            .await?
            .check()?;

        let report = parse_report(&output.stdout);
        let processed = report.as_ref().and_then(|r| r.get("processed")).cloned();
        let needs_review = needs_review_count(&repo.join(&self.config.ocr.checkpoint)).unwrap_or(0);

        Ok(json!({
            "success": true,
            "dry_run": params.dry_run,
            "processed": processed,
            "needs_review": needs_review,
            "report": report,
            "output": output.stdout_tail(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_report_last_line() {
        let stdout = "Processing 3 files\nOCR done\n{\"processed\": 3, \"failed\": 0}\n\n";
        let report = parse_report(stdout).unwrap();
        assert_eq!(report["processed"], 3);
    }

    #[test]
    fn test_parse_report_absent() {
        assert!(parse_report("no json here").is_none());
        assert!(parse_report("").is_none());
        assert!(parse_report("[1, 2]").is_none());
    }

    #[test]
    fn test_params_to_args() {
        let params = ExtractParams {
            dry_run: true,
            tax_year: Some(2024),
            limit: Some(5),
        };
        assert_eq!(params.to_args(), vec!["--dry-run", "--year", "2024", "--limit", "5"]);
        assert!(ExtractParams::default().to_args().is_empty());
    }

    #[test]
    fn test_params_validation() {
        let bad_year = ExtractParams {
            tax_year: Some(1850),
            ..Default::default()
        };
        assert!(bad_year.validate().is_err());

        let zero_limit = ExtractParams {
            limit: Some(0),
            ..Default::default()
        };
        assert!(zero_limit.validate().is_err());

        assert!(ExtractParams::default().validate().is_ok());
    }

    #[cfg(unix)]
    mod pipeline {
        use super::*;
        use crate::handlers::test_support::fake_python;
        use std::fs;
        use tempfile::TempDir;

        fn config_in(dir: &std::path::Path, python: String) -> Arc<Config> {
            let mut config = Config::default();
            config.python = python;
            config.paths.notion_rules = dir.join("notion-rules");
            let script = config.paths.notion_rules.join(&config.ocr.script);
            fs::create_dir_all(script.parent().unwrap()).unwrap();
            fs::write(&script, "").unwrap();
            Arc::new(config)
        }

        #[tokio::test]
        async fn test_extract_reports_processed_and_review() {
            let temp = TempDir::new().unwrap();
            let python = fake_python(temp.path(), r#"echo "scanning"; echo '{"processed": 4}'"#);
            let config = config_in(temp.path(), python);
            let checkpoint = config.paths.notion_rules.join(&config.ocr.checkpoint);
            fs::create_dir_all(checkpoint.parent().unwrap()).unwrap();
            fs::write(&checkpoint, r#"{"results": [{"needs_review": true}, {"needs_review": false}]}"#).unwrap();

            let result = ExtractTaxDocumentsTool::new(config)
                .execute(&json!({"tax_year": 2024}))
                .await
                .unwrap();

            assert_eq!(result["processed"], 4);
            assert_eq!(result["needs_review"], 1);
            assert_eq!(result["report"]["processed"], 4);
        }

        #[tokio::test]
        async fn test_extract_pipeline_crash() {
            let temp = TempDir::new().unwrap();
            let python = fake_python(temp.path(), r#"echo "Traceback: tesseract not found" >&2; exit 1"#);
            let config = config_in(temp.path(), python);

            let err = ExtractTaxDocumentsTool::new(config).execute(&json!({})).await.unwrap_err();
            assert!(err.to_string().contains("tesseract not found"));
        }

        #[tokio::test]
        async fn test_extract_not_installed() {
            let temp = TempDir::new().unwrap();
            let mut config = Config::default();
            config.paths.notion_rules = temp.path().join("absent");

            let err = ExtractTaxDocumentsTool::new(Arc::new(config))
                .execute(&json!({}))
                .await
                .unwrap_err();
            assert!(matches!(err, HandlerError::NotInstalled(_)));
        }
    }
}
