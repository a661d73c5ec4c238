use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub log_level: Option<String>,
    pub ledger: LedgerConfig,
    /// Interpreter used to launch the wrapped Python automations
    pub python: String,
    pub paths: PathsConfig,
    pub launch_agents: LaunchAgentsConfig,
    pub timeouts: TimeoutsConfig,
    pub thresholds: ThresholdsConfig,
    pub ocr: OcrConfig,
    pub monarch: MonarchConfig,
    pub financial: FinancialConfig,
}

/// What to do when the ledger write after a handler call fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteFailurePolicy {
    /// Return the handler's result anyway, flagged with `ledger_error`
    #[default]
    Degrade,
    /// Fail the whole dispatch with a storage error
    Strict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LedgerConfig {
    pub db_path: PathBuf,
    pub on_write_failure: WriteFailurePolicy,

    /// Cap on stored result text; unset keeps results whole
    pub max_result_chars: Option<usize>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            db_path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(env!("CARGO_PKG_NAME"))
                .join("history.db"),
            on_write_failure: WriteFailurePolicy::Degrade,
            max_result_chars: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PathsConfig {
    pub downloads_dir: PathBuf,
    pub downloads_organizer: PathBuf,
    pub monarch_mcp: PathBuf,
    pub context_sync: PathBuf,
    pub notion_rules: PathBuf,
    pub monarch_session: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home = home_dir();
        let documents = home.join("Documents");
        Self {
            downloads_dir: home.join("Downloads"),
            downloads_organizer: documents.join("downloads-organizer"),
            monarch_mcp: documents.join("monarch-mcp-server"),
            context_sync: documents.join("treehouse-context-sync"),
            notion_rules: documents.join("notion-rules"),
            monarch_session: home.join("Library/Application Support/monarch-mcp-server/mm_session.pickle"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LaunchAgentsConfig {
    pub tax_schedule: String,
    pub tax_watcher: String,
}

impl Default for LaunchAgentsConfig {
    fn default() -> Self {
        Self {
            tax_schedule: "com.taxorganizer.schedule".to_string(),
            tax_watcher: "com.taxorganizer.watcher".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TimeoutsConfig {
    pub pdf_ms: u64,
    pub media_ms: u64,
    pub context_sync_ms: u64,
    pub ocr_ms: u64,
    pub monarch_sync_ms: u64,
    pub probe_ms: u64,
    pub http_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            pdf_ms: 300_000,
            media_ms: 600_000,
            context_sync_ms: 300_000,
            ocr_ms: 1_800_000,
            monarch_sync_ms: 300_000,
            probe_ms: 5_000,
            http_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ThresholdsConfig {
    pub session_stale_days: i64,
    pub context_stale_hours: i64,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            session_stale_days: 7,
            context_stale_hours: 36,
        }
    }
}

/// OCR pipeline location, relative to the notion-rules repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OcrConfig {
    pub script: PathBuf,
    pub checkpoint: PathBuf,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            script: PathBuf::from("tax-years/scripts/process_documents.py"),
            checkpoint: PathBuf::from("tax-years/data/processing_checkpoint.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MonarchConfig {
    /// Transaction sync script, relative to the monarch repository
    pub sync_script: PathBuf,
}

impl Default for MonarchConfig {
    fn default() -> Self {
        Self {
            sync_script: PathBuf::from("monarch_sync.py"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FinancialConfig {
    /// Base URL of the financial-data service, e.g. `http://127.0.0.1:8765`
    pub service_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            ledger: LedgerConfig::default(),
            python: "python3".to_string(),
            paths: PathsConfig::default(),
            launch_agents: LaunchAgentsConfig::default(),
            timeouts: TimeoutsConfig::default(),
            thresholds: ThresholdsConfig::default(),
            ocr: OcrConfig::default(),
            monarch: MonarchConfig::default(),
            financial: FinancialConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config = Self::from_yaml(&content)?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Parse, expand `~` in paths and validate.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let mut config: Self = serde_yaml::from_str(content).context("Failed to parse config file")?;
        config.expand_paths();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ledger.max_result_chars == Some(0) {
            eyre::bail!("ledger.max-result-chars must be > 0");
        }
        if self.python.trim().is_empty() {
            eyre::bail!("python cannot be empty");
        }
        let t = &self.timeouts;
        for (name, value) in [
            ("pdf-ms", t.pdf_ms),
            ("media-ms", t.media_ms),
            ("context-sync-ms", t.context_sync_ms),
            ("ocr-ms", t.ocr_ms),
            ("monarch-sync-ms", t.monarch_sync_ms),
            ("probe-ms", t.probe_ms),
            ("http-ms", t.http_ms),
        ] {
            if value == 0 {
                eyre::bail!("timeouts.{} must be > 0", name);
            }
        }
        Ok(())
    }

    fn expand_paths(&mut self) {
        let p = &mut self.paths;
        for path in [
            &mut self.ledger.db_path,
            &mut p.downloads_dir,
            &mut p.downloads_organizer,
            &mut p.monarch_mcp,
            &mut p.context_sync,
            &mut p.notion_rules,
            &mut p.monarch_session,
        ] {
            *path = expand_home(path);
        }
    }
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Replace a leading `~` with the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home_dir().join(rest),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ledger.on_write_failure, WriteFailurePolicy::Degrade);
        assert_eq!(config.ledger.max_result_chars, None);
        assert_eq!(config.timeouts.pdf_ms, 300_000);
        assert_eq!(config.timeouts.media_ms, 600_000);
        assert_eq!(config.thresholds.session_stale_days, 7);
        assert!(config.ledger.db_path.ends_with("history.db"));
        assert!(config.financial.service_url.is_none());
    }

    #[test]
    fn test_config_validation() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_timeout() {
        let config = Config {
            timeouts: TimeoutsConfig {
                ocr_ms: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ocr-ms"));
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
ledger:
  db-path: /tmp/ecoshim/history.db
  on-write-failure: strict
python: /usr/local/bin/python3.12
timeouts:
  ocr-ms: 60000
financial:
  service-url: http://127.0.0.1:8765
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.ledger.db_path, PathBuf::from("/tmp/ecoshim/history.db"));
        assert_eq!(config.ledger.on_write_failure, WriteFailurePolicy::Strict);
        assert_eq!(config.python, "/usr/local/bin/python3.12");
        assert_eq!(config.timeouts.ocr_ms, 60000);
        assert_eq!(config.financial.service_url.as_deref(), Some("http://127.0.0.1:8765"));
        // Other fields should have defaults
        assert_eq!(config.timeouts.pdf_ms, 300_000);
        assert_eq!(config.launch_agents.tax_watcher, "com.taxorganizer.watcher");
    }

    #[test]
    fn test_parse_yaml_rejects_zero_result_cap() {
        let yaml = "ledger:\n  max-result-chars: 0\n";
        assert!(Config::from_yaml(yaml).is_err());

        let config = Config::from_yaml("ledger:\n  max-result-chars: 4000\n").unwrap();
        assert_eq!(config.ledger.max_result_chars, Some(4000));
    }

    #[test]
    fn test_expand_home() {
        let expanded = expand_home(Path::new("~/Documents/notion-rules"));
        assert!(!expanded.starts_with("~"));
        assert!(expanded.ends_with("Documents/notion-rules"));

        assert_eq!(expand_home(Path::new("/opt/tools")), PathBuf::from("/opt/tools"));
    }

    #[test]
    fn test_load_explicit_path() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("ecoshim.yml");
        fs::write(&path, "log-level: debug\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let path = PathBuf::from("/nonexistent/ecoshim.yml");
        assert!(Config::load(Some(&path)).is_err());
    }
}
