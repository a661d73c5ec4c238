//! Local health probes for the wrapped automations.
//!
//! Nothing here mutates state: probes look at repository directories, file
//! modification times, the OCR checkpoint and `launchctl list`.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value;

use crate::config::Config;

use super::command::run_command;

pub const PDF_EXTENSIONS: &[&str] = &["pdf"];
pub const MEDIA_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "heic", "mov", "mp4", "mp3", "m4a"];

/// Health bucket a status string falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    NeedsAttention,
    NotRunning,
}

impl Health {
    pub fn of(status: &str) -> Self {
        match status {
            "watching" | "connected" | "synced" | "installed" => Self::Healthy,
            "stale" | "loaded" => Self::NeedsAttention,
            _ => Self::NotRunning,
        }
    }
}

/// Probe result for one automation
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SystemStatus {
    pub name: String,
    pub icon: String,
    pub status: String,
    pub details: Vec<String>,
    pub attention: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_pdfs: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_media: Option<usize>,
}

impl SystemStatus {
    fn new(name: &str, icon: &str, status: &str) -> Self {
        Self {
            name: name.to_string(),
            icon: icon.to_string(),
            status: status.to_string(),
            details: Vec::new(),
            attention: Vec::new(),
            last_activity: None,
            pending_pdfs: None,
            pending_media: None,
        }
    }

    fn set_status(&mut self, status: &str) {
        self.status = status.to_string();
    }

    pub fn health(&self) -> Health {
        Health::of(&self.status)
    }

    /// Attention items prefixed with the system's icon and name
    pub fn labelled_attention(&self) -> impl Iterator<Item = String> + '_ {
        self.attention
            .iter()
            .map(move |item| format!("{} {}: {}", self.icon, self.name, item))
    }
}

/// Counts per health bucket
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct StatusSummary {
    pub total_systems: usize,
    pub healthy: usize,
    pub needs_attention: usize,
    pub not_running: usize,
}

impl StatusSummary {
    pub fn from_statuses(statuses: &[SystemStatus]) -> Self {
        let mut summary = Self {
            total_systems: statuses.len(),
            ..Default::default()
        };
        for status in statuses {
            match status.health() {
                Health::Healthy => summary.healthy += 1,
                Health::NeedsAttention => summary.needs_attention += 1,
                Health::NotRunning => summary.not_running += 1,
            }
        }
        summary
    }
}

/// Run every probe in a fixed order.
pub async fn collect(config: &Config) -> Vec<SystemStatus> {
    let now = Local::now();
    vec![
        check_downloads_organizer(config),
        check_tax_organizer(config).await,
        check_monarch_money(config, now),
        check_context_sync(config, now),
        check_notion_rules(config),
    ]
}

pub fn check_downloads_organizer(config: &Config) -> SystemStatus {
    let mut status = SystemStatus::new("Downloads Organizer", "📥", "unknown");
    let repo = &config.paths.downloads_organizer;
    if !repo.exists() {
        status.set_status("not_installed");
        status.details.push("Repository not found".to_string());
        return status;
    }

    status.set_status("installed");
    status.details.push(format!("Location: {}", repo.display()));

    let pdf_count = count_files(&config.paths.downloads_dir, PDF_EXTENSIONS);
    let media_count = count_files(&config.paths.downloads_dir, MEDIA_EXTENSIONS);
    if pdf_count > 0 {
        status.attention.push(format!("{} PDFs pending", pdf_count));
    }
    if media_count > 0 {
        status.attention.push(format!("{} media files pending", media_count));
    }
    status.pending_pdfs = Some(pdf_count);
    status.pending_media = Some(media_count);

    status
}

pub async fn check_tax_organizer(config: &Config) -> SystemStatus {
    let mut status = SystemStatus::new("Tax PDF Organizer (Legacy)", "📁", "unknown");
    let timeout_ms = config.timeouts.probe_ms;

    let (watcher_loaded, watcher_pid) = launchctl_status(&config.launch_agents.tax_watcher, timeout_ms).await;
    let (schedule_loaded, _) = launchctl_status(&config.launch_agents.tax_schedule, timeout_ms).await;

    match (watcher_loaded, watcher_pid) {
        (true, Some(pid)) => {
            status.set_status("watching");
            status.details.push(format!("Watcher running (PID {})", pid));
        }
        (true, None) => {
            status.set_status("loaded");
            status.details.push("Watcher loaded but not running".to_string());
        }
        (false, _) => {
            status.set_status("not_running");
            status.details.push("Watcher not loaded".to_string());
        }
    }
    if schedule_loaded {
        status.details.push("Scheduler loaded".to_string());
    }

    status
}

pub fn check_monarch_money(config: &Config, now: DateTime<Local>) -> SystemStatus {
    let mut status = SystemStatus::new("Monarch Money", "💰", "unknown");
    let session = &config.paths.monarch_session;

    if !session.exists() {
        status.set_status("not_authenticated");
        status.attention.push("Run login_setup.py to authenticate".to_string());
        return status;
    }

    if let Some(mtime) = file_mtime(session) {
        status.last_activity = Some(mtime.to_rfc3339());
        status.details.push(format!("Session: {}", format_time_ago(mtime, now)));

        let threshold = config.thresholds.session_stale_days;
        if (now - mtime).num_days() > threshold {
            status.set_status("stale");
            status
                .attention
                .push(format!("Session may need refresh (>{} days old)", threshold));
        } else {
            status.set_status("connected");
        }
    }

    status
}

pub fn check_context_sync(config: &Config, now: DateTime<Local>) -> SystemStatus {
    let mut status = SystemStatus::new("Context Sync", "🔄", "unknown");
    let repo = &config.paths.context_sync;
    if !repo.exists() {
        status.set_status("not_installed");
        status.details.push("Repository not found".to_string());
        return status;
    }

    let changelog = context_changelog(repo);
    if !changelog.exists() {
        status.set_status("not_configured");
        status.details.push("CHANGELOG.md not found".to_string());
        return status;
    }

    if let Some(mtime) = file_mtime(&changelog) {
        status.last_activity = Some(mtime.to_rfc3339());
        status.details.push(format!("Last sync: {}", format_time_ago(mtime, now)));

        let threshold = config.thresholds.context_stale_hours;
        if (now - mtime).num_hours() > threshold {
            status.set_status("stale");
            status
                .attention
                .push(format!("Sync may be stale (>{} hours)", threshold));
        } else {
            status.set_status("synced");
        }
    }

    status
}

pub fn check_notion_rules(config: &Config) -> SystemStatus {
    let mut status = SystemStatus::new("Notion Rules (Tax OCR)", "📄", "idle");
    let repo = &config.paths.notion_rules;
    if !repo.exists() {
        status.set_status("not_installed");
        status.details.push("Repository not found".to_string());
        return status;
    }

    let checkpoint = repo.join(&config.ocr.checkpoint);
    if checkpoint.exists() {
        if let Some(mtime) = file_mtime(&checkpoint) {
            status.last_activity = Some(mtime.to_rfc3339());
            status
                .details
                .push(format!("Last run: {}", format_time_ago(mtime, Local::now())));
        }
        if let Some(count) = needs_review_count(&checkpoint)
            && count > 0
        {
            status.attention.push(format!("{} documents need review", count));
        }
    }

    status
}

/// Where the context-sync repository records its last sync
pub fn context_changelog(repo: &Path) -> PathBuf {
    repo.join("docs/context/CHANGELOG.md")
}

/// Count files in `dir` whose extension is in `extensions`, either case.
pub fn count_files(dir: &Path, extensions: &[&str]) -> usize {
    let base = glob::Pattern::escape(&dir.to_string_lossy());
    let mut seen = HashSet::new();

    for ext in extensions {
        for variant in [ext.to_lowercase(), ext.to_uppercase()] {
            let pattern = format!("{}/*.{}", base, variant);
            let Ok(paths) = glob::glob(&pattern) else {
                continue;
            };
            for path in paths.flatten() {
                if path.is_file() {
                    seen.insert(path);
                }
            }
        }
    }

    seen.len()
}

pub fn file_mtime(path: &Path) -> Option<DateTime<Local>> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    Some(DateTime::<Local>::from(modified))
}

/// Render an elapsed time as "just now", "5 minutes ago", "1 day ago".
pub fn format_time_ago(then: DateTime<Local>, now: DateTime<Local>) -> String {
    let secs = (now - then).num_seconds();
    let plural = |n: i64| if n == 1 { "" } else { "s" };

    if secs < 60 {
        "just now".to_string()
    } else if secs < 3600 {
        let mins = secs / 60;
        format!("{} minute{} ago", mins, plural(mins))
    } else if secs < 86_400 {
        let hours = secs / 3600;
        format!("{} hour{} ago", hours, plural(hours))
    } else {
        let days = secs / 86_400;
        format!("{} day{} ago", days, plural(days))
    }
}

/// Number of OCR results flagged `needs_review` in a checkpoint file.
pub fn needs_review_count(checkpoint: &Path) -> Option<usize> {
    let content = fs::read_to_string(checkpoint).ok()?;
    let data: Value = serde_json::from_str(&content).ok()?;
    let results = data.get("results")?.as_array()?;
    Some(
        results
            .iter()
            .filter(|r| r.get("needs_review").and_then(Value::as_bool).unwrap_or(false))
            .count(),
    )
}

/// Whether a LaunchAgent is loaded, and its PID when running.
///
/// Any failure to run `launchctl` (non-macOS hosts included) reads as not loaded.
pub async fn launchctl_status(label: &str, timeout_ms: u64) -> (bool, Option<u32>) {
    match run_command("launchctl", &["list".to_string()], None, timeout_ms).await {
        Ok(output) => parse_launchctl_list(&output.stdout, label),
        Err(e) => {
            log::debug!("launchctl probe for {} failed: {}", label, e);
            (false, None)
        }
    }
}

/// Parse `launchctl list` output: `PID<tab>Status<tab>Label` per line.
pub fn parse_launchctl_list(output: &str, label: &str) -> (bool, Option<u32>) {
    for line in output.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() >= 3 && parts[2] == label {
            return (true, parts[0].parse().ok());
        }
    }
    (false, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn config_in(dir: &Path) -> Config {
        let mut config = Config::default();
        config.paths.downloads_dir = dir.join("Downloads");
        config.paths.downloads_organizer = dir.join("downloads-organizer");
        config.paths.context_sync = dir.join("treehouse-context-sync");
        config.paths.notion_rules = dir.join("notion-rules");
        config.paths.monarch_session = dir.join("mm_session.pickle");
        config
    }

    #[test]
    fn test_health_buckets() {
        assert_eq!(Health::of("watching"), Health::Healthy);
        assert_eq!(Health::of("installed"), Health::Healthy);
        assert_eq!(Health::of("stale"), Health::NeedsAttention);
        assert_eq!(Health::of("loaded"), Health::NeedsAttention);
        assert_eq!(Health::of("idle"), Health::NotRunning);
        assert_eq!(Health::of("not_installed"), Health::NotRunning);
    }

    #[test]
    fn test_summary_counts() {
        let statuses = vec![
            SystemStatus::new("a", "x", "synced"),
            SystemStatus::new("b", "x", "stale"),
            SystemStatus::new("c", "x", "not_installed"),
            SystemStatus::new("d", "x", "connected"),
        ];
        let summary = StatusSummary::from_statuses(&statuses);
        assert_eq!(
            summary,
            StatusSummary {
                total_systems: 4,
                healthy: 2,
                needs_attention: 1,
                not_running: 1,
            }
        );
    }

    #[test]
    fn test_format_time_ago() {
        let now = Local::now();
        assert_eq!(format_time_ago(now - Duration::seconds(10), now), "just now");
        assert_eq!(format_time_ago(now - Duration::minutes(1), now), "1 minute ago");
        assert_eq!(format_time_ago(now - Duration::minutes(5), now), "5 minutes ago");
        assert_eq!(format_time_ago(now - Duration::hours(3), now), "3 hours ago");
        assert_eq!(format_time_ago(now - Duration::days(1), now), "1 day ago");
        assert_eq!(format_time_ago(now - Duration::days(9), now), "9 days ago");
    }

    #[test]
    fn test_parse_launchctl_list() {
        let output = "PID\tStatus\tLabel\n412\t0\tcom.taxorganizer.watcher\n-\t0\tcom.taxorganizer.schedule\n";
        assert_eq!(parse_launchctl_list(output, "com.taxorganizer.watcher"), (true, Some(412)));
        assert_eq!(parse_launchctl_list(output, "com.taxorganizer.schedule"), (true, None));
        assert_eq!(parse_launchctl_list(output, "com.example.other"), (false, None));
    }

    #[test]
    fn test_count_files_dedupes_and_filters() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        fs::write(dir.join("a.pdf"), "").unwrap();
        fs::write(dir.join("b.PDF"), "").unwrap();
        fs::write(dir.join("c.jpg"), "").unwrap();
        fs::write(dir.join("notes.txt"), "").unwrap();
        fs::create_dir(dir.join("folder.pdf")).unwrap();

        assert_eq!(count_files(dir, PDF_EXTENSIONS), 2);
        assert_eq!(count_files(dir, MEDIA_EXTENSIONS), 1);
        assert_eq!(count_files(&dir.join("missing"), PDF_EXTENSIONS), 0);
    }

    #[test]
    fn test_needs_review_count() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("checkpoint.json");
        fs::write(
            &path,
            r#"{"results": [{"needs_review": true}, {"needs_review": false}, {"file": "x.pdf"}, {"needs_review": true}]}"#,
        )
        .unwrap();

        assert_eq!(needs_review_count(&path), Some(2));
        assert_eq!(needs_review_count(&temp.path().join("missing.json")), None);
    }

    #[test]
    fn test_downloads_not_installed() {
        let temp = TempDir::new().unwrap();
        let status = check_downloads_organizer(&config_in(temp.path()));
        assert_eq!(status.status, "not_installed");
        assert_eq!(status.health(), Health::NotRunning);
    }

    #[test]
    fn test_downloads_pending_counts() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());
        fs::create_dir_all(&config.paths.downloads_organizer).unwrap();
        fs::create_dir_all(&config.paths.downloads_dir).unwrap();
        fs::write(config.paths.downloads_dir.join("statement.pdf"), "").unwrap();
        fs::write(config.paths.downloads_dir.join("IMG_0001.HEIC"), "").unwrap();
        fs::write(config.paths.downloads_dir.join("clip.mov"), "").unwrap();

        let status = check_downloads_organizer(&config);
        assert_eq!(status.status, "installed");
        assert_eq!(status.pending_pdfs, Some(1));
        assert_eq!(status.pending_media, Some(2));
        assert_eq!(status.attention, vec!["1 PDFs pending", "2 media files pending"]);
    }

    #[test]
    fn test_monarch_not_authenticated() {
        let temp = TempDir::new().unwrap();
        let status = check_monarch_money(&config_in(temp.path()), Local::now());
        assert_eq!(status.status, "not_authenticated");
        assert_eq!(status.attention.len(), 1);
    }

    #[test]
    fn test_monarch_connected_and_stale() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());
        fs::write(&config.paths.monarch_session, "session").unwrap();

        let fresh = check_monarch_money(&config, Local::now());
        assert_eq!(fresh.status, "connected");
        assert!(fresh.last_activity.is_some());

        let stale = check_monarch_money(&config, Local::now() + Duration::days(30));
        assert_eq!(stale.status, "stale");
        assert_eq!(stale.health(), Health::NeedsAttention);
    }

    #[test]
    fn test_context_sync_states() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());
        assert_eq!(check_context_sync(&config, Local::now()).status, "not_installed");

        fs::create_dir_all(&config.paths.context_sync).unwrap();
        assert_eq!(check_context_sync(&config, Local::now()).status, "not_configured");

        let changelog = context_changelog(&config.paths.context_sync);
        fs::create_dir_all(changelog.parent().unwrap()).unwrap();
        fs::write(&changelog, "# Changelog").unwrap();
        assert_eq!(check_context_sync(&config, Local::now()).status, "synced");
        assert_eq!(
            check_context_sync(&config, Local::now() + Duration::hours(48)).status,
            "stale"
        );
    }

    #[test]
    fn test_notion_rules_needs_review() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());
        let checkpoint = config.paths.notion_rules.join(&config.ocr.checkpoint);
        fs::create_dir_all(checkpoint.parent().unwrap()).unwrap();
        fs::write(&checkpoint, r#"{"results": [{"needs_review": true}]}"#).unwrap();

        let status = check_notion_rules(&config);
        assert_eq!(status.status, "idle");
        assert_eq!(status.attention, vec!["1 documents need review"]);
        assert!(status.last_activity.is_some());
    }

    #[test]
    fn test_labelled_attention() {
        let mut status = SystemStatus::new("Context Sync", "🔄", "stale");
        status.attention.push("Sync may be stale".to_string());
        let items: Vec<String> = status.labelled_attention().collect();
        assert_eq!(items, vec!["🔄 Context Sync: Sync may be stale"]);
    }
}
