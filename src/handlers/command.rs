//! Subprocess execution for wrapped automations

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::process::Command;

use crate::error::HandlerError;

/// How much of a collaborator's stdout is kept in results.
pub const OUTPUT_TAIL_CHARS: usize = 2000;

/// Captured result of a finished subprocess
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Program and arguments joined for display
    pub command: String,
    pub code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Turn a non-zero exit into `HandlerError::CommandFailed`.
    pub fn check(self) -> Result<Self, HandlerError> {
        if self.success {
            Ok(self)
        } else {
            let stderr = self.failure_detail();
            Err(HandlerError::CommandFailed {
                command: self.command,
                code: self.code,
                stderr,
            })
        }
    }

    /// Last `OUTPUT_TAIL_CHARS` of stdout, `None` when empty.
    pub fn stdout_tail(&self) -> Option<String> {
        if self.stdout.trim().is_empty() {
            None
        } else {
            Some(tail_chars(&self.stdout, OUTPUT_TAIL_CHARS).to_string())
        }
    }

    /// stderr, or the stdout tail when the collaborator only wrote to stdout.
    fn failure_detail(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout_tail().unwrap_or_default()
        } else {
            tail_chars(stderr, OUTPUT_TAIL_CHARS).to_string()
        }
    }

    /// Summary used inside handler results
    pub fn summary(&self) -> Value {
        json!({
            "success": self.success,
            "output": self.stdout_tail(),
            "error": if self.success { None } else { Some(self.failure_detail()) },
        })
    }
}

/// Run `program args...` in `cwd`, killing it after `timeout_ms`.
pub async fn run_command(
    program: &str,
    args: &[String],
    cwd: Option<&Path>,
    timeout_ms: u64,
) -> Result<CommandOutput, HandlerError> {
    let display = std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ");

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    log::debug!("Running `{}` (timeout {}ms)", display, timeout_ms);

    let child = cmd.spawn().map_err(|source| HandlerError::Spawn {
        command: display.clone(),
        source,
    })?;

    let output = tokio::time::timeout(Duration::from_millis(timeout_ms), child.wait_with_output())
        .await
        .map_err(|_| HandlerError::Timeout {
            command: display.clone(),
            timeout_ms,
        })??;

    Ok(CommandOutput {
        command: display,
        code: output.status.code(),
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Last `max_chars` characters of `text`.
pub fn tail_chars(text: &str, max_chars: usize) -> &str {
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }
    match text.char_indices().nth(total - max_chars) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}
