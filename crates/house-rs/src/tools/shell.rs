//! The Bash tool.
//!
//! Runs `sh -c` in the working directory. stdout comes first, stderr follows
//! under a `[stderr]` marker, and a nonzero exit becomes
//! [`ToolError::CommandFailed`] with the exit code appended.

use crate::ToolDef;
use crate::error::ToolError;
use crate::tools::core::{Tool, ToolFuture, ToolOutput, parse_tool_args};
use crate::tools::names;
use crate::tools::spec::ToolSpec;
use schemars::JsonSchema;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Timeout when the call does not give one, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 120_000;
/// Upper bound on the `timeout` argument, in milliseconds.
pub const MAX_TIMEOUT_MS: u64 = 600_000;
/// Commands containing any of these (lowercased) are refused.
pub const DEFAULT_BLOCKED_COMMANDS: &[&str] = &["rm -rf /", "mkfs", "> /dev/sd"];

/// Slack on top of the command's own timeout, so the tool reports the
/// timeout itself instead of the set-wide limit cutting it off.
const TIMEOUT_GRACE: Duration = Duration::from_secs(5);

/// Typed arguments for `Bash`.
#[derive(Deserialize, JsonSchema)]
pub struct BashArgs {
    /// The shell command to run.
    pub command: String,
    /// Timeout in milliseconds (default 120000, max 600000).
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Short description of what the command does.
    #[serde(default)]
    pub description: Option<String>,
}

impl BashArgs {
    fn timeout(&self) -> Duration {
        Duration::from_millis(
            self.timeout
                .unwrap_or(DEFAULT_TIMEOUT_MS)
                .clamp(1, MAX_TIMEOUT_MS),
        )
    }
}

/// Execute shell commands in the working directory.
pub struct BashTool {
    workdir: PathBuf,
    blocked_commands: Vec<String>,
}

impl BashTool {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            blocked_commands: DEFAULT_BLOCKED_COMMANDS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }

    /// Add a blocked command pattern (lowercased substring match).
    pub fn block_command(mut self, pattern: impl Into<String>) -> Self {
        self.blocked_commands.push(pattern.into().to_lowercase());
        self
    }
}

/// Combine stdout and stderr the way the model sees them.
fn render_output(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);
    let mut parts = Vec::new();
    if !stdout.trim_end().is_empty() {
        parts.push(stdout.trim_end().to_string());
    }
    if !stderr.trim_end().is_empty() {
        parts.push(format!("[stderr]\n{}", stderr.trim_end()));
    }
    if parts.is_empty() {
        "[No output]".to_string()
    } else {
        parts.join("\n")
    }
}

impl Tool for BashTool {
    fn definition(&self) -> ToolDef {
        ToolSpec::builder(names::BASH)
            .purpose("Run a shell command in the working directory and return its output")
            .when_to_use(
                "For builds, tests, git, and anything the file and search tools do not cover",
            )
            .when_not_to_use(
                "To read files (use Read), search contents (use Grep), find files by name \
                 (use Glob) or change files (use Edit or Write)",
            )
            .parameters_for::<BashArgs>()
            .example("Bash(command='cargo test -p parser')", "test output")
            .example(
                "Bash(command='git status --short', timeout=10000)",
                "changed files, fails after 10s",
            )
            .output_format(
                "stdout, then '[stderr]' and stderr if any. A nonzero exit is an error that \
                 ends with '[exit code: N]'. '[No output]' when both streams are empty.",
            )
            .to_tool_def()
    }

    fn timeout(&self, arguments: &str) -> Option<Duration> {
        let args: BashArgs = serde_json::from_str(arguments).ok()?;
        Some(args.timeout() + TIMEOUT_GRACE)
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let arguments = arguments.to_string();
        Box::pin(async move {
            let args: BashArgs = parse_tool_args(names::BASH, &arguments)?;
            let lower = args.command.to_lowercase();
            if self.blocked_commands.iter().any(|pat| lower.contains(pat)) {
                return Err(ToolError::execution(
                    "potentially destructive command blocked",
                ));
            }

            let limit = args.timeout();
            let child = Command::new("sh")
                .arg("-c")
                .arg(&args.command)
                .current_dir(&self.workdir)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| ToolError::execution(format!("Error running command: {e}")))?;

            let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(result) => {
                    result.map_err(|e| ToolError::execution(format!("Error running command: {e}")))?
                }
                Err(_) => {
                    return Err(ToolError::TimedOut {
                        tool: names::BASH.to_string(),
                        secs: limit.as_secs(),
                    });
                }
            };

            let text = render_output(&output.stdout, &output.stderr);
            if output.status.success() {
                return Ok(ToolOutput::text(text));
            }
            let (status, trailer) = match output.status.code() {
                Some(code) => (format!("exit code {code}"), format!("[exit code: {code}]")),
                None => ("killed by signal".to_string(), "[killed by signal]".to_string()),
            };
            Err(ToolError::CommandFailed {
                status,
                output: format!("{text}\n{trailer}"),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(command: &str) -> String {
        serde_json::json!({ "command": command }).to_string()
    }

    #[tokio::test]
    async fn stdout_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let tool = BashTool::new(dir.path());
        let out = tool.execute(&run_args("echo hello")).await.unwrap();
        assert_eq!(out.content, "hello");
        assert!(out.effect.is_none());
    }

    #[tokio::test]
    async fn runs_in_the_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let tool = BashTool::new(dir.path());
        let out = tool.execute(&run_args("ls")).await.unwrap();
        assert!(out.content.contains("marker.txt"));
    }

    #[tokio::test]
    async fn stderr_follows_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let tool = BashTool::new(dir.path());
        let out = tool
            .execute(&run_args("echo out; echo err >&2"))
            .await
            .unwrap();
        assert_eq!(out.content, "out\n[stderr]\nerr");
    }

    #[tokio::test]
    async fn empty_output_is_marked() {
        let dir = tempfile::tempdir().unwrap();
        let tool = BashTool::new(dir.path());
        let out = tool.execute(&run_args("true")).await.unwrap();
        assert_eq!(out.content, "[No output]");
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_command_failure() {
        let dir = tempfile::tempdir().unwrap();
        let tool = BashTool::new(dir.path());
        let err = tool
            .execute(&run_args("echo partial; exit 3"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ToolError::CommandFailed {
                status: "exit code 3".into(),
                output: "partial\n[exit code: 3]".into(),
            }
        );
        assert!(err.to_tool_result().starts_with("Error: Command failed (exit code 3)"));
    }

    #[tokio::test]
    async fn slow_commands_time_out() {
        let dir = tempfile::tempdir().unwrap();
        let tool = BashTool::new(dir.path());
        let args = serde_json::json!({ "command": "sleep 5", "timeout": 100 }).to_string();
        let err = tool.execute(&args).await.unwrap_err();
        assert!(matches!(err, ToolError::TimedOut { ref tool, .. } if tool == "Bash"));
    }

    #[tokio::test]
    async fn destructive_commands_are_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let tool = BashTool::new(dir.path()).block_command("shutdown");
        for cmd in ["rm -rf / --no-preserve-root", "sudo SHUTDOWN now"] {
            let err = tool.execute(&run_args(cmd)).await.unwrap_err();
            assert!(err.to_string().contains("blocked"), "{cmd}");
        }
    }

    #[test]
    fn timeout_hint_is_clamped_and_padded() {
        let tool = BashTool::new("/tmp");
        assert_eq!(
            tool.timeout(r#"{"command":"ls"}"#),
            Some(Duration::from_millis(DEFAULT_TIMEOUT_MS) + TIMEOUT_GRACE)
        );
        assert_eq!(
            tool.timeout(r#"{"command":"ls","timeout":99999999}"#),
            Some(Duration::from_millis(MAX_TIMEOUT_MS) + TIMEOUT_GRACE)
        );
        assert_eq!(tool.timeout("not json"), None);
    }
}
