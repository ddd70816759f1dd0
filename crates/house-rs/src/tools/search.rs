//! Search tools: Grep (content) and Glob (names).
//!
//! Both walk the filesystem on the blocking pool. Results are capped at
//! [`MAX_RESULTS`] entries with a trailer saying how many were left out.
//! Paths in the output are relative to the working directory when they are
//! inside it.

use crate::ToolDef;
use crate::error::ToolError;
use crate::tools::core::{Tool, ToolFuture, ToolOutput, parse_tool_args};
use crate::tools::files::resolve_path;
use crate::tools::names;
use crate::tools::spec::ToolSpec;
use regex::RegexBuilder;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// Maximum number of lines either tool returns.
pub const MAX_RESULTS: usize = 100;

fn display_path(workdir: &Path, path: &Path) -> String {
    path.strip_prefix(workdir)
        .unwrap_or(path)
        .display()
        .to_string()
}

/// Join results, keeping at most [`MAX_RESULTS`] and noting the rest.
fn cap_results(mut results: Vec<String>, noun: &str) -> String {
    let total = results.len();
    if total <= MAX_RESULTS {
        return results.join("\n");
    }
    results.truncate(MAX_RESULTS);
    format!(
        "{}\n\n[... {} more {noun} not shown ...]",
        results.join("\n"),
        total - MAX_RESULTS
    )
}

fn check_pattern_path(pattern: &str) -> Result<(), ToolError> {
    if Path::new(pattern)
        .components()
        .any(|c| c == std::path::Component::ParentDir)
    {
        return Err(ToolError::execution(format!(
            "path traversal ('..') is not allowed: {pattern}"
        )));
    }
    Ok(())
}

async fn blocking<T: Send + 'static>(
    f: impl FnOnce() -> Result<T, ToolError> + Send + 'static,
) -> Result<T, ToolError> {
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ToolError::execution(format!("search task failed: {e}")))?
}

// ── Grep ───────────────────────────────────────────────────────────

/// What Grep reports for each match.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Paths of files that contain a match.
    #[default]
    FilesWithMatches,
    /// Matching lines as `path:line:text`.
    Content,
    /// Match count per file as `path: n`.
    Count,
}

/// Typed arguments for `Grep`.
#[derive(Deserialize, JsonSchema)]
pub struct GrepArgs {
    /// Regular expression to search for.
    pub pattern: String,
    /// File or directory to search in (default: the working directory).
    #[serde(default)]
    pub path: Option<String>,
    /// Only search files matching this glob, e.g. '*.rs' or 'src/**/*.ts'.
    #[serde(default)]
    pub glob: Option<String>,
    /// files_with_matches (default), content, or count.
    #[serde(default)]
    pub output_mode: OutputMode,
    /// Case-insensitive search.
    #[serde(default, rename = "-i", alias = "i")]
    pub case_insensitive: bool,
}

/// Regex search over file contents.
pub struct GrepTool {
    workdir: PathBuf,
}

impl GrepTool {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

/// Files under `root` to search, sorted by path. Hidden directories are
/// skipped below the root.
fn candidate_files(root: &Path, glob: Option<&glob::Pattern>) -> Vec<PathBuf> {
    if root.is_file() {
        return vec![root.to_path_buf()];
    }
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !(e.file_type().is_dir() && e.file_name().to_string_lossy().starts_with('.'))
        })
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            glob.is_none_or(|g| {
                let rel = e.path().strip_prefix(root).unwrap_or(e.path());
                if g.as_str().contains('/') {
                    g.matches_path(rel)
                } else {
                    g.matches(&e.file_name().to_string_lossy())
                }
            })
        })
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

impl Tool for GrepTool {
    fn definition(&self) -> ToolDef {
        ToolSpec::builder(names::GREP)
            .purpose("Search file contents with a regular expression")
            .when_to_use("To find which files mention a symbol, string or pattern")
            .when_not_to_use(
                "To find files by name (use Glob) or to read a file you already know (use Read)",
            )
            .parameters_for::<GrepArgs>()
            .example(
                "Grep(pattern='fn main', glob='*.rs')",
                "paths of Rust files defining main",
            )
            .example(
                "Grep(pattern='TODO', output_mode='content', -i=true)",
                "matching lines with file and line number",
            )
            .output_format("One result per line, at most 100")
            .to_tool_def()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let arguments = arguments.to_string();
        let workdir = self.workdir.clone();
        Box::pin(async move {
            let args: GrepArgs = parse_tool_args(names::GREP, &arguments)?;
            let regex = RegexBuilder::new(&args.pattern)
                .case_insensitive(args.case_insensitive)
                .build()
                .map_err(|e| ToolError::execution(format!("Invalid regex pattern: {e}")))?;
            let glob = args
                .glob
                .as_deref()
                .map(glob::Pattern::new)
                .transpose()
                .map_err(|e| ToolError::execution(format!("Invalid glob pattern: {e}")))?;
            let shown = args.path.clone().unwrap_or_else(|| ".".into());
            let root = resolve_path(&workdir, &shown)?;

            blocking(move || {
                if !root.exists() {
                    return Err(ToolError::execution(format!("Path not found: {shown}")));
                }
                let mut results = Vec::new();
                for file in candidate_files(&root, glob.as_ref()) {
                    // Binary and unreadable files are skipped.
                    let Ok(content) = std::fs::read_to_string(&file) else {
                        continue;
                    };
                    let name = display_path(&workdir, &file);
                    match args.output_mode {
                        OutputMode::FilesWithMatches => {
                            if regex.is_match(&content) {
                                results.push(name);
                            }
                        }
                        OutputMode::Count => {
                            let n = regex.find_iter(&content).count();
                            if n > 0 {
                                results.push(format!("{name}: {n}"));
                            }
                        }
                        OutputMode::Content => {
                            for (i, line) in content.lines().enumerate() {
                                if regex.is_match(line) {
                                    results.push(format!("{name}:{}:{line}", i + 1));
                                }
                            }
                        }
                    }
                }
                let text = if results.is_empty() {
                    format!("No matches found for pattern: {}", args.pattern)
                } else {
                    cap_results(results, "results")
                };
                Ok(ToolOutput::text(text))
            })
            .await
        })
    }
}

// ── Glob ───────────────────────────────────────────────────────────

/// Typed arguments for `Glob`.
#[derive(Deserialize, JsonSchema)]
pub struct GlobArgs {
    /// Glob pattern, e.g. '**/*.rs' or 'src/*.toml'.
    pub pattern: String,
    /// Directory to search in (default: the working directory).
    #[serde(default)]
    pub path: Option<String>,
}

/// Find files by glob pattern, newest first.
pub struct GlobTool {
    workdir: PathBuf,
}

impl GlobTool {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl Tool for GlobTool {
    fn definition(&self) -> ToolDef {
        ToolSpec::builder(names::GLOB)
            .purpose("Find files by name with a glob pattern")
            .when_to_use("To locate files when you know part of their name or extension")
            .when_not_to_use("To search inside files (use Grep)")
            .parameters_for::<GlobArgs>()
            .example("Glob(pattern='**/*.rs')", "every Rust file, most recently modified first")
            .output_format("One path per line, most recently modified first, at most 100")
            .to_tool_def()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let arguments = arguments.to_string();
        let workdir = self.workdir.clone();
        Box::pin(async move {
            let args: GlobArgs = parse_tool_args(names::GLOB, &arguments)?;
            check_pattern_path(&args.pattern)?;
            let shown = args.path.clone().unwrap_or_else(|| ".".into());
            let root = resolve_path(&workdir, &shown)?;

            blocking(move || {
                if !root.exists() {
                    return Err(ToolError::execution(format!("Path not found: {shown}")));
                }
                if !root.is_dir() {
                    return Err(ToolError::execution(format!(
                        "Path is not a directory: {shown}"
                    )));
                }
                let base = glob::Pattern::escape(&root.to_string_lossy());
                let full = format!("{}/{}", base.trim_end_matches('/'), args.pattern);
                let entries = glob::glob(&full)
                    .map_err(|e| ToolError::execution(format!("Invalid glob pattern: {e}")))?;

                let mut files: Vec<(SystemTime, PathBuf)> = entries
                    .filter_map(Result::ok)
                    .filter(|p| p.is_file())
                    .map(|p| {
                        let mtime = std::fs::metadata(&p)
                            .and_then(|m| m.modified())
                            .unwrap_or(SystemTime::UNIX_EPOCH);
                        (mtime, p)
                    })
                    .collect();
                if files.is_empty() {
                    return Ok(ToolOutput::text(format!(
                        "No files found matching pattern: {}",
                        args.pattern
                    )));
                }
                files.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
                let lines = files
                    .iter()
                    .map(|(_, p)| display_path(&workdir, p))
                    .collect();
                Ok(ToolOutput::text(cap_results(lines, "files")))
            })
            .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join("src/main.rs"), "fn main() {\n    run();\n}\n").unwrap();
        fs::write(dir.path().join("src/nested/lib.rs"), "pub fn run() {}\n// TODO: Run faster\n").unwrap();
        fs::write(dir.path().join("README.md"), "run it\n").unwrap();
        fs::write(dir.path().join(".git/config"), "fn main").unwrap();
        dir
    }

    async fn grep(dir: &Path, args: serde_json::Value) -> Result<String, ToolError> {
        GrepTool::new(dir)
            .execute(&args.to_string())
            .await
            .map(|o| o.content)
    }

    #[tokio::test]
    async fn grep_lists_files_by_default_and_skips_hidden_dirs() {
        let dir = tree();
        let out = grep(dir.path(), serde_json::json!({"pattern": "fn main"})).await.unwrap();
        assert_eq!(out, "src/main.rs");
    }

    #[tokio::test]
    async fn grep_content_and_count_modes() {
        let dir = tree();
        let out = grep(
            dir.path(),
            serde_json::json!({"pattern": "run", "output_mode": "content", "glob": "*.rs"}),
        )
        .await
        .unwrap();
        assert_eq!(out, "src/main.rs:2:    run();\nsrc/nested/lib.rs:1:pub fn run() {}");

        let out = grep(
            dir.path(),
            serde_json::json!({"pattern": "run", "output_mode": "count", "-i": true}),
        )
        .await
        .unwrap();
        assert!(out.contains("src/nested/lib.rs: 2"));
        assert!(out.contains("README.md: 1"));
    }

    #[tokio::test]
    async fn grep_reports_no_matches_and_bad_patterns() {
        let dir = tree();
        let out = grep(dir.path(), serde_json::json!({"pattern": "zebra"})).await.unwrap();
        assert_eq!(out, "No matches found for pattern: zebra");

        let err = grep(dir.path(), serde_json::json!({"pattern": "("})).await.unwrap_err();
        assert!(err.to_string().starts_with("Invalid regex pattern"));
        let err = grep(dir.path(), serde_json::json!({"pattern": "x", "path": "missing"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Path not found: missing");
    }

    #[tokio::test]
    async fn grep_caps_results() {
        let dir = tempfile::tempdir().unwrap();
        let body: String = (0..150).map(|i| format!("hit {i}\n")).collect();
        fs::write(dir.path().join("many.txt"), body).unwrap();
        let out = grep(dir.path(), serde_json::json!({"pattern": "hit", "output_mode": "content"}))
            .await
            .unwrap();
        assert_eq!(out.lines().filter(|l| l.starts_with("many.txt:")).count(), 100);
        assert!(out.ends_with("[... 50 more results not shown ...]"));
    }

    #[tokio::test]
    async fn glob_sorts_newest_first() {
        let dir = tree();
        std::thread::sleep(Duration::from_millis(20));
        fs::write(dir.path().join("src/fresh.rs"), "// new").unwrap();

        let tool = GlobTool::new(dir.path());
        let out = tool
            .execute(r#"{"pattern": "**/*.rs"}"#)
            .await
            .unwrap()
            .content;
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "src/fresh.rs");

        let out = tool.execute(r#"{"pattern": "*.py"}"#).await.unwrap().content;
        assert_eq!(out, "No files found matching pattern: *.py");
        assert!(tool.execute(r#"{"pattern": "../*"}"#).await.is_err());
    }
}
