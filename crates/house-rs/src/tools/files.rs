//! File tools: Read, Write and Edit.
//!
//! Paths are resolved against the tool's working directory (absolute paths
//! are taken as given) and `..` components are rejected. Every successful
//! call reports the SHA-256 of the file's full content as a
//! [`ContextEffect`], which keeps the session file cache current. Edit
//! declares a [`Precondition::FreshRead`] so the orchestrator refuses to run
//! it against a file the session has not seen in its current state.

use crate::context::content_hash;
use crate::error::ToolError;
use crate::tools::core::{ContextEffect, Precondition, Tool, ToolFuture, ToolOutput, parse_tool_args};
use crate::tools::names;
use crate::tools::spec::ToolSpec;
use crate::{ToolDef, preview};
use schemars::JsonSchema;
use serde::Deserialize;
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// Lines returned by Read when no limit is given.
pub const DEFAULT_READ_LIMIT: usize = 2000;
/// Longer lines are cut and marked with `...`.
pub const MAX_LINE_CHARS: usize = 2000;

/// Resolve `raw` against `workdir`, rejecting `..` traversal.
pub fn resolve_path(workdir: &Path, raw: &str) -> Result<PathBuf, ToolError> {
    let path = Path::new(raw.trim());
    if path.as_os_str().is_empty() {
        return Err(ToolError::execution("file_path must not be empty"));
    }
    if path.components().any(|c| c == Component::ParentDir) {
        return Err(ToolError::execution(format!(
            "path traversal ('..') is not allowed: {raw}"
        )));
    }
    let mut resolved = if path.is_absolute() {
        PathBuf::new()
    } else {
        workdir.to_path_buf()
    };
    for component in path.components() {
        if component != Component::CurDir {
            resolved.push(component);
        }
    }
    Ok(resolved)
}

fn file_path_argument(arguments: &str) -> Option<String> {
    let args: serde_json::Value = serde_json::from_str(arguments).ok()?;
    args.get("file_path")?.as_str().map(str::to_string)
}

async fn read_existing(path: &Path, shown: &str) -> Result<Vec<u8>, ToolError> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => {
            return Err(ToolError::execution(format!(
                "Path is not a file: {shown} is a directory. Use Glob or Bash to list directories."
            )));
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ToolError::execution(format!("File not found: {shown}")));
        }
        _ => {}
    }
    fs::read(path)
        .await
        .map_err(|e| ToolError::execution(format!("Error reading {shown}: {e}")))
}

fn decode(bytes: Vec<u8>, shown: &str) -> Result<String, ToolError> {
    String::from_utf8(bytes).map_err(|_| {
        ToolError::execution(format!("File is binary or not UTF-8 encoded: {shown}"))
    })
}

// ── Read ───────────────────────────────────────────────────────────

/// Typed arguments for `Read`.
#[derive(Deserialize, JsonSchema)]
pub struct ReadArgs {
    /// Path of the file to read, absolute or relative to the working directory.
    pub file_path: String,
    /// 1-based line number to start reading from.
    #[serde(default)]
    pub offset: Option<usize>,
    /// Number of lines to read.
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Read a file with line numbers.
pub struct ReadTool {
    workdir: PathBuf,
}

impl ReadTool {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

/// Render `content` like `cat -n`: right-aligned line numbers, an arrow,
/// then the line. Returns the text and how many lines follow the window.
pub fn number_lines(content: &str, offset: Option<usize>, limit: Option<usize>) -> (String, usize) {
    let lines: Vec<&str> = content.lines().collect();
    let start = offset.unwrap_or(1).saturating_sub(1);
    let end = start
        .saturating_add(limit.unwrap_or(DEFAULT_READ_LIMIT))
        .min(lines.len());

    let mut out = String::new();
    for (i, line) in lines.iter().enumerate().take(end).skip(start) {
        if !out.is_empty() {
            out.push('\n');
        }
        let _ = write!(out, "{:>6}\u{2192}{}", i + 1, preview(line, MAX_LINE_CHARS));
    }
    (out, lines.len().saturating_sub(end.max(start)))
}

impl Tool for ReadTool {
    fn definition(&self) -> ToolDef {
        ToolSpec::builder(names::READ)
            .purpose("Read a file from the local filesystem")
            .when_to_use(
                "Before editing any file, and whenever you need the exact current content of a \
                 file whose path you know",
            )
            .when_not_to_use(
                "To find which files mention something (use Grep) or to find files by name \
                 (use Glob)",
            )
            .parameters_for::<ReadArgs>()
            .example(
                "Read(file_path='src/main.rs')",
                "first 2000 lines with line numbers",
            )
            .example(
                "Read(file_path='src/main.rs', offset=2001, limit=500)",
                "lines 2001-2500",
            )
            .output_format(
                "Each line as '{number}→{text}'. Lines over 2000 characters are cut. A trailer \
                 reports how many lines were not shown.",
            )
            .to_tool_def()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let arguments = arguments.to_string();
        Box::pin(async move {
            let args: ReadArgs = parse_tool_args(names::READ, &arguments)?;
            let path = resolve_path(&self.workdir, &args.file_path)?;
            let bytes = read_existing(&path, &args.file_path).await?;
            let hash = content_hash(&bytes);
            let content = decode(bytes, &args.file_path)?;

            let (mut text, remaining) = number_lines(&content, args.offset, args.limit);
            if content.is_empty() {
                text = "(empty file)".to_string();
            } else if remaining > 0 {
                let _ = write!(text, "\n\n[... {remaining} more lines not shown ...]");
            }
            Ok(ToolOutput::text(text).with_effect(ContextEffect::FileRead {
                path,
                content_hash: hash,
            }))
        })
    }
}

// ── Write ──────────────────────────────────────────────────────────

/// Typed arguments for `Write`.
#[derive(Deserialize, JsonSchema)]
pub struct WriteArgs {
    /// Path of the file to write, absolute or relative to the working directory.
    pub file_path: String,
    /// The full content to write.
    pub content: String,
}

/// Create or overwrite a file.
pub struct WriteTool {
    workdir: PathBuf,
}

impl WriteTool {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl Tool for WriteTool {
    fn definition(&self) -> ToolDef {
        ToolSpec::builder(names::WRITE)
            .purpose("Write a file, creating parent directories as needed")
            .when_to_use("To create a new file, or to replace a file's content wholesale")
            .when_not_to_use("To change part of an existing file (use Edit)")
            .parameters_for::<WriteArgs>()
            .example(
                "Write(file_path='notes/todo.md', content='# Todo')",
                "creates the file",
            )
            .output_format("'File created successfully at: P' or 'File overwritten successfully at: P'")
            .to_tool_def()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let arguments = arguments.to_string();
        Box::pin(async move {
            let args: WriteArgs = parse_tool_args(names::WRITE, &arguments)?;
            let path = resolve_path(&self.workdir, &args.file_path)?;
            if fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
                return Err(ToolError::execution(format!(
                    "Path is not a file: {} is a directory",
                    args.file_path
                )));
            }
            let existed = fs::try_exists(&path).await.unwrap_or(false);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    ToolError::execution(format!("Error creating {}: {e}", parent.display()))
                })?;
            }
            fs::write(&path, args.content.as_bytes())
                .await
                .map_err(|e| ToolError::execution(format!("Error writing file: {e}")))?;

            let verb = if existed { "overwritten" } else { "created" };
            Ok(
                ToolOutput::text(format!("File {verb} successfully at: {}", args.file_path))
                    .with_effect(ContextEffect::FileWritten {
                        path,
                        content_hash: content_hash(args.content.as_bytes()),
                    }),
            )
        })
    }
}

// ── Edit ───────────────────────────────────────────────────────────

/// Typed arguments for `Edit`.
#[derive(Deserialize, JsonSchema)]
pub struct EditArgs {
    /// Path of the file to modify.
    pub file_path: String,
    /// Exact text to replace. Must match the file byte for byte.
    pub old_string: String,
    /// Replacement text. Must differ from `old_string`.
    pub new_string: String,
    /// Replace every occurrence instead of requiring a unique match.
    #[serde(default)]
    pub replace_all: bool,
}

/// Exact string replacement in a file the session has read.
pub struct EditTool {
    workdir: PathBuf,
}

impl EditTool {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl Tool for EditTool {
    fn definition(&self) -> ToolDef {
        ToolSpec::builder(names::EDIT)
            .purpose("Replace exact text in a file")
            .when_to_use(
                "To change part of a file you have already Read in this session. The file must \
                 not have changed since that Read",
            )
            .when_not_to_use("To create a file or replace all of it (use Write)")
            .parameters_for::<EditArgs>()
            .example(
                "Edit(file_path='src/lib.rs', old_string='fn old()', new_string='fn new()')",
                "replaces the single occurrence",
            )
            .output_format("'Successfully edited P' or 'Successfully replaced N occurrence(s) in P'")
            .to_tool_def()
    }

    fn precondition(&self, arguments: &str) -> Option<Precondition> {
        let raw = file_path_argument(arguments)?;
        resolve_path(&self.workdir, &raw)
            .ok()
            .map(Precondition::FreshRead)
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let arguments = arguments.to_string();
        Box::pin(async move {
            let args: EditArgs = parse_tool_args(names::EDIT, &arguments)?;
            if args.old_string == args.new_string {
                return Err(ToolError::execution(
                    "old_string and new_string are identical; nothing to change",
                ));
            }
            if args.old_string.is_empty() {
                return Err(ToolError::execution("old_string must not be empty"));
            }
            let path = resolve_path(&self.workdir, &args.file_path)?;
            let bytes = read_existing(&path, &args.file_path).await?;
            let content = decode(bytes, &args.file_path)?;

            let count = content.matches(args.old_string.as_str()).count();
            if count == 0 {
                return Err(ToolError::execution(
                    "old_string not found in file. Make sure you Read the file first to get exact text.",
                ));
            }
            if count > 1 && !args.replace_all {
                return Err(ToolError::execution(format!(
                    "old_string appears {count} times in file. Provide more context to make it \
                     unique, or use replace_all=true."
                )));
            }

            let updated = if args.replace_all {
                content.replace(&args.old_string, &args.new_string)
            } else {
                content.replacen(&args.old_string, &args.new_string, 1)
            };
            fs::write(&path, updated.as_bytes())
                .await
                .map_err(|e| ToolError::execution(format!("Error writing file: {e}")))?;

            let text = if args.replace_all {
                format!(
                    "Successfully replaced {count} occurrence(s) in {}",
                    args.file_path
                )
            } else {
                format!("Successfully edited {}", args.file_path)
            };
            Ok(ToolOutput::text(text).with_effect(ContextEffect::FileWritten {
                path,
                content_hash: content_hash(updated.as_bytes()),
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: serde_json::Value) -> String {
        v.to_string()
    }

    #[test]
    fn traversal_is_rejected() {
        let err = resolve_path(Path::new("/w"), "../etc/passwd").unwrap_err();
        assert!(err.to_string().contains("traversal"));
        assert_eq!(
            resolve_path(Path::new("/w"), "src/a.rs").unwrap(),
            PathBuf::from("/w/src/a.rs")
        );
        assert_eq!(
            resolve_path(Path::new("/w"), "/abs/b.rs").unwrap(),
            PathBuf::from("/abs/b.rs")
        );
        assert_eq!(
            resolve_path(Path::new("/w"), "./src/./a.rs").unwrap(),
            PathBuf::from("/w/src/a.rs")
        );
    }

    #[test]
    fn numbering_windows_and_trailer_count() {
        let content = "a\nb\nc\nd\ne";
        let (text, remaining) = number_lines(content, Some(2), Some(2));
        assert_eq!(text, "     2\u{2192}b\n     3\u{2192}c");
        assert_eq!(remaining, 2);

        let (_, remaining) = number_lines(content, None, None);
        assert_eq!(remaining, 0);
    }

    #[test]
    fn long_lines_are_cut() {
        let line = "x".repeat(MAX_LINE_CHARS + 10);
        let (text, _) = number_lines(&line, None, None);
        assert!(text.ends_with("..."));
        assert_eq!(text.chars().count(), 7 + MAX_LINE_CHARS + 3);
    }

    #[tokio::test]
    async fn read_reports_hash_of_full_content() {
        let dir = tempfile::tempdir().unwrap();
        let body: String = (1..=2500).map(|i| format!("line {i}\n")).collect();
        std::fs::write(dir.path().join("big.txt"), &body).unwrap();

        let out = ReadTool::new(dir.path())
            .execute(&args(serde_json::json!({"file_path": "big.txt"})))
            .await
            .unwrap();
        assert!(out.content.starts_with("     1\u{2192}line 1\n"));
        assert!(out.content.ends_with("[... 500 more lines not shown ...]"));
        assert_eq!(
            out.effect,
            Some(ContextEffect::FileRead {
                path: dir.path().join("big.txt"),
                content_hash: content_hash(body.as_bytes()),
            })
        );
    }

    #[tokio::test]
    async fn read_errors_are_descriptive() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadTool::new(dir.path());
        let err = tool
            .execute(&args(serde_json::json!({"file_path": "nope.rs"})))
            .await
            .unwrap_err();
        assert_eq!(err.to_tool_result(), "Error: File not found: nope.rs");

        let err = tool
            .execute(&args(serde_json::json!({"file_path": "."})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("is a directory"));
    }

    #[tokio::test]
    async fn write_reports_created_then_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteTool::new(dir.path());
        let call = args(serde_json::json!({"file_path": "new/dir/a.txt", "content": "hi"}));

        let out = tool.execute(&call).await.unwrap();
        assert_eq!(out.content, "File created successfully at: new/dir/a.txt");
        let out = tool.execute(&call).await.unwrap();
        assert_eq!(out.content, "File overwritten successfully at: new/dir/a.txt");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("new/dir/a.txt")).unwrap(),
            "hi"
        );
        assert!(matches!(out.effect, Some(ContextEffect::FileWritten { .. })));
    }

    #[tokio::test]
    async fn edit_replaces_unique_match() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "x = 1\ny = 2\n").unwrap();
        let tool = EditTool::new(dir.path());

        let out = tool
            .execute(&args(serde_json::json!({
                "file_path": "a.py", "old_string": "x = 1", "new_string": "x = 10"
            })))
            .await
            .unwrap();
        assert_eq!(out.content, "Successfully edited a.py");
        let on_disk = std::fs::read_to_string(dir.path().join("a.py")).unwrap();
        assert_eq!(on_disk, "x = 10\ny = 2\n");
        assert_eq!(
            out.effect,
            Some(ContextEffect::FileWritten {
                path: dir.path().join("a.py"),
                content_hash: content_hash(on_disk.as_bytes()),
            })
        );
    }

    #[tokio::test]
    async fn edit_rejects_ambiguous_and_missing_matches() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "v = 0\nv = 0\n").unwrap();
        let tool = EditTool::new(dir.path());

        let err = tool
            .execute(&args(serde_json::json!({
                "file_path": "a.py", "old_string": "v = 0", "new_string": "v = 1"
            })))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("appears 2 times"));

        let err = tool
            .execute(&args(serde_json::json!({
                "file_path": "a.py", "old_string": "w = 0", "new_string": "w = 1"
            })))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("old_string not found"));

        let out = tool
            .execute(&args(serde_json::json!({
                "file_path": "a.py", "old_string": "v = 0", "new_string": "v = 1",
                "replace_all": true
            })))
            .await
            .unwrap();
        assert_eq!(out.content, "Successfully replaced 2 occurrence(s) in a.py");
    }

    #[test]
    fn edit_declares_fresh_read_precondition() {
        let tool = EditTool::new("/w");
        assert_eq!(
            tool.precondition(r#"{"file_path":"b.py","old_string":"a","new_string":"b"}"#),
            Some(Precondition::FreshRead(PathBuf::from("/w/b.py")))
        );
        assert_eq!(tool.precondition("{}"), None);
    }
}
