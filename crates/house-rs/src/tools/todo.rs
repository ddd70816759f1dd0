//! The TodoWrite tool.
//!
//! Every call carries the complete list. The tool validates it and reports
//! the new snapshot as [`ContextEffect::TodosReplaced`]; the orchestrator
//! stores it in the conversation.

use crate::ToolDef;
use crate::context::{TodoItem, TodoStatus, todos};
use crate::error::ToolError;
use crate::tools::core::{ContextEffect, Tool, ToolFuture, ToolOutput, parse_tool_args};
use crate::tools::names;
use crate::tools::spec::ToolSpec;
use schemars::JsonSchema;
use serde::Deserialize;

/// Typed arguments for `TodoWrite`.
#[derive(Deserialize, JsonSchema)]
pub struct TodoWriteArgs {
    /// The full, updated todo list.
    pub todos: Vec<TodoItem>,
}

/// Replace the session's todo list.
pub struct TodoWriteTool;

/// Summary line plus the task currently in progress, if any.
fn summarize(items: &[TodoItem]) -> String {
    let (completed, in_progress, pending) = todos::status_counts(items);
    let mut text =
        format!("Todos updated: {completed} completed, {in_progress} in progress, {pending} pending");
    if let Some(current) = items.iter().find(|t| t.status == TodoStatus::InProgress) {
        let label = current.active_form.as_deref().unwrap_or(&current.content);
        text.push_str(&format!("\n\nCurrent task: {label}"));
    }
    text
}

impl Tool for TodoWriteTool {
    fn definition(&self) -> ToolDef {
        ToolSpec::builder(names::TODO_WRITE)
            .purpose("Replace the task list that tracks progress on the current request")
            .when_to_use(
                "For work with three or more steps: write the plan up front, then send the \
                 whole list again each time an item starts or finishes",
            )
            .when_not_to_use("For a single quick step, or to record notes that are not tasks")
            .parameters_for::<TodoWriteArgs>()
            .example(
                "TodoWrite(todos=[{content:'Fix parser', status:'in_progress', \
                 activeForm:'Fixing parser'}, {content:'Run tests', status:'pending'}])",
                "list replaced, parser fix is current",
            )
            .output_format(
                "'Todos updated: c completed, i in progress, p pending' and the current task",
            )
            .to_tool_def()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let arguments = arguments.to_string();
        Box::pin(async move {
            let args: TodoWriteArgs = parse_tool_args(names::TODO_WRITE, &arguments)?;
            let (_, in_progress, _) = todos::status_counts(&args.todos);
            if in_progress > 1 {
                return Err(ToolError::execution(format!(
                    "{in_progress} items are in_progress; keep exactly one task in progress at a time"
                )));
            }
            if args.todos.iter().any(|t| t.content.trim().is_empty() && t.id.is_none()) {
                return Err(ToolError::execution(
                    "every todo needs non-empty content or an id",
                ));
            }
            Ok(ToolOutput::text(summarize(&args.todos))
                .with_effect(ContextEffect::TodosReplaced(args.todos)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_counts_and_current_task() {
        let args = r#"{"todos":[
            {"content":"Write parser","status":"completed"},
            {"content":"Run tests","status":"in_progress","activeForm":"Running tests"},
            {"content":"Update docs","status":"pending"}
        ]}"#;
        let out = TodoWriteTool.execute(args).await.unwrap();
        assert_eq!(
            out.content,
            "Todos updated: 1 completed, 1 in progress, 1 pending\n\nCurrent task: Running tests"
        );
        match out.effect {
            Some(ContextEffect::TodosReplaced(items)) => {
                assert_eq!(items.len(), 3);
                assert_eq!(items[1].status, TodoStatus::InProgress);
            }
            other => panic!("unexpected effect: {other:?}"),
        }
    }

    #[tokio::test]
    async fn current_task_falls_back_to_content() {
        let args = r#"{"todos":[{"content":"Run tests","status":"in_progress"}]}"#;
        let out = TodoWriteTool.execute(args).await.unwrap();
        assert!(out.content.ends_with("Current task: Run tests"));
    }

    #[tokio::test]
    async fn empty_list_clears_todos() {
        let out = TodoWriteTool.execute(r#"{"todos":[]}"#).await.unwrap();
        assert_eq!(out.content, "Todos updated: 0 completed, 0 in progress, 0 pending");
        assert_eq!(out.effect, Some(ContextEffect::TodosReplaced(vec![])));
    }

    #[tokio::test]
    async fn two_items_in_progress_are_rejected() {
        let args = r#"{"todos":[
            {"content":"a","status":"in_progress"},
            {"content":"b","status":"in_progress"}
        ]}"#;
        let err = TodoWriteTool.execute(args).await.unwrap_err();
        assert!(err.to_string().contains("2 items are in_progress"));
    }

    #[tokio::test]
    async fn unknown_status_is_invalid() {
        let err = TodoWriteTool
            .execute(r#"{"todos":[{"content":"a","status":"blocked"}]}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }
}
