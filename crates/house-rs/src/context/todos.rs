//! Todo snapshot model shared by the TodoWrite tool and the GC policy.
//!
//! TodoWrite replaces the whole list on every call, so each call's arguments
//! are a complete snapshot. The collector uses [`supersedes`] to decide when
//! an older snapshot carries no information the newer one lacks.

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Status of a todo item. `done` is accepted as an alias for `completed`.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    #[serde(alias = "done")]
    Completed,
}

impl fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TodoStatus::Pending => write!(f, "[ ]"),
            TodoStatus::InProgress => write!(f, "[~]"),
            TodoStatus::Completed => write!(f, "[x]"),
        }
    }
}

/// A single todo item.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq, Eq)]
pub struct TodoItem {
    /// Optional stable identifier (string or number). Items without an id
    /// are matched across snapshots by their content.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "id_from_string_or_number"
    )]
    #[schemars(with = "Option<serde_json::Value>")]
    pub id: Option<String>,
    /// What needs to be done, in imperative form ("Run the tests").
    #[serde(default)]
    pub content: String,
    /// Current status.
    pub status: TodoStatus,
    /// Present-continuous form shown while in progress ("Running the tests").
    #[serde(
        default,
        rename = "activeForm",
        alias = "active_form",
        skip_serializing_if = "Option::is_none"
    )]
    pub active_form: Option<String>,
}

impl TodoItem {
    pub fn new(content: impl Into<String>, status: TodoStatus) -> Self {
        Self {
            id: None,
            content: content.into(),
            status,
            active_form: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Identity used to match the item across snapshots.
    fn key(&self, position: usize) -> String {
        match (&self.id, self.content.is_empty()) {
            (Some(id), _) => format!("#{id}"),
            (None, false) => self.content.clone(),
            (None, true) => format!("@{position}"),
        }
    }
}

fn id_from_string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<serde_json::Value>::deserialize(d)? {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Counts by status: `(completed, in_progress, pending)`.
pub fn status_counts(items: &[TodoItem]) -> (usize, usize, usize) {
    items.iter().fold((0, 0, 0), |(c, i, p), item| match item.status {
        TodoStatus::Completed => (c + 1, i, p),
        TodoStatus::InProgress => (c, i + 1, p),
        TodoStatus::Pending => (c, i, p + 1),
    })
}

/// Whether `newer` fully supersedes `older`: every item of the older
/// snapshot is either already completed there or re-listed in the newer one.
///
/// An unfinished item that silently disappeared from the newer list keeps the
/// older snapshot alive, since it is the only record of that item.
pub fn supersedes(newer: &[TodoItem], older: &[TodoItem]) -> bool {
    let newer_keys: Vec<String> = newer
        .iter()
        .enumerate()
        .map(|(i, item)| item.key(i))
        .collect();
    older.iter().enumerate().all(|(i, item)| {
        item.status == TodoStatus::Completed || newer_keys.contains(&item.key(i))
    })
}

/// Parse a TodoWrite argument payload (`{"todos": [...]}`) into a snapshot.
pub fn parse_snapshot(arguments: &str) -> Option<Vec<TodoItem>> {
    #[derive(Deserialize)]
    struct Payload {
        todos: Vec<TodoItem>,
    }
    serde_json::from_str::<Payload>(arguments)
        .ok()
        .map(|p| p.todos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids_and_done_alias_parse() {
        let items = parse_snapshot(r#"{"todos":[{"id":1,"status":"done"}]}"#).unwrap();
        assert_eq!(items[0].id.as_deref(), Some("1"));
        assert_eq!(items[0].status, TodoStatus::Completed);
    }

    #[test]
    fn active_form_accepts_camel_case() {
        let items = parse_snapshot(
            r#"{"todos":[{"content":"Run tests","status":"in_progress","activeForm":"Running tests"}]}"#,
        )
        .unwrap();
        assert_eq!(items[0].active_form.as_deref(), Some("Running tests"));
    }

    #[test]
    fn later_list_with_same_ids_supersedes() {
        let older = vec![TodoItem::new("", TodoStatus::Pending).with_id("1")];
        let newer = vec![TodoItem::new("", TodoStatus::Completed).with_id("1")];
        assert!(supersedes(&newer, &older));
    }

    #[test]
    fn dropped_pending_item_blocks_supersession() {
        let older = vec![
            TodoItem::new("write parser", TodoStatus::Completed),
            TodoItem::new("write tests", TodoStatus::Pending),
        ];
        let newer = vec![TodoItem::new("write docs", TodoStatus::Pending)];
        assert!(!supersedes(&newer, &older));

        let newer = vec![
            TodoItem::new("write tests", TodoStatus::InProgress),
            TodoItem::new("write docs", TodoStatus::Pending),
        ];
        assert!(supersedes(&newer, &older));
    }

    #[test]
    fn counts_by_status() {
        let items = vec![
            TodoItem::new("a", TodoStatus::Completed),
            TodoItem::new("b", TodoStatus::InProgress),
            TodoItem::new("c", TodoStatus::Pending),
            TodoItem::new("d", TodoStatus::Pending),
        ];
        assert_eq!(status_counts(&items), (1, 1, 2));
    }
}
