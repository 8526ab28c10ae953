// src/models/tasks.rs

use serde::{Deserialize, Serialize};

use crate::models::fields::CardField;

/// Which list-valued field a range slice addresses.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RangeKind {
    AlternateGreetings,
    WorldBook,
}

/// 1-based inclusive index interval into a list-valued field.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskRange {
    pub start: usize,
    pub end: usize,
    #[serde(rename = "type")]
    pub kind: RangeKind,
}

/// One bounded piece of card text handed to an external editing step and
/// later merged back via the backfill engine.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConversionTask {
    pub id: String,
    pub group_id: String,
    pub group_name: String,
    pub fields: Vec<CardField>,
    pub content: String,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<TaskRange>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TaskGroup {
    pub id: String,
    pub name: String,
    pub tasks: Vec<ConversionTask>,
    pub completed: bool,
}

impl TaskGroup {
    /// A group is complete iff every member task is complete.
    pub fn is_complete(&self) -> bool {
        self.tasks.iter().all(|task| task.completed)
    }
}
