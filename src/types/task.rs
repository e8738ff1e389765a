//! Background task status as reported by `GET /task/{id}/status`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    Progress,
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub current: u64,
    pub total: u64,
}

/// One poll response.
///
/// Unknown or missing status values deserialize to `None` and are treated
/// like `PENDING` by the poller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

fn lenient_status<'de, D>(deserializer: D) -> Result<Option<TaskStatus>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<Value> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|v| serde_json::from_value(v).ok()))
}

impl TaskSnapshot {
    pub fn progress(&self) -> Option<TaskProgress> {
        match (self.current, self.total) {
            (Some(current), Some(total)) => Some(TaskProgress { current, total }),
            _ => None,
        }
    }
}

/// A JSON endpoint either answers immediately or hands back a task id.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOrResult {
    Task(String),
    Result(Value),
}

impl TaskOrResult {
    pub fn from_response(body: Value) -> Self {
        match body.get("task_id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => TaskOrResult::Task(id.to_string()),
            _ => TaskOrResult::Result(body),
        }
    }
}
