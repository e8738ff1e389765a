//! JSON endpoints next to the stream: feedback, scenario assist and watch mode.

use crate::types::task::TaskOrResult;
use crate::Result;
use serde_json::Value;

use super::core::ChatClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    ChatFeedback,
    ScenarioFeedback,
    ScenarioAssist,
    WatchStart,
    WatchNext,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::ChatFeedback => "chat/feedback",
            Endpoint::ScenarioFeedback => "scenario/feedback",
            Endpoint::ScenarioAssist => "scenario/assist",
            Endpoint::WatchStart => "watch/start",
            Endpoint::WatchNext => "watch/next",
        }
    }

    /// Whether the server may answer with `{task_id}` instead of a result.
    pub fn may_defer(self) -> bool {
        matches!(
            self,
            Endpoint::ChatFeedback | Endpoint::ScenarioFeedback | Endpoint::ScenarioAssist
        )
    }
}

impl ChatClient {
    /// POST to an endpoint and report whether it answered or deferred to a task.
    pub async fn call(&self, endpoint: Endpoint, body: &Value) -> Result<TaskOrResult> {
        let response = self.transport().post_json(endpoint.path(), body).await?;
        if endpoint.may_defer() {
            Ok(TaskOrResult::from_response(response))
        } else {
            Ok(TaskOrResult::Result(response))
        }
    }

    /// POST and, if the server deferred, wait for the task with the configured timeout.
    pub async fn call_and_wait(&self, endpoint: Endpoint, body: &Value) -> Result<Value> {
        match self.call(endpoint, body).await? {
            TaskOrResult::Result(v) => Ok(v),
            TaskOrResult::Task(task_id) => {
                tracing::info!(
                    endpoint = endpoint.path(),
                    task_id = task_id.as_str(),
                    "request deferred to background task"
                );
                self.wait_for_task(&task_id, None).await
            }
        }
    }

    pub async fn chat_feedback(&self, body: &Value) -> Result<Value> {
        self.call_and_wait(Endpoint::ChatFeedback, body).await
    }

    pub async fn scenario_feedback(&self, body: &Value) -> Result<Value> {
        self.call_and_wait(Endpoint::ScenarioFeedback, body).await
    }

    pub async fn scenario_assist(&self, body: &Value) -> Result<Value> {
        self.call_and_wait(Endpoint::ScenarioAssist, body).await
    }

    pub async fn watch_start(&self, body: &Value) -> Result<Value> {
        self.call_and_wait(Endpoint::WatchStart, body).await
    }

    pub async fn watch_next(&self, body: &Value) -> Result<Value> {
        self.call_and_wait(Endpoint::WatchNext, body).await
    }
}
