//! Background task polling.
//!
//! Polls `GET /task/{id}/status` at a fixed interval until the task succeeds,
//! fails, or the deadline passes. A failed poll request is returned to the
//! caller as-is.

use crate::client::types::CancelHandle;
use crate::transport::Transport;
use crate::types::task::{TaskSnapshot, TaskStatus};
use crate::{Error, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

type ProgressFn = dyn Fn(&TaskSnapshot) + Send + Sync;

pub struct TaskPoller {
    transport: Arc<dyn Transport>,
    interval: Duration,
    cancel: CancelHandle,
    on_progress: Option<Arc<ProgressFn>>,
}

impl TaskPoller {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            interval: DEFAULT_POLL_INTERVAL,
            cancel: CancelHandle::new(),
            on_progress: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.interval = interval;
        }
        self
    }

    /// Stop signal shared with the caller; cancelling it ends any wait with
    /// [`Error::Cancelled`].
    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// Observe every poll response, e.g. to render `current/total` progress.
    pub fn with_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskSnapshot) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(f));
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn status_path(task_id: &str) -> String {
        format!("task/{}/status", task_id)
    }

    /// A single status request.
    pub async fn poll_once(&self, task_id: &str) -> Result<TaskSnapshot> {
        let body = self.transport.get_json(&Self::status_path(task_id)).await?;
        Ok(serde_json::from_value(body)?)
    }

    /// Poll until `SUCCESS` (returns the result), `FAILURE` ([`Error::TaskFailed`])
    /// or until `timeout` of wall-clock time has elapsed ([`Error::TaskTimeout`]).
    pub async fn wait_for_task(&self, task_id: &str, timeout: Duration) -> Result<Value> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut polls: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            // A stalled status request is cut off at the deadline too.
            let snapshot = tokio::select! {
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                r = tokio::time::timeout_at(deadline, self.poll_once(task_id)) => match r {
                    Ok(snapshot) => snapshot?,
                    Err(_) => {
                        info!(task_id, polls, "status request still pending at deadline");
                        return Err(timed_out(task_id, timeout));
                    }
                },
            };
            polls += 1;
            if let Some(cb) = &self.on_progress {
                cb(&snapshot);
            }

            match snapshot.status {
                Some(TaskStatus::Success) => {
                    info!(
                        task_id,
                        polls,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "task succeeded"
                    );
                    return Ok(snapshot.result.unwrap_or(Value::Null));
                }
                Some(TaskStatus::Failure) => {
                    let message = snapshot
                        .error
                        .filter(|e| !e.trim().is_empty())
                        .unwrap_or_else(|| "Task failed".to_string());
                    info!(task_id, polls, error = message.as_str(), "task failed");
                    return Err(Error::TaskFailed {
                        task_id: task_id.to_string(),
                        message,
                    });
                }
                status => {
                    debug!(
                        task_id,
                        polls,
                        status = ?status,
                        current = snapshot.current,
                        total = snapshot.total,
                        "task still running"
                    );
                }
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(timed_out(task_id, timeout));
            }

            // Never sleep past the deadline: the last poll lands on it.
            let wait = self.interval.min(timeout - elapsed);
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

fn timed_out(task_id: &str, timeout: Duration) -> Error {
    Error::TaskTimeout {
        task_id: task_id.to_string(),
        timeout_ms: timeout.as_millis() as u64,
    }
}
