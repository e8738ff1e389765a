//! Reconnection state machine.
//!
//! ```text
//! Idle ──begin──► Streaming ──success──► Idle
//!                     │
//!                  failure
//!                     ├──► Reconnecting ──resume──► Streaming
//!                     └──► Terminal (absorbing until the next begin)
//! ```

use crate::client::error_classification::ClassifiedError;
use crate::client::policy::{Decision, RetryPolicy};
use crate::types::payload::ChatPayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectState {
    Idle,
    Streaming,
    Reconnecting,
    Terminal,
}

/// Per-send retry bookkeeping. Discarded on success or terminal failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    pub retry_count: u32,
    pub last_error: Option<ClassifiedError>,
    /// The request body, kept only so a retry can resend it verbatim.
    pub pending_payload: Option<ChatPayload>,
}

#[derive(Debug, Clone)]
pub struct ReconnectionController {
    policy: RetryPolicy,
    state: ReconnectState,
    retry: RetryState,
}

impl ReconnectionController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: ReconnectState::Idle,
            retry: RetryState::default(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn state(&self) -> ReconnectState {
        self.state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry.retry_count
    }

    pub fn last_error(&self) -> Option<&ClassifiedError> {
        self.retry.last_error.as_ref()
    }

    pub fn pending_payload(&self) -> Option<&ChatPayload> {
        self.retry.pending_payload.as_ref()
    }

    /// A fresh, explicit send. Resets the retry count from any state.
    pub fn begin(&mut self, payload: ChatPayload) {
        self.retry = RetryState {
            retry_count: 0,
            last_error: None,
            pending_payload: Some(payload),
        };
        self.state = ReconnectState::Streaming;
    }

    pub fn on_success(&mut self) {
        self.retry = RetryState::default();
        self.state = ReconnectState::Idle;
    }

    /// Record a failure and move to `Reconnecting` or `Terminal`.
    pub fn on_failure(&mut self, error: ClassifiedError) -> Decision {
        let decision = match self.state {
            ReconnectState::Terminal => Decision::Terminal,
            _ if self.retry.pending_payload.is_none() => Decision::Terminal,
            _ => self.policy.decide(&error, self.retry.retry_count),
        };

        match decision {
            Decision::Retry { attempt, .. } => {
                self.retry.retry_count = attempt;
                self.retry.last_error = Some(error);
                self.state = ReconnectState::Reconnecting;
            }
            Decision::Terminal => {
                self.retry = RetryState {
                    last_error: Some(error),
                    ..RetryState::default()
                };
                self.state = ReconnectState::Terminal;
            }
        }
        decision
    }

    /// Leave `Reconnecting` after the backoff elapsed, yielding the payload
    /// to resend. `None` (and no state change) when there is nothing to resume.
    pub fn resume(&mut self) -> Option<ChatPayload> {
        if self.state != ReconnectState::Reconnecting {
            return None;
        }
        let payload = self.retry.pending_payload.clone()?;
        self.state = ReconnectState::Streaming;
        Some(payload)
    }

    /// Drop all retry state, e.g. after cancellation or a history clear.
    pub fn reset(&mut self) {
        self.retry = RetryState::default();
        self.state = ReconnectState::Idle;
    }
}
