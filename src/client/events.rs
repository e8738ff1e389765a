//! Session events and sinks.
//!
//! A [`StreamSession`](crate::client::session::StreamSession) reports everything
//! it does through one [`SessionSink`]; consumers match on [`SessionEvent`].

use crate::client::error_classification::ClassifiedError;
use crate::client::policy::describe_delay;
use crate::types::events::CompletionMetrics;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Final result of a successful exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedMessage {
    /// Server-declared total content when provided, else the local accumulation.
    pub content: String,
    /// Text accumulated locally from `chunk` frames of the successful attempt.
    pub accumulated: String,
    pub metrics: CompletionMetrics,
    pub session_id: String,
    pub task_id: Option<String>,
    /// Number of retries spent before this attempt succeeded.
    pub retries: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// One `chunk` frame: the new piece plus everything accumulated so far.
    Message { delta: String, accumulated: String },
    /// A retry is scheduled; emitted before the delay starts.
    Reconnecting {
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
        error: ClassifiedError,
    },
    Complete(CompletedMessage),
    /// Terminal failure. Emitted at most once per send.
    Error(ClassifiedError),
}

impl SessionEvent {
    /// Advisory text for a reconnect, e.g. "Connection lost, reconnecting (1/3) in 1s".
    pub fn reconnect_notice(&self) -> Option<String> {
        match self {
            SessionEvent::Reconnecting {
                attempt,
                max_attempts,
                delay,
                ..
            } => Some(format!(
                "Connection lost, reconnecting ({}/{}) in {}",
                attempt,
                max_attempts,
                describe_delay(*delay)
            )),
            _ => None,
        }
    }
}

/// Destination for session events.
#[async_trait]
pub trait SessionSink: Send + Sync {
    async fn on_event(&self, event: SessionEvent) -> Result<()>;
}

/// Discards every event.
pub struct NoopSessionSink;

#[async_trait]
impl SessionSink for NoopSessionSink {
    async fn on_event(&self, _event: SessionEvent) -> Result<()> {
        Ok(())
    }
}

pub fn noop_sink() -> Arc<dyn SessionSink> {
    Arc::new(NoopSessionSink)
}

/// Forwards events into a tokio channel.
pub struct ChannelSink {
    tx: mpsc::Sender<SessionEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<SessionEvent>) -> Self {
        Self { tx }
    }

    /// Convenience constructor returning the sink and its receiver.
    pub fn channel(capacity: usize) -> (Arc<Self>, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Arc::new(Self::new(tx)), rx)
    }
}

#[async_trait]
impl SessionSink for ChannelSink {
    async fn on_event(&self, event: SessionEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| Error::runtime("session event receiver dropped"))
    }
}

/// Keeps every event in memory. Handy in tests and for debugging.
#[derive(Default, Clone)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

#[async_trait]
impl SessionSink for RecordingSink {
    async fn on_event(&self, event: SessionEvent) -> Result<()> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
        Ok(())
    }
}
