//! 流式会话：单次请求/响应交换的编排（发送、逐帧分发、重连、完成）。
//!
//! One logical conversation over the event stream.
//!
//! A [`StreamSession`] owns the conversation id, the accumulation buffer and the
//! reconnection controller. `send` opens one transport at a time; frames are
//! dispatched in arrival order and every observable effect goes through the
//! session's [`SessionSink`].

use crate::client::error_classification::{ClassifiedError, ErrorClassifier};
use crate::client::events::{CompletedMessage, SessionEvent, SessionSink};
use crate::client::policy::{describe_delay, Decision, RetryPolicy};
use crate::client::reconnect::{ReconnectState, ReconnectionController};
use crate::client::types::CancelHandle;
use crate::pipeline::FrameDecoder;
use crate::transport::{Transport, TransportError};
use crate::types::events::{CompletionMetrics, Frame};
use crate::types::payload::{ChatPayload, StreamRequest};
use crate::{BoxStream, Error, ErrorContext, Result};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How a call to [`StreamSession::send`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Completed(CompletedMessage),
    /// A stream was already open; nothing was sent.
    Ignored,
    /// Terminal failure (already reported to the sink).
    Failed(ClassifiedError),
    Cancelled,
}

struct SessionState {
    session_id: Option<String>,
    /// Set once the server has confirmed or assigned the id.
    id_confirmed: bool,
    current_message: String,
    controller: ReconnectionController,
    cancel: Option<CancelHandle>,
    last_payload: Option<ChatPayload>,
    last_task_id: Option<String>,
    /// Bumped by every accepted send; a stale send never releases a newer one.
    generation: u64,
}

pub struct StreamSession {
    transport: Arc<dyn Transport>,
    sink: Arc<dyn SessionSink>,
    decoder: FrameDecoder,
    idle_timeout: Option<Duration>,
    streaming: AtomicBool,
    state: Mutex<SessionState>,
}

impl StreamSession {
    pub fn new(
        transport: Arc<dyn Transport>,
        policy: RetryPolicy,
        sink: Arc<dyn SessionSink>,
    ) -> Self {
        Self {
            transport,
            sink,
            decoder: FrameDecoder,
            idle_timeout: None,
            streaming: AtomicBool::new(false),
            state: Mutex::new(SessionState {
                session_id: None,
                id_confirmed: false,
                current_message: String::new(),
                controller: ReconnectionController::new(policy),
                cancel: None,
                last_payload: None,
                last_task_id: None,
                generation: 0,
            }),
        }
    }

    /// Resume a conversation whose id the caller persisted earlier.
    pub fn with_session_id(self, id: impl Into<String>) -> Self {
        let id = id.into();
        {
            let mut st = self.state();
            st.session_id = if id.trim().is_empty() { None } else { Some(id) };
            st.id_confirmed = false;
        }
        self
    }

    /// Fail an attempt with a `timeout` error when no bytes arrive for `timeout`.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    pub fn session_id(&self) -> Option<String> {
        self.state().session_id.clone()
    }

    /// Task id announced by the last stream response, if any.
    pub fn last_task_id(&self) -> Option<String> {
        self.state().last_task_id.clone()
    }

    pub fn reconnect_state(&self) -> ReconnectState {
        self.state().controller.state()
    }

    /// Cancel the in-flight transport or backoff sleep. No-op when idle.
    pub fn cancel(&self) {
        if let Some(handle) = self.state().cancel.as_ref() {
            handle.cancel();
        }
    }

    /// Forget the conversation: cancels any open stream and clears the id.
    /// The next send starts a new conversation with a fresh id.
    pub fn clear_history(&self) {
        let mut st = self.state();
        if let Some(handle) = st.cancel.as_ref() {
            handle.cancel();
        }
        info!(
            session_id = st.session_id.as_deref().unwrap_or(""),
            "clearing conversation history"
        );
        st.session_id = None;
        st.id_confirmed = false;
        st.current_message.clear();
        st.last_payload = None;
        st.last_task_id = None;
        st.controller.reset();
    }

    /// Send the last payload again as a fresh request. `Ignored` if nothing
    /// was ever sent (or history was cleared).
    pub async fn retry_last(&self) -> Result<SendOutcome> {
        let payload = self.state().last_payload.clone();
        match payload {
            Some(p) => self.send(p).await,
            None => {
                debug!("retry requested but no payload was recorded");
                Ok(SendOutcome::Ignored)
            }
        }
    }

    /// Send a message and drive the exchange to completion, retrying
    /// recoverable failures.
    ///
    /// Returns `Err` only for an invalid payload; transport and server
    /// failures are classified and reported through the sink.
    pub async fn send(&self, payload: ChatPayload) -> Result<SendOutcome> {
        validate_payload(&payload)?;

        let cancel = CancelHandle::new();
        let generation = {
            let mut st = self.state();
            if self.streaming.swap(true, Ordering::AcqRel) {
                None
            } else {
                if st.session_id.is_none() {
                    st.session_id = Some(Uuid::new_v4().to_string());
                    st.id_confirmed = false;
                }
                st.controller.begin(payload.clone());
                st.last_payload = Some(payload.clone());
                st.current_message.clear();
                st.cancel = Some(cancel.clone());
                st.generation += 1;
                Some(st.generation)
            }
        };
        let Some(generation) = generation else {
            warn!(
                session_id = self.session_id().as_deref().unwrap_or(""),
                "send ignored: a stream is already open for this session"
            );
            return Ok(SendOutcome::Ignored);
        };

        let _guard = StreamingGuard {
            session: self,
            generation,
        };
        Ok(self.drive(payload, &cancel, generation).await)
    }

    async fn drive(
        &self,
        mut payload: ChatPayload,
        cancel: &CancelHandle,
        generation: u64,
    ) -> SendOutcome {
        loop {
            let started = Instant::now();
            let result = self.run_attempt(&payload, cancel).await;

            let err = match result {
                Ok(done) => {
                    self.state().controller.on_success();
                    info!(
                        session_id = done.session_id.as_str(),
                        model = payload.model.as_str(),
                        retries = done.retries,
                        chars = done.content.len(),
                        duration_ms = started.elapsed().as_millis() as u64,
                        "stream completed"
                    );
                    // Ready for the next send before the sink hears about it.
                    self.release(generation);
                    self.emit(SessionEvent::Complete(done.clone())).await;
                    return SendOutcome::Completed(done);
                }
                Err(e) => e,
            };

            if err.is_cancelled() || cancel.is_cancelled() {
                self.state().controller.reset();
                info!("stream cancelled");
                return SendOutcome::Cancelled;
            }

            let classified = ErrorClassifier::classify(&err);
            let (decision, max_attempts) = {
                let mut st = self.state();
                // The next attempt starts from an empty buffer.
                st.current_message.clear();
                let decision = st.controller.on_failure(classified.clone());
                (decision, st.controller.policy().max_retries)
            };

            match decision {
                Decision::Retry { attempt, delay } => {
                    warn!(
                        error_kind = classified.kind.as_str(),
                        attempt,
                        max_attempts,
                        delay = %describe_delay(delay),
                        error = %err,
                        "stream failed, reconnecting"
                    );
                    self.emit(SessionEvent::Reconnecting {
                        attempt,
                        max_attempts,
                        delay,
                        error: classified.clone(),
                    })
                    .await;

                    tokio::select! {
                        _ = cancel.cancelled() => {
                            self.state().controller.reset();
                            info!("reconnect cancelled during backoff");
                            return SendOutcome::Cancelled;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }

                    let resumed = self.state().controller.resume();
                    match resumed {
                        Some(p) => payload = p,
                        None => {
                            self.release(generation);
                            self.emit(SessionEvent::Error(classified.clone())).await;
                            return SendOutcome::Failed(classified);
                        }
                    }
                }
                Decision::Terminal => {
                    warn!(
                        error_kind = classified.kind.as_str(),
                        recoverable = classified.recoverable,
                        error = %err,
                        "stream failed permanently"
                    );
                    self.release(generation);
                    self.emit(SessionEvent::Error(classified.clone())).await;
                    return SendOutcome::Failed(classified);
                }
            }
        }
    }

    /// One transport lifetime: open, read frames until `complete`, `error` or EOF.
    async fn run_attempt(
        &self,
        payload: &ChatPayload,
        cancel: &CancelHandle,
    ) -> Result<CompletedMessage> {
        let (session_id, retries) = {
            let st = self.state();
            (
                st.session_id.clone().unwrap_or_default(),
                st.controller.retry_count(),
            )
        };
        let request = StreamRequest::new(payload, session_id);

        let response = self.transport.open_stream(&request, cancel).await?;
        self.adopt_session_id(response.session_id.as_deref());
        let task_id = response.task_id.clone();
        if task_id.is_some() {
            self.state().last_task_id = task_id.clone();
        }

        let mut frames = self.decoder.decode_stream(response.body);
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                next = next_frame(&mut frames, self.idle_timeout) => next?,
            };
            let frame = match next {
                Some(frame) => frame?,
                None => return Err(TransportError::Incomplete.into()),
            };

            match frame {
                Frame::Connected { channel } => {
                    debug!(channel = channel.as_deref().unwrap_or(""), "stream connected");
                }
                Frame::Heartbeat => debug!("heartbeat"),
                Frame::Chunk { content } => {
                    let accumulated = {
                        let mut st = self.state();
                        st.current_message.push_str(&content);
                        st.current_message.clone()
                    };
                    self.emit(SessionEvent::Message {
                        delta: content,
                        accumulated,
                    })
                    .await;
                }
                Frame::Complete {
                    total_content,
                    metrics,
                } => {
                    let (accumulated, session_id) = {
                        let mut st = self.state();
                        (
                            std::mem::take(&mut st.current_message),
                            st.session_id.clone().unwrap_or_default(),
                        )
                    };
                    return Ok(completed(
                        total_content,
                        accumulated,
                        metrics,
                        session_id,
                        task_id,
                        retries,
                    ));
                }
                Frame::Error { message } => return Err(Error::Stream { message }),
            }
        }
    }

    /// Adopt the server's id once; afterwards a different id is ignored.
    fn adopt_session_id(&self, server_id: Option<&str>) {
        let Some(server_id) = server_id.map(str::trim).filter(|s| !s.is_empty()) else {
            return;
        };
        let mut st = self.state();
        let current = st.session_id.clone();
        match current.as_deref() {
            Some(cur) if cur == server_id => st.id_confirmed = true,
            Some(cur) if st.id_confirmed => {
                warn!(
                    current = cur,
                    received = server_id,
                    "ignoring session id change mid-conversation"
                );
            }
            _ => {
                info!(session_id = server_id, "session id assigned by server");
                st.session_id = Some(server_id.to_string());
                st.id_confirmed = true;
            }
        }
    }

    /// Clear the per-send state of `generation`, unless a newer send owns it.
    fn release(&self, generation: u64) {
        let mut st = self.state();
        if st.generation != generation {
            return;
        }
        st.cancel = None;
        st.current_message.clear();
        self.streaming.store(false, Ordering::Release);
    }

    async fn emit(&self, event: SessionEvent) {
        if let Err(e) = self.sink.on_event(event).await {
            warn!(error = %e, "session sink rejected event");
        }
    }
}

/// Clears the streaming flag even when the `send` future is dropped mid-flight.
struct StreamingGuard<'a> {
    session: &'a StreamSession,
    generation: u64,
}

impl Drop for StreamingGuard<'_> {
    fn drop(&mut self) {
        self.session.release(self.generation);
    }
}

fn completed(
    total_content: Option<String>,
    accumulated: String,
    metrics: CompletionMetrics,
    session_id: String,
    task_id: Option<String>,
    retries: u32,
) -> CompletedMessage {
    let content = total_content
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| accumulated.clone());
    CompletedMessage {
        content,
        accumulated,
        metrics,
        session_id,
        task_id,
        retries,
    }
}

async fn next_frame(
    frames: &mut BoxStream<'static, Frame>,
    idle_timeout: Option<Duration>,
) -> Result<Option<Result<Frame>>> {
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, frames.next())
            .await
            .map_err(|_| TransportError::ReadTimeout(limit.as_millis() as u64).into()),
        None => Ok(frames.next().await),
    }
}

fn validate_payload(payload: &ChatPayload) -> Result<()> {
    if payload.message.trim().is_empty() {
        return Err(Error::runtime_with_context(
            "message must not be empty",
            ErrorContext::new()
                .with_field_path("payload.message")
                .with_source("stream_session"),
        ));
    }
    if payload.model.trim().is_empty() {
        return Err(Error::runtime_with_context(
            "model must not be empty",
            ErrorContext::new()
                .with_field_path("payload.model")
                .with_source("stream_session"),
        ));
    }
    Ok(())
}
