//! Scripted in-memory transport shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chat_stream_client::transport::{StreamResponse, Transport, TransportError};
use chat_stream_client::types::StreamRequest;
use chat_stream_client::{BoxStream, CancelHandle, Error, Result};
use futures::stream;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

/// What the next `open_stream` call does.
pub enum StreamScript {
    /// Open succeeds; the body yields these byte chunks and then ends.
    Body {
        session_id: Option<String>,
        task_id: Option<String>,
        chunks: Vec<Bytes>,
    },
    /// Open fails with this error.
    OpenError(Error),
    /// Open succeeds; the body never produces anything.
    Hang,
}

impl StreamScript {
    pub fn frames<S: AsRef<str>>(frames: impl IntoIterator<Item = S>) -> Self {
        StreamScript::Body {
            session_id: None,
            task_id: None,
            chunks: to_chunks(frames),
        }
    }

    pub fn frames_with_session<S: AsRef<str>>(
        session_id: &str,
        frames: impl IntoIterator<Item = S>,
    ) -> Self {
        StreamScript::Body {
            session_id: Some(session_id.to_string()),
            task_id: None,
            chunks: to_chunks(frames),
        }
    }

    pub fn network_failure() -> Self {
        StreamScript::OpenError(TransportError::Other("network unreachable".to_string()).into())
    }
}

fn to_chunks<S: AsRef<str>>(frames: impl IntoIterator<Item = S>) -> Vec<Bytes> {
    frames
        .into_iter()
        .map(|f| Bytes::copy_from_slice(f.as_ref().as_bytes()))
        .collect()
}

/// `data:` line for a JSON frame body.
pub fn sse(json: &str) -> String {
    format!("data: {}\n\n", json)
}

pub fn chunk(content: &str) -> String {
    sse(&serde_json::json!({"type": "chunk", "content": content}).to_string())
}

pub fn complete(total: &str) -> String {
    sse(&serde_json::json!({"type": "complete", "total_content": total}).to_string())
}

#[derive(Default)]
pub struct ScriptedTransport {
    streams: Mutex<VecDeque<StreamScript>>,
    posts: Mutex<VecDeque<Result<Value>>>,
    gets: Mutex<VecDeque<Result<Value>>>,
    requests: Mutex<Vec<StreamRequest>>,
    get_paths: Mutex<Vec<String>>,
    opens: AtomicUsize,
    stall_gets: AtomicBool,
    /// Signalled once per `open_stream` call.
    pub opened: Notify,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_streams(scripts: impl IntoIterator<Item = StreamScript>) -> Self {
        let t = Self::new();
        t.streams.lock().unwrap().extend(scripts);
        t
    }

    pub fn push_stream(&self, script: StreamScript) {
        self.streams.lock().unwrap().push_back(script);
    }

    pub fn push_post(&self, response: Result<Value>) {
        self.posts.lock().unwrap().push_back(response);
    }

    pub fn push_get(&self, response: Result<Value>) {
        self.gets.lock().unwrap().push_back(response);
    }

    /// Every later `get_json` call never resolves.
    pub fn stall_gets(&self) {
        self.stall_gets.store(true, Ordering::SeqCst);
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<StreamRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn get_paths(&self) -> Vec<String> {
        self.get_paths.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open_stream(
        &self,
        request: &StreamRequest,
        _cancel: &CancelHandle,
    ) -> Result<StreamResponse> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let script = self.streams.lock().unwrap().pop_front();
        self.opened.notify_one();

        match script {
            Some(StreamScript::Body {
                session_id,
                task_id,
                chunks,
            }) => {
                let body: BoxStream<'static, Bytes> =
                    Box::pin(stream::iter(chunks.into_iter().map(Ok::<Bytes, Error>)));
                Ok(StreamResponse {
                    session_id,
                    task_id,
                    body,
                })
            }
            Some(StreamScript::OpenError(e)) => Err(e),
            Some(StreamScript::Hang) => Ok(StreamResponse {
                session_id: None,
                task_id: None,
                body: Box::pin(stream::pending::<Result<Bytes>>()),
            }),
            None => Err(TransportError::Other("no scripted stream left".to_string()).into()),
        }
    }

    async fn post_json(&self, _path: &str, _body: &Value) -> Result<Value> {
        self.posts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Value::Null))
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        self.get_paths.lock().unwrap().push(path.to_string());
        if self.stall_gets.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        self.gets
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(serde_json::json!({"status": "PENDING"})))
    }
}
