//! # chat-stream-client
//!
//! 面向分块 AI 回复的可恢复事件流客户端。
//!
//! Resilient streaming client for chunked AI chat responses delivered as
//! Server-Sent Events.
//!
//! ## Overview
//!
//! A message is POSTed to the chat endpoint; the server answers with an event
//! stream of `connected`, `chunk`, `complete`, `error` and `heartbeat` frames.
//! The client reassembles the text, reports every increment to a caller-supplied
//! sink, and survives transient failures by re-sending the last message with
//! exponential backoff. Long-running server work is tracked through a task id
//! and resolved by polling.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chat_stream_client::{ChatClient, ChatPayload, RecordingSink, SendOutcome};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> chat_stream_client::Result<()> {
//!     let client = ChatClient::builder()
//!         .base_url("http://localhost:8000")
//!         .build()?;
//!
//!     let sink = Arc::new(RecordingSink::default());
//!     let session = client.session(sink.clone());
//!     match session.send(ChatPayload::new("Hello", "default")).await? {
//!         SendOutcome::Completed(done) => println!("{}", done.content),
//!         other => println!("{:?}", other),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Sessions, retry policy, reconnection, task polling |
//! | [`pipeline`] | Incremental event-stream frame parsing |
//! | [`transport`] | HTTP transport and the [`transport::Transport`] seam |
//! | [`types`] | Frames, payloads and task snapshots |
//! | [`config`] | Client configuration (YAML + environment) |

pub mod client;
pub mod config;
pub mod pipeline;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use client::{
    CancelHandle, ChannelSink, ChatClient, ChatClientBuilder, ClassifiedError, CompletedMessage,
    Endpoint, ErrorClassifier, ErrorKind, RecordingSink, RetryPolicy, SendOutcome, SessionEvent,
    SessionSink, StreamSession, TaskPoller,
};
pub use config::ClientConfig;
pub use pipeline::EventFrameParser;
pub use types::{ChatPayload, Frame, RawFrame, TaskOrResult, TaskStatus};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `Result<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
