//! Streaming client: sessions, reconnection and task polling.
//!
//! Implementation details are split into submodules under `src/client/`.

pub mod builder;
pub mod core;
pub mod endpoint;
pub mod error_classification;
pub mod events;
pub mod poller;
pub mod policy;
pub mod reconnect;
pub mod session;
pub mod types;

pub use builder::ChatClientBuilder;
pub use self::core::ChatClient;
pub use endpoint::Endpoint;
pub use error_classification::{ClassifiedError, ErrorClassifier, ErrorKind, Severity};
pub use events::{
    noop_sink, ChannelSink, CompletedMessage, RecordingSink, SessionEvent, SessionSink,
};
pub use poller::TaskPoller;
pub use policy::{Decision, RetryPolicy};
pub use reconnect::{ReconnectState, ReconnectionController, RetryState};
pub use session::{SendOutcome, StreamSession};
pub use types::CancelHandle;
