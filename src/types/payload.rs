//! Request bodies.

use serde::{Deserialize, Serialize};

/// What a session sends: the user's message and the model to answer it.
///
/// Retained verbatim by the reconnection controller so a resend is identical
/// to the original request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPayload {
    pub message: String,
    pub model: String,
}

impl ChatPayload {
    pub fn new(message: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            model: model.into(),
        }
    }
}

/// Body of `POST /chat/stream`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    pub message: String,
    pub model: String,
    pub session_id: String,
}

impl StreamRequest {
    pub fn new(payload: &ChatPayload, session_id: impl Into<String>) -> Self {
        Self {
            message: payload.message.clone(),
            model: payload.model.clone(),
            session_id: session_id.into(),
        }
    }
}
