//! Event stream frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event name used when a frame carries no `event:` field.
pub const DEFAULT_EVENT: &str = "message";

/// One blank-line-delimited block of the event stream, before JSON decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub event: String,
    pub data: String,
}

/// Metrics attached to a `complete` frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
    /// Server-side generation time, as reported by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time: Option<f64>,
}

/// Typed protocol frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Connected {
        channel: Option<String>,
    },
    /// Incremental text; appended to the accumulation buffer.
    Chunk {
        content: String,
    },
    Complete {
        total_content: Option<String>,
        metrics: CompletionMetrics,
    },
    Error {
        message: String,
    },
    Heartbeat,
}

#[derive(Deserialize)]
struct ConnectedBody {
    #[serde(default)]
    channel: Option<String>,
}

#[derive(Deserialize)]
struct ChunkBody {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct CompleteBody {
    #[serde(default)]
    total_content: Option<String>,
    #[serde(flatten)]
    metrics: CompletionMetrics,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl Frame {
    /// Frame kind name as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Connected { .. } => "connected",
            Frame::Chunk { .. } => "chunk",
            Frame::Complete { .. } => "complete",
            Frame::Error { .. } => "error",
            Frame::Heartbeat => "heartbeat",
        }
    }

    /// Decode the JSON payload of a raw frame.
    ///
    /// The kind is `payload.type` when present, else the raw `event:` name.
    /// Returns `Ok(None)` for kinds outside the protocol.
    pub fn from_raw(raw: &RawFrame) -> Result<Option<Frame>, serde_json::Error> {
        let payload: Value = serde_json::from_str(raw.data.trim())?;
        let kind = payload
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or(raw.event.as_str())
            .to_string();
        Self::from_payload(&kind, payload)
    }

    fn from_payload(kind: &str, payload: Value) -> Result<Option<Frame>, serde_json::Error> {
        let frame = match kind {
            "connected" => {
                let body: ConnectedBody = serde_json::from_value(payload)?;
                Frame::Connected {
                    channel: body.channel,
                }
            }
            "chunk" => {
                let body: ChunkBody = serde_json::from_value(payload)?;
                Frame::Chunk {
                    content: body.content.unwrap_or_default(),
                }
            }
            "complete" => {
                let body: CompleteBody = serde_json::from_value(payload)?;
                Frame::Complete {
                    total_content: body.total_content,
                    metrics: body.metrics,
                }
            }
            "error" => {
                let body: ErrorBody = serde_json::from_value(payload)?;
                Frame::Error {
                    message: body
                        .message
                        .or(body.error)
                        .unwrap_or_else(|| "unknown stream error".to_string()),
                }
            }
            "heartbeat" => Frame::Heartbeat,
            _ => return Ok(None),
        };
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(event: &str, data: &str) -> RawFrame {
        RawFrame {
            event: event.to_string(),
            data: data.to_string(),
        }
    }

    #[test]
    fn type_field_wins_over_event_name() {
        let f = Frame::from_raw(&raw("message", r#"{"type":"chunk","content":"Hi"}"#))
            .unwrap()
            .unwrap();
        assert_eq!(
            f,
            Frame::Chunk {
                content: "Hi".to_string()
            }
        );
    }

    #[test]
    fn event_name_used_when_type_absent() {
        let f = Frame::from_raw(&raw("heartbeat", "{}")).unwrap().unwrap();
        assert_eq!(f, Frame::Heartbeat);
    }

    #[test]
    fn complete_carries_metrics() {
        let f = Frame::from_raw(&raw(
            "message",
            r#"{"type":"complete","total_content":"Hello","token_count":12,"response_time":1.5}"#,
        ))
        .unwrap()
        .unwrap();
        match f {
            Frame::Complete {
                total_content,
                metrics,
            } => {
                assert_eq!(total_content.as_deref(), Some("Hello"));
                assert_eq!(metrics.token_count, Some(12));
                assert_eq!(metrics.response_time, Some(1.5));
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn error_message_falls_back_to_error_field() {
        let f = Frame::from_raw(&raw("message", r#"{"type":"error","error":"quota exceeded"}"#))
            .unwrap()
            .unwrap();
        assert_eq!(
            f,
            Frame::Error {
                message: "quota exceeded".to_string()
            }
        );
    }

    #[test]
    fn unknown_kind_is_none() {
        assert!(Frame::from_raw(&raw("message", r#"{"type":"typing"}"#))
            .unwrap()
            .is_none());
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(Frame::from_raw(&raw("message", "{not json")).is_err());
    }
}
