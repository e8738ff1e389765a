//! 流水线处理模块：把原始字节流解码为类型化的事件帧。
//!
//! # Frame Pipeline
//!
//! ```text
//! Raw Bytes → EventFrameParser → RawFrame → JSON decode → Frame
//!     │              │                           │
//!   HTTP      blank-line framing,          `type` field or
//!             split-boundary buffering     `event:` name
//! ```
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`EventFrameParser`] | Incremental push parser (bytes in, [`RawFrame`](crate::types::RawFrame)s out) |
//! | [`FrameDecoder`] | Stream adapter from a byte stream to typed [`Frame`](crate::types::Frame)s |
//! | [`decode_frame`] | JSON decode of one raw frame; drops malformed frames |

pub mod decode;


pub use decode::{decode_frame, EventFrameParser, FrameDecoder};
