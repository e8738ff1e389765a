//! 类型系统模块：事件帧、请求载荷与后台任务的核心数据类型。
//!
//! # Types Module
//!
//! Strongly-typed representations of everything that crosses the wire.
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`RawFrame`] | One `event:`/`data:` block as split by the frame parser |
//! | [`Frame`] | Typed frame decoded from the JSON `data` payload |
//! | [`ChatPayload`] | The message/model pair a session sends (and resends) |
//! | [`TaskSnapshot`] | One observation of a background task's status |
//!
//! ## Submodules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`events`] | Raw and typed event stream frames |
//! | [`payload`] | Request bodies for the streaming and JSON endpoints |
//! | [`task`] | Background task status types |

pub mod events;
pub mod payload;
pub mod task;

pub use events::{CompletionMetrics, Frame, RawFrame};
pub use payload::{ChatPayload, StreamRequest};
pub use task::{TaskOrResult, TaskProgress, TaskSnapshot, TaskStatus};
