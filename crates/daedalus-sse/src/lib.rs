//! Server-sent event support for Daedalus.
//!
//! This crate provides the [`SseEvent`] wire model and the framing adapter
//! that turns a stream of events into `text/event-stream` bytes.
//!
//! # Example
//!
//! ```rust
//! use daedalus_sse::SseEvent;
//!
//! let event = SseEvent::json(&serde_json::json!({"count": 1}))
//!     .event("update")
//!     .id("1");
//!
//! let frame = event.to_frame();
//! assert!(frame.starts_with("event: update\n"));
//! assert!(frame.ends_with("\n\n"));
//! ```

mod event;
mod stream;

pub use event::{SseComment, SseEvent, SsePayload};
pub use stream::{frame_events, SseFraming};

/// The content type for server-sent event responses.
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";
