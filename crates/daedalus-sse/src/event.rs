//! SSE event types.
//!
//! An event carries an optional `event:` name, `id:`, `retry:` hint, and a
//! payload rendered as one `data:` line per payload line. Events without a
//! payload render no `data:` line at all, which is valid for marker events
//! such as a terminal `close`.

use serde::Serialize;
use std::time::Duration;

/// The payload of an SSE event.
///
/// Text payloads are written verbatim; multi-line text is split on `\n`
/// into one `data:` line per source line, preserving order. Any other
/// payload is carried as compact JSON on a single `data:` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsePayload {
    /// A textual payload, possibly multi-line.
    Text(String),
    /// A structured payload, encoded as compact JSON.
    Json(serde_json::Value),
}

impl SsePayload {
    fn write_data_lines(&self, out: &mut String) {
        match self {
            Self::Text(text) => {
                for line in text.split('\n') {
                    out.push_str("data: ");
                    out.push_str(line);
                    out.push('\n');
                }
            }
            Self::Json(value) => {
                out.push_str("data: ");
                // Compact encoding of a Value cannot fail.
                out.push_str(&value.to_string());
                out.push('\n');
            }
        }
    }
}

/// A single server-sent event.
///
/// # Example
///
/// ```rust
/// use daedalus_sse::SseEvent;
///
/// let event = SseEvent::text("tick").event("clock").id("7");
/// assert_eq!(event.to_frame(), "event: clock\nid: 7\ndata: tick\n\n");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    event: Option<String>,
    id: Option<String>,
    retry: Option<Duration>,
    data: Option<SsePayload>,
}

impl SseEvent {
    /// Creates an event with no payload.
    ///
    /// Useful for marker events that carry only an `event:` name or `id:`.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates an event with a textual payload.
    #[must_use]
    pub fn text(data: impl Into<String>) -> Self {
        Self {
            data: Some(SsePayload::Text(data.into())),
            ..Self::default()
        }
    }

    /// Creates an event carrying a serializable value as compact JSON.
    #[must_use]
    pub fn json<T: Serialize>(value: &T) -> Self {
        let payload = serde_json::to_value(value)
            .map(SsePayload::Json)
            .unwrap_or_else(|e| SsePayload::Text(e.to_string()));
        Self {
            data: Some(payload),
            ..Self::default()
        }
    }

    /// Sets the `event:` name.
    #[must_use]
    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Sets the `id:` field.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the `retry:` reconnection hint.
    #[must_use]
    pub fn retry(mut self, retry: Duration) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Returns the event name, if set.
    #[must_use]
    pub fn event_name(&self) -> Option<&str> {
        self.event.as_deref()
    }

    /// Returns the event id, if set.
    #[must_use]
    pub fn id_value(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Returns the payload, if any.
    #[must_use]
    pub fn payload(&self) -> Option<&SsePayload> {
        self.data.as_ref()
    }

    /// Renders the event as a wire frame.
    ///
    /// The frame consists of the optional `event:`, `id:` and `retry:`
    /// lines, the `data:` lines, and a terminating empty line.
    #[must_use]
    pub fn to_frame(&self) -> String {
        let mut out = String::new();
        if let Some(event) = &self.event {
            out.push_str("event: ");
            out.push_str(event);
            out.push('\n');
        }
        if let Some(id) = &self.id {
            out.push_str("id: ");
            out.push_str(id);
            out.push('\n');
        }
        if let Some(retry) = &self.retry {
            out.push_str("retry: ");
            out.push_str(&retry.as_millis().to_string());
            out.push('\n');
        }
        if let Some(data) = &self.data {
            data.write_data_lines(&mut out);
        }
        out.push('\n');
        out
    }

    /// Renders the event as bytes ready to send.
    #[must_use]
    pub fn to_bytes(&self) -> bytes::Bytes {
        bytes::Bytes::from(self.to_frame())
    }
}

impl From<String> for SseEvent {
    fn from(data: String) -> Self {
        Self::text(data)
    }
}

impl From<&str> for SseEvent {
    fn from(data: &str) -> Self {
        Self::text(data)
    }
}

/// A comment line, used as a keepalive ping.
///
/// Comments start with a colon and are ignored by clients.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseComment(String);

impl SseComment {
    /// Creates a comment with the given text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Creates an empty keepalive comment.
    #[must_use]
    pub fn keepalive() -> Self {
        Self::default()
    }

    /// Renders the comment as a wire line.
    #[must_use]
    pub fn to_frame(&self) -> String {
        format!(": {}\n", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_event_frame() {
        let event = SseEvent::text("hello");
        assert_eq!(event.to_frame(), "data: hello\n\n");
    }

    #[test]
    fn test_full_event_frame() {
        let event = SseEvent::text("hello")
            .event("greeting")
            .id("1")
            .retry(Duration::from_secs(3));
        let frame = event.to_frame();
        assert_eq!(
            frame,
            "event: greeting\nid: 1\nretry: 3000\ndata: hello\n\n"
        );
    }

    #[test]
    fn test_multiline_data_splits() {
        let event = SseEvent::text("line1\nline2\nline3");
        let frame = event.to_frame();
        assert_eq!(frame, "data: line1\ndata: line2\ndata: line3\n\n");
    }

    #[test]
    fn test_json_payload_is_compact() {
        let event = SseEvent::json(&serde_json::json!({"count": 2}));
        assert_eq!(event.to_frame(), "data: {\"count\":2}\n\n");
    }

    #[test]
    fn test_empty_event_has_no_data_line() {
        let event = SseEvent::empty().event("close").id("final");
        assert_eq!(event.to_frame(), "event: close\nid: final\n\n");
    }

    #[test]
    fn test_comment_frame() {
        assert_eq!(SseComment::keepalive().to_frame(), ": \n");
        assert_eq!(SseComment::new("ping").to_frame(), ": ping\n");
    }

    #[test]
    fn test_from_str() {
        let event: SseEvent = "hi".into();
        assert_eq!(event.payload(), Some(&SsePayload::Text("hi".into())));
    }
}
