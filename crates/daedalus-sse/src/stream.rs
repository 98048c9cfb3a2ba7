//! Stream framing for SSE responses.

use crate::event::SseEvent;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;

/// How individual events of a stream are framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SseFraming {
    /// Standard `text/event-stream` framing, one frame per event.
    #[default]
    EventStream,
}

/// Adapts a stream of events into a stream of wire frames.
///
/// Each event becomes one `Bytes` chunk containing the full frame,
/// terminated by the empty line.
pub fn frame_events(
    events: BoxStream<'static, SseEvent>,
    _framing: SseFraming,
) -> BoxStream<'static, Bytes> {
    events.map(|event| event.to_bytes()).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[tokio::test]
    async fn test_frame_events_preserves_order() {
        let events = stream::iter(vec![
            SseEvent::empty().event("start"),
            SseEvent::json(&serde_json::json!({"count": 0}))
                .event("update")
                .id("0"),
            SseEvent::empty().event("close").id("final"),
        ])
        .boxed();

        let frames: Vec<Bytes> = frame_events(events, SseFraming::EventStream)
            .collect()
            .await;

        assert_eq!(frames[0], Bytes::from("event: start\n\n"));
        assert_eq!(
            frames[1],
            Bytes::from("event: update\nid: 0\ndata: {\"count\":0}\n\n")
        );
        assert_eq!(frames[2], Bytes::from("event: close\nid: final\n\n"));
    }
}
