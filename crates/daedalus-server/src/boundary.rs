//! Boundary message shapes and endpoint traits.

use bytes::Bytes;
use daedalus_core::response::{Response, ResponseBody};
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use http::{HeaderMap, Method, StatusCode};
use std::collections::VecDeque;
use thiserror::Error;
use tokio::sync::mpsc;

/// The kind of connection a scope describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnKind {
    /// A plain HTTP exchange.
    Http,
    /// A websocket upgrade.
    WebSocket,
    /// The application lifecycle pseudo-connection.
    Lifespan,
}

/// The immutable description of one connection.
#[derive(Debug, Clone)]
pub struct ConnScope {
    /// The connection kind.
    pub kind: ConnKind,
    /// The HTTP method; absent for lifespan scopes.
    pub method: Option<Method>,
    /// The request path.
    pub path: String,
    /// The raw query string, if any.
    pub query_string: Option<String>,
    /// Raw header pairs in wire order.
    pub headers: Vec<(Bytes, Bytes)>,
}

impl ConnScope {
    /// Builds an HTTP scope.
    #[must_use]
    pub fn http(
        method: Method,
        path: impl Into<String>,
        query_string: Option<String>,
        headers: Vec<(Bytes, Bytes)>,
    ) -> Self {
        Self {
            kind: ConnKind::Http,
            method: Some(method),
            path: path.into(),
            query_string,
            headers,
        }
    }

    /// Builds the lifespan scope.
    #[must_use]
    pub fn lifespan() -> Self {
        Self {
            kind: ConnKind::Lifespan,
            method: None,
            path: String::new(),
            query_string: None,
            headers: Vec::new(),
        }
    }

    /// Converts the raw header pairs into a typed header map.
    #[must_use]
    pub fn header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                http::header::HeaderName::from_bytes(name),
                http::header::HeaderValue::from_bytes(value),
            ) {
                map.append(name, value);
            }
        }
        map
    }
}

/// Messages arriving from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A request body chunk; `more_body` signals continuation.
    Body {
        /// The chunk bytes.
        body: Bytes,
        /// Whether more chunks follow.
        more_body: bool,
    },
    /// The client went away.
    Disconnect,
    /// Lifespan startup request.
    Startup,
    /// Lifespan shutdown request.
    Shutdown,
}

/// Messages handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// The response head.
    Start {
        /// The response status.
        status: StatusCode,
        /// Raw header pairs in wire order.
        headers: Vec<(Bytes, Bytes)>,
    },
    /// A response body chunk; `more_body` signals continuation.
    Body {
        /// The chunk bytes.
        body: Bytes,
        /// Whether more chunks follow.
        more_body: bool,
    },
    /// Startup finished successfully.
    StartupComplete,
    /// Startup failed; the message propagates verbatim.
    StartupFailed {
        /// The failure text.
        message: String,
    },
    /// Shutdown finished successfully.
    ShutdownComplete,
    /// Shutdown failed.
    ShutdownFailed {
        /// The failure text.
        message: String,
    },
}

/// A transport-side failure.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer is gone; no further messages flow.
    #[error("transport closed")]
    Closed,
    /// Any other transport failure.
    #[error("transport failure: {0}")]
    Failed(String),
}

/// The receive side of a connection.
pub trait Receive: Send {
    /// Awaits the next inbound message.
    fn next(&mut self) -> BoxFuture<'_, Result<Inbound, TransportError>>;
}

/// The send side of a connection.
pub trait Transmit: Send {
    /// Delivers one outbound message.
    fn send(&mut self, message: Outbound) -> BoxFuture<'_, Result<(), TransportError>>;
}

/// The application callable the transport drives.
pub trait Service: Send + Sync {
    /// Serves one connection to completion.
    fn call<'a>(
        &'a self,
        scope: ConnScope,
        receive: &'a mut dyn Receive,
        transmit: &'a mut dyn Transmit,
    ) -> BoxFuture<'a, ()>;
}

/// A receive side fed from a fixed message queue; used by tests and the
/// lifespan driver.
#[derive(Debug, Default)]
pub struct QueueReceive {
    queue: VecDeque<Inbound>,
}

impl QueueReceive {
    /// Creates a queue from messages delivered in order.
    #[must_use]
    pub fn new(messages: impl IntoIterator<Item = Inbound>) -> Self {
        Self {
            queue: messages.into_iter().collect(),
        }
    }

    /// A queue delivering one full request body.
    #[must_use]
    pub fn single_body(body: Bytes) -> Self {
        Self::new([Inbound::Body {
            body,
            more_body: false,
        }])
    }
}

impl Receive for QueueReceive {
    fn next(&mut self) -> BoxFuture<'_, Result<Inbound, TransportError>> {
        let message = self.queue.pop_front();
        Box::pin(async move { message.ok_or(TransportError::Closed) })
    }
}

/// A receive side fed from an async channel; used by the Hyper bridge.
#[derive(Debug)]
pub struct ChannelReceive {
    rx: mpsc::Receiver<Inbound>,
}

impl ChannelReceive {
    /// Wraps a channel receiver.
    #[must_use]
    pub fn new(rx: mpsc::Receiver<Inbound>) -> Self {
        Self { rx }
    }
}

impl Receive for ChannelReceive {
    fn next(&mut self) -> BoxFuture<'_, Result<Inbound, TransportError>> {
        Box::pin(async move { self.rx.recv().await.ok_or(TransportError::Closed) })
    }
}

/// A transmit side that buffers everything; used by tests and lifespan.
#[derive(Debug, Default)]
pub struct BufferTransmit {
    /// The messages sent so far, in order.
    pub messages: Vec<Outbound>,
}

impl BufferTransmit {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transmit for BufferTransmit {
    fn send(&mut self, message: Outbound) -> BoxFuture<'_, Result<(), TransportError>> {
        self.messages.push(message);
        Box::pin(async { Ok(()) })
    }
}

/// Writes a framework response through a transmit side.
///
/// Sends the start message, then the body: empty bodies close with a
/// single empty chunk, buffered bodies with one chunk, and streams chunk
/// by chunk with `more_body` until exhausted.
///
/// # Errors
///
/// Propagates the first transport failure.
pub async fn write_response(
    transmit: &mut dyn Transmit,
    response: Response,
) -> Result<(), TransportError> {
    let (status, headers, body) = response.into_parts();
    let header_pairs: Vec<(Bytes, Bytes)> = headers
        .iter()
        .map(|(name, value)| {
            (
                Bytes::copy_from_slice(name.as_str().as_bytes()),
                Bytes::copy_from_slice(value.as_bytes()),
            )
        })
        .collect();
    transmit
        .send(Outbound::Start {
            status,
            headers: header_pairs,
        })
        .await?;

    match body {
        ResponseBody::Empty => {
            transmit
                .send(Outbound::Body {
                    body: Bytes::new(),
                    more_body: false,
                })
                .await
        }
        ResponseBody::Full(bytes) => {
            transmit
                .send(Outbound::Body {
                    body: bytes,
                    more_body: false,
                })
                .await
        }
        ResponseBody::Stream(mut chunks) => {
            while let Some(chunk) = chunks.next().await {
                if chunk.is_empty() {
                    continue;
                }
                transmit
                    .send(Outbound::Body {
                        body: chunk,
                        more_body: true,
                    })
                    .await?;
            }
            transmit
                .send(Outbound::Body {
                    body: Bytes::new(),
                    more_body: false,
                })
                .await
        }
    }
}
