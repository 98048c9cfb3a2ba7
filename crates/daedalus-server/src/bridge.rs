//! Hyper bridge.
//!
//! Accepts TCP connections, translates each Hyper request into boundary
//! messages, drives the application callable, and streams the outbound
//! messages back as the Hyper response. Startup runs before the first
//! accept; a Ctrl-C triggers the lifespan shutdown.

use crate::boundary::{ConnScope, Outbound, QueueReceive, Service, Transmit, TransportError};
use crate::lifespan::{run_shutdown, run_startup};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

type HyperResponse = hyper::Response<BoxBody<Bytes, Infallible>>;

struct ChannelTransmit {
    tx: mpsc::Sender<Outbound>,
}

impl Transmit for ChannelTransmit {
    fn send(&mut self, message: Outbound) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.tx
                .send(message)
                .await
                .map_err(|_| TransportError::Closed)
        })
    }
}

fn plain_response(status: http::StatusCode, body: &'static str) -> HyperResponse {
    let mut response = hyper::Response::new(Full::new(Bytes::from_static(body.as_bytes())).boxed());
    *response.status_mut() = status;
    response
}

async fn handle_request<S: Service + 'static>(
    service: Arc<S>,
    request: hyper::Request<Incoming>,
) -> Result<HyperResponse, Infallible> {
    let (parts, body) = request.into_parts();
    let headers: Vec<(Bytes, Bytes)> = parts
        .headers
        .iter()
        .map(|(name, value)| {
            (
                Bytes::copy_from_slice(name.as_str().as_bytes()),
                Bytes::copy_from_slice(value.as_bytes()),
            )
        })
        .collect();
    let scope = ConnScope::http(
        parts.method,
        parts.uri.path().to_string(),
        parts.uri.query().map(ToString::to_string),
        headers,
    );

    let collected = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            tracing::debug!(error = %e, "failed to read request body");
            return Ok(plain_response(http::StatusCode::BAD_REQUEST, "bad request"));
        }
    };

    let (tx, mut rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let mut receive = QueueReceive::single_body(collected);
        let mut transmit = ChannelTransmit { tx };
        service.call(scope, &mut receive, &mut transmit).await;
    });

    let Some(Outbound::Start { status, headers }) = rx.recv().await else {
        return Ok(plain_response(
            http::StatusCode::INTERNAL_SERVER_ERROR,
            "application produced no response",
        ));
    };

    let chunks = futures_util::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Some(Outbound::Body { body, more_body }) => {
                    if body.is_empty() {
                        if more_body {
                            continue;
                        }
                        return None;
                    }
                    return Some((Ok::<_, Infallible>(Frame::data(body)), rx));
                }
                Some(_) | None => return None,
            }
        }
    });

    let mut builder = hyper::Response::builder().status(status);
    for (name, value) in headers {
        builder = builder.header(name.as_ref(), value.as_ref());
    }
    let response = builder
        .body(StreamBody::new(chunks).boxed())
        .unwrap_or_else(|_| {
            plain_response(
                http::StatusCode::INTERNAL_SERVER_ERROR,
                "invalid response head",
            )
        });
    Ok(response)
}

/// The TCP server driving an application callable.
///
/// # Example
///
/// ```rust,ignore
/// use daedalus_server::Server;
///
/// let server = Server::new("127.0.0.1:8000".parse()?, app);
/// server.run().await?;
/// ```
pub struct Server<S> {
    addr: SocketAddr,
    service: Arc<S>,
}

impl<S: Service + 'static> Server<S> {
    /// Creates a server for an address and application.
    #[must_use]
    pub fn new(addr: SocketAddr, service: S) -> Self {
        Self {
            addr,
            service: Arc::new(service),
        }
    }

    /// Runs startup, serves until Ctrl-C, then runs shutdown.
    ///
    /// # Errors
    ///
    /// Fails when the listener cannot bind or startup is refused.
    pub async fn run(self) -> anyhow::Result<()> {
        run_startup(&*self.service).await?;

        let listener = TcpListener::bind(self.addr).await?;
        tracing::info!(addr = %self.addr, "listening");

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    tracing::debug!(peer = %peer, "connection accepted");
                    let service = Arc::clone(&self.service);
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let served = http1::Builder::new()
                            .serve_connection(
                                io,
                                service_fn(move |request| {
                                    handle_request(Arc::clone(&service), request)
                                }),
                            )
                            .await;
                        if let Err(e) = served {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown signal received");
                    break;
                }
            }
        }

        if let Err(e) = run_shutdown(&*self.service).await {
            tracing::warn!(error = %e, "lifespan shutdown reported failure");
        }
        Ok(())
    }
}
