//! The lifespan protocol driver.
//!
//! Startup and shutdown are delivered to the application as messages on a
//! dedicated lifespan connection; the application acknowledges each with
//! a complete or failed message. Startup failures propagate verbatim so
//! the process can refuse to serve.

use crate::boundary::{BufferTransmit, ConnScope, Inbound, Outbound, QueueReceive, Service};
use thiserror::Error;

/// A lifespan acknowledgment failure.
#[derive(Debug, Error)]
pub enum LifespanError {
    /// The application reported a startup failure.
    #[error("startup failed: {0}")]
    StartupFailed(String),
    /// The application reported a shutdown failure.
    #[error("shutdown failed: {0}")]
    ShutdownFailed(String),
    /// The application never acknowledged the message.
    #[error("lifespan message was not acknowledged")]
    NotAcknowledged,
}

/// Sends the startup message and awaits the acknowledgment.
///
/// # Errors
///
/// Returns the application's failure message verbatim, or an error when
/// no acknowledgment arrived.
pub async fn run_startup<S: Service>(service: &S) -> Result<(), LifespanError> {
    let mut receive = QueueReceive::new([Inbound::Startup]);
    let mut transmit = BufferTransmit::new();
    service
        .call(ConnScope::lifespan(), &mut receive, &mut transmit)
        .await;

    match transmit.messages.first() {
        Some(Outbound::StartupComplete) => Ok(()),
        Some(Outbound::StartupFailed { message }) => {
            Err(LifespanError::StartupFailed(message.clone()))
        }
        _ => Err(LifespanError::NotAcknowledged),
    }
}

/// Sends the shutdown message and awaits the acknowledgment.
///
/// # Errors
///
/// Returns the application's failure message, or an error when no
/// acknowledgment arrived.
pub async fn run_shutdown<S: Service>(service: &S) -> Result<(), LifespanError> {
    let mut receive = QueueReceive::new([Inbound::Shutdown]);
    let mut transmit = BufferTransmit::new();
    service
        .call(ConnScope::lifespan(), &mut receive, &mut transmit)
        .await;

    match transmit.messages.first() {
        Some(Outbound::ShutdownComplete) => Ok(()),
        Some(Outbound::ShutdownFailed { message }) => {
            Err(LifespanError::ShutdownFailed(message.clone()))
        }
        _ => Err(LifespanError::NotAcknowledged),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{Receive, Transmit, TransportError};
    use futures_util::future::BoxFuture;

    struct AckService {
        fail_startup: bool,
    }

    impl Service for AckService {
        fn call<'a>(
            &'a self,
            _scope: ConnScope,
            receive: &'a mut dyn Receive,
            transmit: &'a mut dyn Transmit,
        ) -> BoxFuture<'a, ()> {
            Box::pin(async move {
                match receive.next().await {
                    Ok(Inbound::Startup) => {
                        let ack = if self.fail_startup {
                            Outbound::StartupFailed {
                                message: "database refused".to_string(),
                            }
                        } else {
                            Outbound::StartupComplete
                        };
                        let _ = transmit.send(ack).await;
                    }
                    Ok(Inbound::Shutdown) => {
                        let _ = transmit.send(Outbound::ShutdownComplete).await;
                    }
                    Ok(_) | Err(TransportError::Closed | TransportError::Failed(_)) => {}
                }
            })
        }
    }

    #[tokio::test]
    async fn test_startup_complete() {
        let service = AckService { fail_startup: false };
        run_startup(&service).await.unwrap();
        run_shutdown(&service).await.unwrap();
    }

    #[tokio::test]
    async fn test_startup_failure_propagates_message() {
        let service = AckService { fail_startup: true };
        let err = run_startup(&service).await.unwrap_err();
        assert!(err.to_string().contains("database refused"));
    }
}
