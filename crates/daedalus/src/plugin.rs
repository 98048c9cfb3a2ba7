//! The plugin contract.
//!
//! A plugin wraps a handler with cross-cutting behaviour. Composition is
//! a left fold: the first plugin listed runs outermost at request time.
//! When route-level and endpoint-level plugin sets are folded together,
//! the merged list is de-duplicated by instance identity, keeping the
//! first occurrence.

use daedalus_core::handler::{handler_fn, ArcHandler};
use daedalus_core::problem::{Problem, ProblemKind};
use daedalus_core::AuthScheme;
use daedalus_graph::Graph;
use daedalus_sig::EndpointSignature;
use std::sync::Arc;
use std::time::Duration;

/// The endpoint descriptor handed to plugins at setup.
#[derive(Clone)]
pub struct EndpointInfo {
    /// The endpoint name.
    pub name: String,
    /// The owning route path.
    pub path: String,
    /// The parsed signature.
    pub signature: Arc<EndpointSignature>,
    /// The application dependency graph.
    pub graph: Arc<Graph>,
}

/// A handler wrapper installed at setup time.
///
/// `install` receives the endpoint descriptor and the next handler in the
/// chain, and returns an async callable with the same shape.
pub trait Plugin: Send + Sync {
    /// Wraps the next handler.
    fn install(&self, info: &EndpointInfo, next: ArcHandler) -> ArcHandler;
}

/// A shareable plugin instance.
pub type ArcPlugin = Arc<dyn Plugin>;

/// Folds plugins around a handler; the first plugin runs outermost.
#[must_use]
pub fn compose(plugins: &[ArcPlugin], info: &EndpointInfo, handler: ArcHandler) -> ArcHandler {
    let mut wrapped = handler;
    for plugin in plugins.iter().rev() {
        wrapped = plugin.install(info, wrapped);
    }
    wrapped
}

/// Removes duplicate plugin instances, keeping the first occurrence.
#[must_use]
pub fn dedup(plugins: Vec<ArcPlugin>) -> Vec<ArcPlugin> {
    let mut unique: Vec<ArcPlugin> = Vec::with_capacity(plugins.len());
    for plugin in plugins {
        if !unique.iter().any(|seen| Arc::ptr_eq(seen, &plugin)) {
            unique.push(plugin);
        }
    }
    unique
}

/// Cancels the handler when it exceeds a deadline, answering 504.
///
/// The handler future is dropped on timeout; scoped resources still
/// release before the timeout response is written.
pub struct TimeoutPlugin {
    timeout: Duration,
}

impl TimeoutPlugin {
    /// Creates a timeout plugin.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Plugin for TimeoutPlugin {
    fn install(&self, _info: &EndpointInfo, next: ArcHandler) -> ArcHandler {
        let timeout = self.timeout;
        handler_fn(move |args| {
            let next = Arc::clone(&next);
            async move {
                match tokio::time::timeout(timeout, next.call(args)).await {
                    Ok(result) => result,
                    Err(_) => Err(Problem::new(ProblemKind::Timeout)
                        .with_detail(format!("handler exceeded {}ms", timeout.as_millis()))
                        .into()),
                }
            }
        })
    }
}

/// The precondition installed by an `auth_scheme` property.
///
/// Rejects requests whose `Authorization` header is absent or of the
/// wrong scheme with `401` and a `WWW-Authenticate` challenge.
pub struct AuthGuard {
    scheme: AuthScheme,
}

impl AuthGuard {
    /// Creates a guard for a scheme.
    #[must_use]
    pub fn new(scheme: AuthScheme) -> Self {
        Self { scheme }
    }
}

impl Plugin for AuthGuard {
    fn install(&self, _info: &EndpointInfo, next: ArcHandler) -> ArcHandler {
        let scheme = self.scheme;
        handler_fn(move |args| {
            let next = Arc::clone(&next);
            async move {
                match args.meta().header("authorization") {
                    Some(credentials) if scheme.accepts(credentials) => next.call(args).await,
                    _ => Err(scheme.unauthorized().into()),
                }
            }
        })
    }
}
