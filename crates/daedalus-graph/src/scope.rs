//! Root resolver and per-request scopes.
//!
//! The [`Resolver`] is the process-wide resolution context: singletons are
//! built at startup and released at shutdown, reused nodes memoize here for
//! non-scoped endpoints. A [`Scope`] is the per-request child context: it
//! memoizes reused nodes for the request, enters resources in dependency
//! order, and drains its exit stack in strict LIFO order on every exit
//! path. Dropping an unclosed scope detaches the remaining releases onto
//! the runtime so cancellation cannot leak resources.

use crate::error::ResolveError;
use crate::graph::{Graph, Instance, Lifetime, Provided, Resolved};
use crate::key::TypeKey;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type ExitFn = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

struct ExitEntry {
    label: String,
    run: ExitFn,
}

/// The process-wide resolver.
pub struct Resolver {
    graph: Arc<Graph>,
    cache: Mutex<HashMap<TypeKey, Instance>>,
    releases: Mutex<Vec<ExitEntry>>,
}

impl Resolver {
    /// Creates a resolver over a frozen graph.
    #[must_use]
    pub fn new(graph: Arc<Graph>) -> Self {
        Self {
            graph,
            cache: Mutex::new(HashMap::new()),
            releases: Mutex::new(Vec::new()),
        }
    }

    /// Returns the underlying graph.
    #[must_use]
    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    /// Instantiates every singleton node, in dependency order.
    ///
    /// Called at application startup; a factory failure propagates
    /// verbatim so startup can report it.
    ///
    /// # Errors
    ///
    /// Returns the first construction failure.
    pub async fn start(&self) -> Result<(), ResolveError> {
        let singletons: Vec<TypeKey> = self
            .graph
            .keys()
            .filter(|key| {
                self.graph
                    .node(*key)
                    .is_some_and(|n| n.lifetime() == Lifetime::Singleton)
            })
            .collect();
        for key in singletons {
            self.resolve_key(key).await?;
        }
        Ok(())
    }

    /// Releases singleton resources in reverse construction order.
    pub async fn shutdown(&self) {
        let drained: Vec<ExitEntry> = {
            let mut releases = self.releases.lock();
            releases.drain(..).collect()
        };
        for entry in drained.into_iter().rev() {
            tracing::debug!(resource = %entry.label, "releasing singleton resource");
            (entry.run)().await;
        }
    }

    /// Resolves a node in the process-wide context.
    ///
    /// Non-singleton resources cannot be resolved here; endpoints that
    /// need them are scoped and resolve through a [`Scope`].
    pub fn resolve_key<'a>(
        &'a self,
        key: TypeKey,
    ) -> BoxFuture<'a, Result<Instance, ResolveError>> {
        Box::pin(async move {
            let node = self
                .graph
                .node(key)
                .ok_or_else(|| ResolveError::NotRegistered(key.short_name().to_string()))?;

            if matches!(node.lifetime(), Lifetime::Singleton | Lifetime::Reused) {
                if let Some(cached) = self.cache.lock().get(&key) {
                    return Ok(Arc::clone(cached));
                }
            }
            if node.is_resource() && node.lifetime() != Lifetime::Singleton {
                return Err(ResolveError::ResourceOutsideScope(
                    key.short_name().to_string(),
                ));
            }

            let mut values = HashMap::new();
            for dep in node.deps().to_vec() {
                values.insert(dep, self.resolve_key(dep).await?);
            }
            let provided = self.graph.construct(key, Resolved::new(values)).await?;
            let instance = match provided {
                Provided::Instance(instance) => instance,
                Provided::Resource { instance, release } => {
                    self.releases.lock().push(ExitEntry {
                        label: key.short_name().to_string(),
                        run: Box::new(move || release),
                    });
                    instance
                }
            };

            if matches!(node.lifetime(), Lifetime::Singleton | Lifetime::Reused) {
                let mut cache = self.cache.lock();
                return Ok(Arc::clone(
                    cache.entry(key).or_insert_with(|| Arc::clone(&instance)),
                ));
            }
            Ok(instance)
        })
    }

    /// Resolves a node and downcasts it.
    ///
    /// # Errors
    ///
    /// Fails when the node is unknown, construction fails, or the cached
    /// instance has a different type.
    pub async fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ResolveError> {
        let key = TypeKey::of::<T>();
        let instance = self.resolve_key(key).await?;
        instance
            .downcast::<T>()
            .map_err(|_| ResolveError::TypeMismatch(key.short_name().to_string()))
    }

    /// Opens a fresh request scope.
    #[must_use]
    pub fn scope(self: &Arc<Self>) -> Scope {
        Scope {
            inner: Arc::new(ScopeInner {
                root: Arc::clone(self),
                cache: Mutex::new(HashMap::new()),
                exits: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("graph", &self.graph)
            .field("cached", &self.cache.lock().len())
            .finish()
    }
}

struct ScopeInner {
    root: Arc<Resolver>,
    cache: Mutex<HashMap<TypeKey, Instance>>,
    exits: Mutex<Vec<ExitEntry>>,
    closed: AtomicBool,
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        let exits = std::mem::take(self.exits.get_mut());
        if exits.is_empty() {
            return;
        }
        // Cancellation path: the owning task went away before close() ran.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!(
                    pending = exits.len(),
                    "scope dropped before close; detaching resource releases"
                );
                handle.spawn(async move {
                    for entry in exits.into_iter().rev() {
                        (entry.run)().await;
                    }
                });
            }
            Err(_) => {
                tracing::error!(
                    pending = exits.len(),
                    "scope dropped outside a runtime; resource releases skipped"
                );
            }
        }
    }
}

/// A per-request resolution scope.
///
/// Cloning yields another handle to the same scope, which is how the scope
/// is injected into handlers for exit-callback registration.
///
/// # Example
///
/// ```rust
/// use daedalus_graph::{Graph, Resolver};
/// use std::sync::Arc;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let resolver = Arc::new(Resolver::new(Arc::new(Graph::new())));
/// let scope = resolver.scope();
/// scope.on_exit(|| async { /* flush, disconnect, ... */ });
/// scope.close().await;
/// # });
/// ```
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    /// Resolves a node within this scope.
    ///
    /// Singletons come from the process-wide cache, reused nodes memoize
    /// per-scope, transients are fresh, and resources are entered here
    /// with their release pushed onto the exit stack.
    pub fn resolve_key<'a>(
        &'a self,
        key: TypeKey,
    ) -> BoxFuture<'a, Result<Instance, ResolveError>> {
        Box::pin(async move {
            if self.inner.closed.load(Ordering::Acquire) {
                return Err(ResolveError::Closed);
            }
            let graph = self.inner.root.graph();
            let node = graph
                .node(key)
                .ok_or_else(|| ResolveError::NotRegistered(key.short_name().to_string()))?;

            match node.lifetime() {
                Lifetime::Singleton => return self.inner.root.resolve_key(key).await,
                Lifetime::Reused | Lifetime::Scoped => {
                    if let Some(cached) = self.inner.cache.lock().get(&key) {
                        return Ok(Arc::clone(cached));
                    }
                }
                Lifetime::Transient => {}
            }

            let mut values = HashMap::new();
            for dep in node.deps().to_vec() {
                values.insert(dep, self.resolve_key(dep).await?);
            }
            let provided = graph.construct(key, Resolved::new(values)).await?;
            let instance = match provided {
                Provided::Instance(instance) => instance,
                Provided::Resource { instance, release } => {
                    self.inner.exits.lock().push(ExitEntry {
                        label: key.short_name().to_string(),
                        run: Box::new(move || release),
                    });
                    instance
                }
            };

            if matches!(node.lifetime(), Lifetime::Reused | Lifetime::Scoped) {
                let mut cache = self.inner.cache.lock();
                return Ok(Arc::clone(
                    cache.entry(key).or_insert_with(|| Arc::clone(&instance)),
                ));
            }
            Ok(instance)
        })
    }

    /// Resolves a node and downcasts it.
    ///
    /// # Errors
    ///
    /// Fails when the node is unknown, construction fails, or the cached
    /// instance has a different type.
    pub async fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ResolveError> {
        let key = TypeKey::of::<T>();
        let instance = self.resolve_key(key).await?;
        instance
            .downcast::<T>()
            .map_err(|_| ResolveError::TypeMismatch(key.short_name().to_string()))
    }

    /// Registers a callback to run when the scope unwinds.
    ///
    /// Callbacks share the exit stack with resource releases and run in
    /// strict LIFO order relative to them.
    pub fn on_exit<F, Fut>(&self, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let entry = ExitEntry {
            label: "exit-callback".to_string(),
            run: Box::new(move || Box::pin(callback())),
        };
        if self.inner.closed.load(Ordering::Acquire) {
            tracing::warn!("exit callback registered after close; running detached");
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn((entry.run)());
            }
            return;
        }
        self.inner.exits.lock().push(entry);
    }

    /// Returns `true` once the scope has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Closes the scope, draining the exit stack in reverse entry order.
    ///
    /// Idempotent; later calls are no-ops. Exits run even when the request
    /// failed, and a panicking release never pre-empts the others.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let drained: Vec<ExitEntry> = {
            let mut exits = self.inner.exits.lock();
            exits.drain(..).collect()
        };
        for entry in drained.into_iter().rev() {
            tracing::debug!(resource = %entry.label, "releasing scoped resource");
            (entry.run)().await;
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("closed", &self.is_closed())
            .field("pending_exits", &self.inner.exits.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ReleaseFn;
    use std::sync::Mutex as StdMutex;

    struct Settings;
    struct Counter;
    #[derive(Debug)]
    struct Conn {
        tag: &'static str,
    }

    type Log = Arc<StdMutex<Vec<String>>>;

    fn log_push(log: &Log, entry: impl Into<String>) {
        log.lock().unwrap().push(entry.into());
    }

    fn resolver_with_conn(log: Log) -> Arc<Resolver> {
        let mut graph = Graph::new();
        graph
            .factory(Lifetime::Singleton, &[], |_| async { Ok(Settings) })
            .unwrap();
        let enter_log = Arc::clone(&log);
        graph
            .resource(&[TypeKey::of::<Settings>()], move |_| {
                let log = Arc::clone(&enter_log);
                async move {
                    log_push(&log, "enter:conn");
                    let release_log = Arc::clone(&log);
                    let release: ReleaseFn = Box::pin(async move {
                        log_push(&release_log, "exit:conn");
                    });
                    Ok((Conn { tag: "db" }, release))
                }
            })
            .unwrap();
        Arc::new(Resolver::new(Arc::new(graph)))
    }

    #[tokio::test]
    async fn test_scope_enters_and_releases_in_order() {
        let log: Log = Arc::new(StdMutex::new(Vec::new()));
        let resolver = resolver_with_conn(Arc::clone(&log));

        let scope = resolver.scope();
        let conn = scope.resolve::<Conn>().await.unwrap();
        assert_eq!(conn.tag, "db");
        scope.close().await;

        assert_eq!(*log.lock().unwrap(), vec!["enter:conn", "exit:conn"]);
    }

    #[tokio::test]
    async fn test_scope_release_runs_once() {
        let log: Log = Arc::new(StdMutex::new(Vec::new()));
        let resolver = resolver_with_conn(Arc::clone(&log));

        let scope = resolver.scope();
        scope.resolve::<Conn>().await.unwrap();
        scope.close().await;
        scope.close().await;

        let entries = log.lock().unwrap().clone();
        assert_eq!(entries.iter().filter(|e| *e == "exit:conn").count(), 1);
    }

    #[tokio::test]
    async fn test_scope_memoizes_resources() {
        let log: Log = Arc::new(StdMutex::new(Vec::new()));
        let resolver = resolver_with_conn(Arc::clone(&log));

        let scope = resolver.scope();
        let a = scope.resolve::<Conn>().await.unwrap();
        let b = scope.resolve::<Conn>().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        scope.close().await;

        assert_eq!(*log.lock().unwrap(), vec!["enter:conn", "exit:conn"]);
    }

    #[tokio::test]
    async fn test_exit_callbacks_are_lifo_with_resources() {
        let log: Log = Arc::new(StdMutex::new(Vec::new()));
        let resolver = resolver_with_conn(Arc::clone(&log));

        let scope = resolver.scope();
        scope.resolve::<Conn>().await.unwrap();
        let cb_log = Arc::clone(&log);
        scope.on_exit(move || async move {
            log_push(&cb_log, "exit:callback");
        });
        scope.close().await;

        assert_eq!(
            *log.lock().unwrap(),
            vec!["enter:conn", "exit:callback", "exit:conn"]
        );
    }

    #[tokio::test]
    async fn test_resource_outside_scope_is_rejected() {
        let log: Log = Arc::new(StdMutex::new(Vec::new()));
        let resolver = resolver_with_conn(log);

        let err = resolver.resolve::<Conn>().await.unwrap_err();
        assert!(matches!(err, ResolveError::ResourceOutsideScope(_)));
    }

    #[tokio::test]
    async fn test_reused_memoizes_per_scope() {
        let mut graph = Graph::new();
        graph
            .factory(Lifetime::Reused, &[], |_| async { Ok(Counter) })
            .unwrap();
        let resolver = Arc::new(Resolver::new(Arc::new(graph)));

        let scope_a = resolver.scope();
        let a1 = scope_a.resolve::<Counter>().await.unwrap();
        let a2 = scope_a.resolve::<Counter>().await.unwrap();
        assert!(Arc::ptr_eq(&a1, &a2));

        let scope_b = resolver.scope();
        let b1 = scope_b.resolve::<Counter>().await.unwrap();
        assert!(!Arc::ptr_eq(&a1, &b1));

        scope_a.close().await;
        scope_b.close().await;
    }

    #[tokio::test]
    async fn test_transient_is_fresh_every_time() {
        let mut graph = Graph::new();
        graph
            .factory(Lifetime::Transient, &[], |_| async { Ok(Counter) })
            .unwrap();
        let resolver = Arc::new(Resolver::new(Arc::new(graph)));

        let scope = resolver.scope();
        let a = scope.resolve::<Counter>().await.unwrap();
        let b = scope.resolve::<Counter>().await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        scope.close().await;
    }

    #[tokio::test]
    async fn test_startup_failure_propagates() {
        struct Flaky;

        let mut graph = Graph::new();
        graph
            .factory::<Flaky, _, _>(Lifetime::Singleton, &[], |_| async {
                anyhow::bail!("refused to start")
            })
            .unwrap();
        let resolver = Resolver::new(Arc::new(graph));

        let err = resolver.start().await.unwrap_err();
        match err {
            ResolveError::Factory { name, source } => {
                assert_eq!(name, "Flaky");
                assert!(source.to_string().contains("refused to start"));
            }
            other => panic!("expected factory error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_singleton_resource_released_at_shutdown() {
        let log: Log = Arc::new(StdMutex::new(Vec::new()));

        let mut graph = Graph::new();
        let enter_log = Arc::clone(&log);
        graph
            .resource_with_lifetime(Lifetime::Singleton, &[], move |_| {
                let log = Arc::clone(&enter_log);
                async move {
                    log_push(&log, "enter");
                    let release_log = Arc::clone(&log);
                    let release: ReleaseFn = Box::pin(async move {
                        log_push(&release_log, "exit");
                    });
                    Ok((Conn { tag: "pool" }, release))
                }
            })
            .unwrap();

        let resolver = Resolver::new(Arc::new(graph));
        resolver.start().await.unwrap();
        resolver.shutdown().await;

        assert_eq!(*log.lock().unwrap(), vec!["enter", "exit"]);
    }

    #[tokio::test]
    async fn test_dropped_scope_detaches_releases() {
        let log: Log = Arc::new(StdMutex::new(Vec::new()));
        let resolver = resolver_with_conn(Arc::clone(&log));

        {
            let scope = resolver.scope();
            scope.resolve::<Conn>().await.unwrap();
            // Dropped without close, as a cancelled request would.
        }
        // Let the detached release task run.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(*log.lock().unwrap(), vec!["enter:conn", "exit:conn"]);
    }
}
