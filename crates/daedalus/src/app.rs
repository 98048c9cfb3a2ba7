//! The application: deferred setup and the transport callable.
//!
//! Routes, dependency factories, event listeners, and problem solvers are
//! registered in any order; nothing is analysed until [`App::setup`]
//! runs. Setup freezes the graph, parses every endpoint signature,
//! computes dependency plans, and builds the router. After setup the
//! application is an async callable over the transport boundary:
//! lifespan connections drive singleton startup and shutdown, HTTP
//! connections dispatch through the router into the endpoint runtime.

use crate::endpoint::{Endpoint, Provider, ProviderMap};
use crate::route::{Route, RouteProps};
use bytes::{Bytes, BytesMut};
use daedalus_config::AppConfig;
use daedalus_core::problem::{Problem, ProblemKind};
use daedalus_core::{EventRegistry, ProblemMapper, RequestMeta, Response, SyncExecutor};
use daedalus_extract::{full_body, RequestParts};
use daedalus_graph::{Graph, Resolver, TypeKey};
use daedalus_router::{PathRouter, RouteMethod, RouteOutcome};
use daedalus_server::{
    write_response, ConnKind, ConnScope, Inbound, Outbound, Receive, Service, Transmit,
    TransportError,
};
use daedalus_sig::SetupError;
use futures_util::future::BoxFuture;
use http::{Method, StatusCode, Uri};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

struct FrozenApp {
    router: PathRouter<Arc<Endpoint>>,
    resolver: Arc<Resolver>,
    mapper: Arc<ProblemMapper>,
    fingerprints: Vec<(String, String)>,
}

/// The Daedalus application.
///
/// # Example
///
/// ```rust
/// use daedalus::prelude::*;
///
/// let mut app = App::new();
/// app.route("/ping").get(endpoint("ping", |_args| async {
///     Reply::json(&serde_json::json!({"pong": true}))
/// }));
/// app.setup().unwrap();
/// ```
pub struct App {
    root: Route,
    graph: Graph,
    events: EventRegistry,
    mapper: ProblemMapper,
    config: AppConfig,
    providers: HashMap<TypeKey, Provider>,
    frozen: Option<Arc<FrozenApp>>,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    /// Creates an application with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    /// Creates an application with explicit configuration.
    #[must_use]
    pub fn with_config(config: AppConfig) -> Self {
        let mapper = ProblemMapper::new().verbose(config.problems.verbose);
        Self {
            root: Route::new("/"),
            graph: Graph::new(),
            events: EventRegistry::new(),
            mapper,
            config,
            providers: HashMap::new(),
            frozen: None,
        }
    }

    /// Returns the route for a path, creating it on first use.
    pub fn route(&mut self, path: &str) -> &mut Route {
        self.frozen = None;
        self.root.sub(path)
    }

    /// Returns the dependency graph for registrations.
    pub fn graph_mut(&mut self) -> &mut Graph {
        self.frozen = None;
        &mut self.graph
    }

    /// Returns the event registry for declarations and listeners.
    pub fn events_mut(&mut self) -> &mut EventRegistry {
        self.frozen = None;
        &mut self.events
    }

    /// Returns the problem mapper for solver registrations.
    pub fn mapper_mut(&mut self) -> &mut ProblemMapper {
        self.frozen = None;
        &mut self.mapper
    }

    /// Registers a request-time provider for a nominal parameter type.
    pub fn provider<T, F>(&mut self, provide: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&RequestParts) -> Result<Arc<T>, Problem> + Send + Sync + 'static,
    {
        let provider: Provider = Arc::new(move |parts| {
            provide(parts).map(|value| value as Arc<dyn Any + Send + Sync>)
        });
        self.providers.insert(TypeKey::of::<T>(), provider);
        self.frozen = None;
    }

    /// Analyses every registration and freezes the application.
    ///
    /// Idempotent: running setup again over the same registrations yields
    /// equal signatures and the same dependency plans.
    ///
    /// # Errors
    ///
    /// Fails on any signature, return, or dependency-graph error.
    pub fn setup(&mut self) -> Result<(), SetupError> {
        let mut merged_graph = self.graph.clone();
        self.root.collect_graph(&mut merged_graph)?;
        let graph = Arc::new(merged_graph);
        let resolver = Arc::new(Resolver::new(Arc::clone(&graph)));
        let busterm = self.events.clone().freeze();
        let mapper = Arc::new(self.mapper.clone());
        let providers: ProviderMap = Arc::new(self.providers.clone());
        let executor = SyncExecutor::new(self.config.runtime.sync_workers);
        let limits = self.config.limits.clone();

        let mut router = PathRouter::new();
        let mut fingerprints = Vec::new();
        for (path, method, def) in self.root.collect(&RouteProps::default()) {
            let endpoint = Endpoint::setup(
                &def,
                &path,
                &method,
                &graph,
                Arc::clone(&resolver),
                busterm.clone(),
                Arc::clone(&mapper),
                Arc::clone(&providers),
                limits.clone(),
                &executor,
            )?;
            fingerprints.push((
                format!("{method} {path}"),
                endpoint.signature().fingerprint(),
            ));
            if router.insert(&path, method.clone(), Arc::new(endpoint)).is_some() {
                tracing::warn!(path = %path, method = %method, "endpoint replaced at setup");
            }
        }

        self.frozen = Some(Arc::new(FrozenApp {
            router,
            resolver,
            mapper,
            fingerprints,
        }));
        Ok(())
    }

    /// Returns `true` once setup has run.
    #[must_use]
    pub fn is_setup(&self) -> bool {
        self.frozen.is_some()
    }

    /// Returns the per-endpoint signature fingerprints computed at setup.
    #[must_use]
    pub fn signature_fingerprints(&self) -> Vec<(String, String)> {
        self.frozen
            .as_ref()
            .map(|f| f.fingerprints.clone())
            .unwrap_or_default()
    }

    async fn serve_lifespan(&self, receive: &mut dyn Receive, transmit: &mut dyn Transmit) {
        loop {
            match receive.next().await {
                Ok(Inbound::Startup) => {
                    let ack = match &self.frozen {
                        Some(frozen) => match frozen.resolver.start().await {
                            Ok(()) => Outbound::StartupComplete,
                            Err(e) => {
                                let chain = anyhow::Error::new(e);
                                Outbound::StartupFailed {
                                    message: format!("{chain:#}"),
                                }
                            }
                        },
                        None => Outbound::StartupFailed {
                            message: "application setup has not run".to_string(),
                        },
                    };
                    if transmit.send(ack).await.is_err() {
                        break;
                    }
                }
                Ok(Inbound::Shutdown) => {
                    if let Some(frozen) = &self.frozen {
                        frozen.resolver.shutdown().await;
                    }
                    let _ = transmit.send(Outbound::ShutdownComplete).await;
                    break;
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    }

    async fn serve_http(
        &self,
        scope: ConnScope,
        receive: &mut dyn Receive,
        transmit: &mut dyn Transmit,
    ) {
        let Some(frozen) = &self.frozen else {
            let response = Response::text(
                StatusCode::INTERNAL_SERVER_ERROR,
                "application setup has not run",
            );
            let _ = write_response(transmit, response).await;
            return;
        };

        let method = scope.method.clone().unwrap_or(Method::GET);
        let route_method = match scope.kind {
            ConnKind::WebSocket => RouteMethod::Upgrade,
            _ => RouteMethod::Http(method.clone()),
        };
        let headers = scope.header_map();
        let uri = assemble_uri(&scope.path, scope.query_string.as_deref());

        let response = match frozen.router.at(&scope.path, &route_method) {
            RouteOutcome::Matched { value, params } => {
                let endpoint = Arc::clone(value);
                let parts = RequestParts::new(method, uri, headers, params);
                match read_body(receive).await {
                    Ok(body) => endpoint.dispatch(parts, full_body(body)).await,
                    Err(()) => return,
                }
            }
            RouteOutcome::MethodMismatch { allow } => {
                let meta = RequestMeta::new(method, scope.path.clone(), headers);
                let problem = Problem::new(ProblemKind::MethodNotAllowed)
                    .with_header("allow", &allow.join(", "));
                frozen.mapper.respond(&meta, &problem)
            }
            RouteOutcome::NotFound => {
                let meta = RequestMeta::new(method, scope.path.clone(), headers);
                let problem = Problem::new(ProblemKind::NotFound)
                    .with_detail(format!("no route matches {}", scope.path));
                frozen.mapper.respond(&meta, &problem)
            }
        };

        if let Err(e) = write_response(transmit, response).await {
            tracing::debug!(error = %e, "client went away mid-response");
        }
    }
}

fn assemble_uri(path: &str, query: Option<&str>) -> Uri {
    let raw = match query {
        Some(query) if !query.is_empty() => format!("{path}?{query}"),
        _ => path.to_string(),
    };
    raw.parse().unwrap_or_else(|_| Uri::from_static("/"))
}

async fn read_body(receive: &mut dyn Receive) -> Result<Bytes, ()> {
    let mut buffer = BytesMut::new();
    loop {
        match receive.next().await {
            Ok(Inbound::Body { body, more_body }) => {
                buffer.extend_from_slice(&body);
                if !more_body {
                    break;
                }
            }
            Ok(Inbound::Disconnect) => return Err(()),
            Err(TransportError::Closed) => break,
            Ok(_) | Err(TransportError::Failed(_)) => break,
        }
    }
    Ok(buffer.freeze())
}

impl Service for App {
    fn call<'a>(
        &'a self,
        scope: ConnScope,
        receive: &'a mut dyn Receive,
        transmit: &'a mut dyn Transmit,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            match scope.kind {
                ConnKind::Lifespan => self.serve_lifespan(receive, transmit).await,
                ConnKind::Http | ConnKind::WebSocket => {
                    self.serve_http(scope, receive, transmit).await;
                }
            }
        })
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("graph", &self.graph)
            .field("setup", &self.is_setup())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::endpoint;
    use daedalus_core::handler::Reply;
    use daedalus_graph::Lifetime;
    use daedalus_sig::TypeExpr;

    struct Engine;

    fn sample_app() -> App {
        let mut app = App::new();
        app.graph_mut()
            .factory(Lifetime::Reused, &[], |_| async { Ok(Engine) })
            .unwrap();
        app.route("/profile/{pid}").get(
            endpoint("profile", |args| async move {
                let pid: String = args.get("pid")?;
                Reply::json(&serde_json::json!({ "id": pid }))
            })
            .param("pid", TypeExpr::string())
            .param("engine", TypeExpr::of::<Engine>()),
        );
        app
    }

    #[test]
    fn test_setup_is_idempotent() {
        let mut app = sample_app();
        app.setup().unwrap();
        let first = app.signature_fingerprints();
        app.setup().unwrap();
        let second = app.signature_fingerprints();

        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn test_registrations_invalidate_setup() {
        let mut app = sample_app();
        app.setup().unwrap();
        assert!(app.is_setup());

        app.route("/more").get(endpoint("more", |_| async { Ok(Reply::Empty) }));
        assert!(!app.is_setup());
    }

    #[test]
    fn test_route_graphs_merge_application_wide() {
        struct Cache;

        let mut app = App::new();
        app.route("/a")
            .graph_mut()
            .factory(Lifetime::Reused, &[], |_| async { Ok(Cache) })
            .unwrap();
        // The node registered on /a is visible to the endpoint on /b.
        app.route("/b").get(
            endpoint("useCache", |args| async move {
                let _cache = args.instance::<Cache>("cache")?;
                Ok(Reply::Empty)
            })
            .param("cache", TypeExpr::of::<Cache>()),
        );

        app.setup().unwrap();
    }

    #[test]
    fn test_setup_reports_unknown_dependency() {
        struct Missing;

        let mut app = App::new();
        app.route("/broken").get(
            endpoint("broken", |_| async { Ok(Reply::Empty) })
                .param("dep", TypeExpr::of::<Missing>()),
        );
        assert!(app.setup().is_err());
    }
}
