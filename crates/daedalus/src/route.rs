//! Route composition.
//!
//! A route is a path template owning a method map of endpoint definitions
//! and an ordered set of subroutes. Subroutes compose: asking for the
//! same path twice returns the same node. Route-level properties
//! (plugins, auth scheme, declared problems) fold into each endpoint at
//! setup: merged first, de-duplicated after, preserving first-seen order.

use crate::endpoint::EndpointDef;
use crate::plugin::ArcPlugin;
use daedalus_core::problem::ProblemKind;
use daedalus_core::AuthScheme;
use daedalus_graph::{Graph, GraphError};
use daedalus_router::RouteMethod;
use http::Method;

/// One route node of the application tree.
pub struct Route {
    path: String,
    endpoints: Vec<(RouteMethod, EndpointDef)>,
    subroutes: Vec<Route>,
    plugins: Vec<ArcPlugin>,
    auth: Option<AuthScheme>,
    problems: Vec<ProblemKind>,
    graph: Graph,
}

fn join_paths(base: &str, sub: &str) -> String {
    let base = base.trim_end_matches('/');
    let sub = sub.trim_start_matches('/');
    if sub.is_empty() {
        if base.is_empty() {
            "/".to_string()
        } else {
            base.to_string()
        }
    } else {
        format!("{base}/{sub}")
    }
}

impl Route {
    /// Creates a route for a path template.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        let mut path = path.into();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        Self {
            path,
            endpoints: Vec::new(),
            subroutes: Vec::new(),
            plugins: Vec::new(),
            auth: None,
            problems: Vec::new(),
            graph: Graph::new(),
        }
    }

    /// Returns the route's path template.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the subroute for a relative path, creating it on first
    /// use. Asking for the same path twice returns the same node.
    pub fn sub(&mut self, path: &str) -> &mut Route {
        let full = join_paths(&self.path, path);
        if let Some(found) = self.subroutes.iter().position(|r| r.path == full) {
            return &mut self.subroutes[found];
        }
        self.subroutes.push(Route::new(full));
        self.subroutes
            .last_mut()
            .expect("subroute was just pushed")
    }

    fn register(&mut self, method: RouteMethod, def: EndpointDef) -> &mut Self {
        if let Some(found) = self.endpoints.iter().position(|(m, _)| *m == method) {
            tracing::warn!(
                path = %self.path,
                method = %method,
                "endpoint replaced by a later registration"
            );
            self.endpoints[found].1 = def;
        } else {
            self.endpoints.push((method, def));
        }
        self
    }

    /// Registers a GET endpoint.
    pub fn get(&mut self, def: EndpointDef) -> &mut Self {
        self.register(RouteMethod::Http(Method::GET), def)
    }

    /// Registers a POST endpoint.
    pub fn post(&mut self, def: EndpointDef) -> &mut Self {
        self.register(RouteMethod::Http(Method::POST), def)
    }

    /// Registers a PUT endpoint.
    pub fn put(&mut self, def: EndpointDef) -> &mut Self {
        self.register(RouteMethod::Http(Method::PUT), def)
    }

    /// Registers a PATCH endpoint.
    pub fn patch(&mut self, def: EndpointDef) -> &mut Self {
        self.register(RouteMethod::Http(Method::PATCH), def)
    }

    /// Registers a DELETE endpoint.
    pub fn delete(&mut self, def: EndpointDef) -> &mut Self {
        self.register(RouteMethod::Http(Method::DELETE), def)
    }

    /// Registers a websocket endpoint under the upgrade slot.
    pub fn ws(&mut self, def: EndpointDef) -> &mut Self {
        self.register(RouteMethod::Upgrade, def)
    }

    /// Adds a route-level plugin, applied to every endpoint below.
    pub fn plugin(&mut self, plugin: ArcPlugin) -> &mut Self {
        self.plugins.push(plugin);
        self
    }

    /// Publishes an auth scheme for every endpoint below that does not
    /// set its own.
    pub fn auth(&mut self, scheme: AuthScheme) -> &mut Self {
        self.auth = Some(scheme);
        self
    }

    /// Declares problems every endpoint below can produce.
    pub fn problems(&mut self, kinds: &[ProblemKind]) -> &mut Self {
        self.problems.extend_from_slice(kinds);
        self
    }

    /// Returns the route-level dependency registry.
    ///
    /// Route graphs merge into the application-wide graph at setup; a
    /// node registered anywhere is visible everywhere.
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// Merges this route's and every subroute's registrations into the
    /// application graph.
    pub(crate) fn collect_graph(&self, out: &mut Graph) -> Result<(), GraphError> {
        out.merge(self.graph.clone())?;
        for subroute in &self.subroutes {
            subroute.collect_graph(out)?;
        }
        Ok(())
    }

    /// Flattens the tree into per-endpoint definitions with the route
    /// properties folded in.
    pub(crate) fn collect(&self, inherited: &RouteProps) -> Vec<(String, RouteMethod, EndpointDef)> {
        let own = RouteProps {
            plugins: inherited
                .plugins
                .iter()
                .cloned()
                .chain(self.plugins.iter().cloned())
                .collect(),
            auth: self.auth.or(inherited.auth),
            problems: inherited
                .problems
                .iter()
                .copied()
                .chain(self.problems.iter().copied())
                .collect(),
        };

        let mut out = Vec::new();
        for (method, def) in &self.endpoints {
            let mut merged = def.clone();
            // Merge first (route plugins ahead of endpoint plugins),
            // de-duplicate after; Endpoint::setup performs the dedup.
            let mut plugins: Vec<ArcPlugin> = own.plugins.clone();
            plugins.extend(merged.plugins.iter().cloned());
            merged.plugins = plugins;
            merged.auth = merged.auth.or(own.auth);
            let mut problems = own.problems.clone();
            problems.extend(merged.declared_problems.iter().copied());
            merged.declared_problems = problems;
            out.push((self.path.clone(), method.clone(), merged));
        }
        for subroute in &self.subroutes {
            out.extend(subroute.collect(&own));
        }
        out
    }
}

#[derive(Default, Clone)]
pub(crate) struct RouteProps {
    pub(crate) plugins: Vec<ArcPlugin>,
    pub(crate) auth: Option<AuthScheme>,
    pub(crate) problems: Vec<ProblemKind>,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("path", &self.path)
            .field("endpoints", &self.endpoints.len())
            .field("subroutes", &self.subroutes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::endpoint;
    use daedalus_core::handler::Reply;

    fn noop(name: &str) -> EndpointDef {
        endpoint(name, |_| async { Ok(Reply::Empty) })
    }

    #[test]
    fn test_join_paths() {
        assert_eq!(join_paths("/api", "users"), "/api/users");
        assert_eq!(join_paths("/api/", "/users"), "/api/users");
        assert_eq!(join_paths("", "users"), "/users");
        assert_eq!(join_paths("/api", ""), "/api");
    }

    #[test]
    fn test_sub_is_idempotent() {
        let mut root = Route::new("/");
        root.sub("/users").get(noop("list"));
        root.sub("/users").post(noop("create"));

        assert_eq!(root.subroutes.len(), 1);
        assert_eq!(root.subroutes[0].endpoints.len(), 2);
    }

    #[test]
    fn test_collect_flattens_nested_routes() {
        let mut root = Route::new("/");
        root.sub("/users").get(noop("list"));
        root.sub("/users").sub("/{id}").get(noop("get"));

        let collected = root.collect(&RouteProps::default());
        let paths: Vec<&str> = collected.iter().map(|(p, _, _)| p.as_str()).collect();
        assert_eq!(paths, vec!["/users", "/users/{id}"]);
    }

    #[test]
    fn test_route_auth_folds_into_endpoints() {
        let mut root = Route::new("/admin");
        root.auth(AuthScheme::Bearer);
        root.get(noop("panel"));

        let collected = root.collect(&RouteProps::default());
        assert_eq!(collected[0].2.auth, Some(AuthScheme::Bearer));
    }

    #[test]
    fn test_endpoint_auth_wins_over_route() {
        let mut root = Route::new("/mixed");
        root.auth(AuthScheme::Bearer);
        root.get(noop("open").auth(AuthScheme::Basic));

        let collected = root.collect(&RouteProps::default());
        assert_eq!(collected[0].2.auth, Some(AuthScheme::Basic));
    }

    #[test]
    fn test_same_method_replaces() {
        let mut root = Route::new("/dup");
        root.get(noop("first"));
        root.get(noop("second"));

        let collected = root.collect(&RouteProps::default());
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].2.name, "second");
    }
}
