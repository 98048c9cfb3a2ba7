//! Graph and resolution errors.

use thiserror::Error;

/// Setup-time errors raised while registering or analysing the graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The same key was registered twice with differing factories.
    #[error("dependency '{0}' is already registered with a different factory")]
    DuplicateNode(String),

    /// The dependency graph contains a cycle.
    #[error("dependency cycle detected: {}", path.join(" -> "))]
    CycleDetected {
        /// The keys along the cycle, in discovery order.
        path: Vec<String>,
    },

    /// A declared dependency is not registered anywhere.
    #[error("dependency '{dependency}' required by '{dependent}' is not registered")]
    UnknownDependency {
        /// The node declaring the dependency.
        dependent: String,
        /// The missing dependency key.
        dependency: String,
    },
}

/// Request-time errors raised while resolving dependencies.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The requested key has no registered node.
    #[error("dependency '{0}' is not registered")]
    NotRegistered(String),

    /// The node's factory failed. Construction errors surface as-is.
    #[error("dependency '{name}' failed to construct")]
    Factory {
        /// The failing node key.
        name: String,
        /// The factory's own error.
        #[source]
        source: anyhow::Error,
    },

    /// A resource node was resolved outside a request scope.
    #[error("resource '{0}' requires a request scope")]
    ResourceOutsideScope(String),

    /// The cached instance does not downcast to the requested type.
    #[error("dependency '{0}' resolved to an unexpected type")]
    TypeMismatch(String),

    /// The scope has already been closed.
    #[error("the scope is already closed")]
    Closed,
}
