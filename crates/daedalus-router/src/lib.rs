//! Prefix-tree routing for Daedalus.
//!
//! Routes are a tree of path-template segments. Fixed segments win over
//! placeholders, placeholders over wildcards. Each node owns a map from
//! method to an endpoint payload; websocket endpoints register under the
//! [`RouteMethod::Upgrade`] pseudo-method in the same tree.
//!
//! # Example
//!
//! ```rust
//! use daedalus_router::{PathRouter, RouteMethod, RouteOutcome};
//! use http::Method;
//!
//! let mut router = PathRouter::new();
//! router.insert("/profile/{pid}", RouteMethod::Http(Method::GET), "getProfile");
//!
//! match router.at("/profile/p1", &RouteMethod::Http(Method::GET)) {
//!     RouteOutcome::Matched { value, params } => {
//!         assert_eq!(*value, "getProfile");
//!         assert_eq!(params.get("pid"), Some("p1"));
//!     }
//!     _ => panic!("route should match"),
//! }
//! ```

mod method_map;
mod node;
mod params;

pub use method_map::{MethodMap, RouteMethod};
pub use node::{Node, SegmentKind};
pub use params::Params;

/// The result of a route lookup.
#[derive(Debug)]
pub enum RouteOutcome<'a, T> {
    /// A route and method matched.
    Matched {
        /// The registered endpoint payload.
        value: &'a T,
        /// The captured path parameters.
        params: Params,
    },
    /// The path matched but the method did not.
    MethodMismatch {
        /// The methods the node does answer, for the `Allow` header.
        allow: Vec<String>,
    },
    /// No route matched the path.
    NotFound,
}

/// A method-aware path router.
#[derive(Debug, Clone, Default)]
pub struct PathRouter<T> {
    root: Node<T>,
}

impl<T> PathRouter<T> {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self { root: Node::root() }
    }

    /// Registers an endpoint payload under a path and method.
    ///
    /// Returns the previous payload when the (path, method) pair was
    /// already registered.
    pub fn insert(&mut self, path: &str, method: RouteMethod, value: T) -> Option<T> {
        self.root.methods_at(path).insert(method, value)
    }

    /// Looks up a path and method.
    #[must_use]
    pub fn at(&self, path: &str, method: &RouteMethod) -> RouteOutcome<'_, T> {
        match self.root.match_path(path) {
            Some((methods, params)) => match methods.get(method) {
                Some(value) => RouteOutcome::Matched { value, params },
                None => RouteOutcome::MethodMismatch {
                    allow: methods.allow(),
                },
            },
            None => RouteOutcome::NotFound,
        }
    }
}
