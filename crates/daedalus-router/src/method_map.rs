//! Method dispatch at a route node.

use http::Method;
use std::fmt;

/// The dispatch key for an endpoint: an HTTP method, or the upgrade
/// pseudo-method websocket endpoints register under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMethod {
    /// A plain HTTP method.
    Http(Method),
    /// The websocket upgrade slot.
    Upgrade,
}

impl RouteMethod {
    /// Returns the wire name used in `Allow` headers.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Http(method) => method.as_str(),
            Self::Upgrade => "UPGRADE",
        }
    }
}

impl From<Method> for RouteMethod {
    fn from(method: Method) -> Self {
        Self::Http(method)
    }
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The endpoints registered at one route node, keyed by method.
///
/// Kept as an ordered list: registration order drives the `Allow` header.
#[derive(Debug, Clone)]
pub struct MethodMap<T> {
    entries: Vec<(RouteMethod, T)>,
}

impl<T> Default for MethodMap<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> MethodMap<T> {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an endpoint for a method, returning the replaced one.
    pub fn insert(&mut self, method: RouteMethod, value: T) -> Option<T> {
        for (existing, slot) in &mut self.entries {
            if *existing == method {
                return Some(std::mem::replace(slot, value));
            }
        }
        self.entries.push((method, value));
        None
    }

    /// Returns the endpoint for a method.
    #[must_use]
    pub fn get(&self, method: &RouteMethod) -> Option<&T> {
        self.entries
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, v)| v)
    }

    /// Returns the method names answered here, for `Allow`.
    #[must_use]
    pub fn allow(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(m, _)| m.as_str().to_string())
            .collect()
    }

    /// Returns `true` when no endpoint is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates the registered (method, endpoint) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&RouteMethod, &T)> {
        self.entries.iter().map(|(m, v)| (m, v))
    }
}
