//! Per-request metadata shared by handlers, plugins, and problem solvers.

use http::{HeaderMap, Method};
use uuid::Uuid;

/// Lightweight view of the request a handler is serving.
///
/// Carried inside [`Args`](crate::Args) and handed to problem solvers, so
/// cross-cutting code (auth guards, error renderers) can inspect the
/// method, path, and headers without depending on the extraction layer.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    method: Method,
    path: String,
    headers: HeaderMap,
    request_id: String,
}

impl RequestMeta {
    /// Creates request metadata, assigning a fresh request id.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>, headers: HeaderMap) -> Self {
        Self {
            method,
            path: path.into(),
            headers,
            request_id: Uuid::new_v4().to_string(),
        }
    }

    /// Returns the HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a single header value as a string, if present and valid.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the correlation id assigned to this request.
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

impl Default for RequestMeta {
    fn default() -> Self {
        Self::new(Method::GET, "/", HeaderMap::new())
    }
}
