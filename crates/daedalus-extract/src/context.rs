//! The request view extractors bind against.

use daedalus_core::RequestMeta;
use daedalus_router::Params;
use http::{HeaderMap, Method, Uri};

/// Everything about a request except its body.
///
/// Handed to the binder together with the body stream; also injectable
/// into handlers as the request primitive.
///
/// # Example
///
/// ```rust
/// use daedalus_extract::RequestPartsBuilder;
/// use http::Method;
///
/// let parts = RequestPartsBuilder::new()
///     .method(Method::GET)
///     .uri("/items?tag=a&tag=b")
///     .header("x-token", "t1")
///     .build();
///
/// assert_eq!(parts.path(), "/items");
/// assert_eq!(parts.query_string(), Some("tag=a&tag=b"));
/// assert_eq!(parts.header_values("x-token"), vec!["t1"]);
/// ```
#[derive(Debug, Clone)]
pub struct RequestParts {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    path_params: Params,
}

impl RequestParts {
    /// Creates request parts.
    #[must_use]
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, path_params: Params) -> Self {
        Self {
            method,
            uri,
            headers,
            path_params,
        }
    }

    /// Returns the HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the path portion of the URI.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Returns the raw query string, if present.
    #[must_use]
    pub fn query_string(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Returns the request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns one header value as a string.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns every value of a header, in wire order.
    #[must_use]
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    /// Returns the `Content-Type` header.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Returns the captured path parameters.
    #[must_use]
    pub fn path_params(&self) -> &Params {
        &self.path_params
    }

    /// Parses the cookie headers into (name, value) pairs, in wire order.
    #[must_use]
    pub fn cookies(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for value in self.header_values("cookie") {
            for piece in value.split(';') {
                if let Some((name, value)) = piece.trim().split_once('=') {
                    pairs.push((name.trim().to_string(), value.trim().to_string()));
                }
            }
        }
        pairs
    }

    /// Builds the lightweight metadata view shared with handlers and
    /// problem solvers.
    #[must_use]
    pub fn to_meta(&self) -> RequestMeta {
        RequestMeta::new(self.method.clone(), self.path(), self.headers.clone())
    }
}

/// Builder for [`RequestParts`], used by the transport layer and tests.
#[derive(Debug, Default)]
pub struct RequestPartsBuilder {
    method: Option<Method>,
    uri: Option<Uri>,
    headers: HeaderMap,
    path_params: Params,
}

impl RequestPartsBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the method.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Sets the URI from a string; invalid URIs fall back to `/`.
    #[must_use]
    pub fn uri(mut self, uri: &str) -> Self {
        self.uri = Some(uri.parse().unwrap_or_else(|_| Uri::from_static("/")));
        self
    }

    /// Appends one header.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            http::header::HeaderName::try_from(name),
            http::header::HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Replaces all headers.
    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Adds one captured path parameter.
    #[must_use]
    pub fn path_param(mut self, name: &str, value: &str) -> Self {
        self.path_params.insert(name, value);
        self
    }

    /// Replaces the captured path parameters.
    #[must_use]
    pub fn path_params(mut self, params: Params) -> Self {
        self.path_params = params;
        self
    }

    /// Builds the parts; method defaults to GET, URI to `/`.
    #[must_use]
    pub fn build(self) -> RequestParts {
        RequestParts {
            method: self.method.unwrap_or(Method::GET),
            uri: self.uri.unwrap_or_else(|| Uri::from_static("/")),
            headers: self.headers,
            path_params: self.path_params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_value_headers_preserve_order() {
        let parts = RequestPartsBuilder::new()
            .uri("/items")
            .header("x-token", "a")
            .header("x-token", "b")
            .build();
        assert_eq!(parts.header_values("x-token"), vec!["a", "b"]);
    }

    #[test]
    fn test_cookie_parsing() {
        let parts = RequestPartsBuilder::new()
            .header("cookie", "session=abc; theme=dark")
            .build();
        assert_eq!(
            parts.cookies(),
            vec![
                ("session".to_string(), "abc".to_string()),
                ("theme".to_string(), "dark".to_string()),
            ]
        );
    }

    #[test]
    fn test_to_meta_carries_request_line() {
        let parts = RequestPartsBuilder::new()
            .method(Method::POST)
            .uri("/users?x=1")
            .build();
        let meta = parts.to_meta();
        assert_eq!(meta.method(), &Method::POST);
        assert_eq!(meta.path(), "/users");
    }

    #[test]
    fn test_path_params() {
        let parts = RequestPartsBuilder::new().path_param("pid", "p1").build();
        assert_eq!(parts.path_params().get("pid"), Some("p1"));
    }
}
