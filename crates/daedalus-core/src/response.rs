//! Framework-level HTTP response model.
//!
//! A [`Response`] pairs a status and headers with a [`ResponseBody`] that is
//! either empty, fully buffered, or a stream of chunks. The transport layer
//! writes the start message first and then the body chunks.

use bytes::Bytes;
use futures_util::stream::BoxStream;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use serde::Serialize;
use std::fmt;

use crate::problem::{Problem, ProblemKind};

/// The body of a response.
pub enum ResponseBody {
    /// No body bytes at all.
    Empty,
    /// A fully buffered body.
    Full(Bytes),
    /// A stream of body chunks, written with `more_body` until exhausted.
    Stream(BoxStream<'static, Bytes>),
}

impl ResponseBody {
    /// Returns `true` when the body carries no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Full(bytes) => bytes.is_empty(),
            Self::Stream(_) => false,
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// An HTTP response produced by the endpoint runtime.
///
/// # Example
///
/// ```rust
/// use daedalus_core::response::Response;
/// use http::StatusCode;
///
/// let response = Response::json(StatusCode::OK, &serde_json::json!({"id": "p"})).unwrap();
/// assert_eq!(response.status(), StatusCode::OK);
/// assert_eq!(response.header("content-type"), Some("application/json"));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: ResponseBody,
}

impl Response {
    /// Creates a response with the given status and no body.
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: ResponseBody::Empty,
        }
    }

    /// Creates an empty response with no body and no content type.
    #[must_use]
    pub fn empty(status: StatusCode) -> Self {
        Self::new(status)
    }

    /// Creates a JSON response from a serializable value.
    ///
    /// # Errors
    ///
    /// Returns an [`UnserializableResponse`](ProblemKind::UnserializableResponse)
    /// problem when encoding fails.
    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Result<Self, Problem> {
        let body = serde_json::to_vec(value).map_err(|e| {
            Problem::new(ProblemKind::UnserializableResponse).with_detail(e.to_string())
        })?;
        Ok(Self::new(status)
            .with_content_type("application/json")
            .with_body(body.into()))
    }

    /// Creates a plain-text response.
    #[must_use]
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self::new(status)
            .with_content_type("text/plain; charset=utf-8")
            .with_body(Bytes::from(body.into()))
    }

    /// Creates an HTML response.
    #[must_use]
    pub fn html(status: StatusCode, body: impl Into<String>) -> Self {
        Self::new(status)
            .with_content_type("text/html; charset=utf-8")
            .with_body(Bytes::from(body.into()))
    }

    /// Creates a streaming response with the given content type.
    #[must_use]
    pub fn stream(
        status: StatusCode,
        content_type: &str,
        chunks: BoxStream<'static, Bytes>,
    ) -> Self {
        let mut response = Self::new(status).with_content_type(content_type);
        response.body = ResponseBody::Stream(chunks);
        response
    }

    /// Sets the buffered body.
    #[must_use]
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = ResponseBody::Full(body);
        self
    }

    /// Sets the `Content-Type` header.
    #[must_use]
    pub fn with_content_type(mut self, content_type: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(content_type) {
            self.headers.insert(CONTENT_TYPE, value);
        }
        self
    }

    /// Sets a header, replacing any previous value.
    #[must_use]
    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Appends a header value without replacing existing ones.
    pub fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.append(name, value);
    }

    /// Returns the status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header value as a string, if present and valid.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the buffered body bytes, if the body is not a stream.
    #[must_use]
    pub fn body_bytes(&self) -> Option<&[u8]> {
        match &self.body {
            ResponseBody::Empty => Some(&[]),
            ResponseBody::Full(bytes) => Some(bytes),
            ResponseBody::Stream(_) => None,
        }
    }

    /// Consumes the response, returning its parts.
    #[must_use]
    pub fn into_parts(self) -> (StatusCode, HeaderMap, ResponseBody) {
        (self.status, self.headers, self.body)
    }

    /// Reassembles a response from its parts.
    #[must_use]
    pub fn from_parts(status: StatusCode, headers: HeaderMap, body: ResponseBody) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Returns a reference to the body.
    #[must_use]
    pub fn body(&self) -> &ResponseBody {
        &self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{stream, StreamExt};

    #[test]
    fn test_empty_response() {
        let response = Response::empty(StatusCode::NO_CONTENT);
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.body().is_empty());
        assert_eq!(response.header("content-type"), None);
    }

    #[test]
    fn test_json_response() {
        let response = Response::json(StatusCode::CREATED, &serde_json::json!({"ok": true}))
            .expect("serializable");
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.body_bytes(), Some(br#"{"ok":true}"#.as_slice()));
    }

    #[test]
    fn test_text_response() {
        let response = Response::text(StatusCode::OK, "hello");
        assert_eq!(
            response.header("content-type"),
            Some("text/plain; charset=utf-8")
        );
        assert_eq!(response.body_bytes(), Some(b"hello".as_slice()));
    }

    #[test]
    fn test_header_handling() {
        let mut response = Response::new(StatusCode::OK).with_header("x-one", "1");
        response.append_header(
            HeaderName::from_static("x-one"),
            HeaderValue::from_static("2"),
        );
        let values: Vec<_> = response
            .headers()
            .get_all("x-one")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(values, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_stream_response() {
        let chunks = stream::iter(vec![Bytes::from("a"), Bytes::from("b")]).boxed();
        let response = Response::stream(StatusCode::OK, "text/event-stream", chunks);
        assert_eq!(response.body_bytes(), None);

        let (_, _, body) = response.into_parts();
        match body {
            ResponseBody::Stream(s) => {
                let collected: Vec<Bytes> = s.collect().await;
                assert_eq!(collected, vec![Bytes::from("a"), Bytes::from("b")]);
            }
            other => panic!("expected stream body, got {other:?}"),
        }
    }
}
