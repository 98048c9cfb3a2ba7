//! Collected test responses.

use bytes::{Bytes, BytesMut};
use daedalus_server::Outbound;
use http::{HeaderMap, StatusCode};

/// A fully collected response.
#[derive(Debug)]
pub struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl TestResponse {
    /// Assembles a response from the outbound message sequence.
    #[must_use]
    pub fn from_messages(messages: Vec<Outbound>) -> Self {
        let mut status = StatusCode::INTERNAL_SERVER_ERROR;
        let mut headers = HeaderMap::new();
        let mut body = BytesMut::new();

        for message in messages {
            match message {
                Outbound::Start {
                    status: s,
                    headers: raw,
                } => {
                    status = s;
                    for (name, value) in raw {
                        if let (Ok(name), Ok(value)) = (
                            http::header::HeaderName::from_bytes(&name),
                            http::header::HeaderValue::from_bytes(&value),
                        ) {
                            headers.append(name, value);
                        }
                    }
                }
                Outbound::Body { body: chunk, .. } => body.extend_from_slice(&chunk),
                _ => {}
            }
        }

        Self {
            status,
            headers,
            body: body.freeze(),
        }
    }

    /// Returns the status code as a number.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status.as_u16()
    }

    /// Returns the response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns one header value as a string.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the raw body bytes.
    #[must_use]
    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }

    /// Returns the body as UTF-8 text.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Parses the body as JSON into a value tree.
    ///
    /// # Panics
    ///
    /// Panics when the body is not valid JSON; intended for assertions.
    #[must_use]
    pub fn json_value(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or_else(|e| {
            panic!("response body is not JSON ({e}): {:?}", self.text())
        })
    }

    /// Deserializes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when the body does not parse.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_from_messages() {
        let response = TestResponse::from_messages(vec![
            Outbound::Start {
                status: StatusCode::CREATED,
                headers: vec![(
                    Bytes::from_static(b"content-type"),
                    Bytes::from_static(b"application/json"),
                )],
            },
            Outbound::Body {
                body: Bytes::from_static(b"{\"id\":"),
                more_body: true,
            },
            Outbound::Body {
                body: Bytes::from_static(b"1}"),
                more_body: false,
            },
        ]);

        assert_eq!(response.status(), 201);
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.json_value()["id"], 1);
    }

    #[test]
    fn test_no_messages_is_500() {
        let response = TestResponse::from_messages(Vec::new());
        assert_eq!(response.status(), 500);
        assert!(response.body_bytes().is_empty());
    }
}
