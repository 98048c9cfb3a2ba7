//! The in-memory client.

use crate::response::TestResponse;
use bytes::Bytes;
use daedalus_server::{
    run_shutdown, run_startup, BufferTransmit, ConnKind, ConnScope, LifespanError, QueueReceive,
    Service,
};
use http::Method;
use std::sync::Arc;

/// Drives a transport callable without a network.
pub struct TestClient<S> {
    service: Arc<S>,
}

impl<S: Service> TestClient<S> {
    /// Wraps an application callable.
    #[must_use]
    pub fn new(service: S) -> Self {
        Self {
            service: Arc::new(service),
        }
    }

    /// Runs the lifespan startup handshake.
    ///
    /// # Errors
    ///
    /// Returns the application's startup failure verbatim.
    pub async fn startup(&self) -> Result<(), LifespanError> {
        run_startup(&*self.service).await
    }

    /// Runs the lifespan shutdown handshake.
    ///
    /// # Errors
    ///
    /// Returns the application's shutdown failure.
    pub async fn shutdown(&self) -> Result<(), LifespanError> {
        run_shutdown(&*self.service).await
    }

    /// Starts building a request with an arbitrary method.
    #[must_use]
    pub fn request(&self, method: Method, path_and_query: &str) -> TestRequestBuilder<'_, S> {
        TestRequestBuilder {
            client: self,
            method,
            kind: ConnKind::Http,
            path_and_query: path_and_query.to_string(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Starts a GET request.
    #[must_use]
    pub fn get(&self, path_and_query: &str) -> TestRequestBuilder<'_, S> {
        self.request(Method::GET, path_and_query)
    }

    /// Starts a POST request.
    #[must_use]
    pub fn post(&self, path_and_query: &str) -> TestRequestBuilder<'_, S> {
        self.request(Method::POST, path_and_query)
    }

    /// Starts a PUT request.
    #[must_use]
    pub fn put(&self, path_and_query: &str) -> TestRequestBuilder<'_, S> {
        self.request(Method::PUT, path_and_query)
    }

    /// Starts a DELETE request.
    #[must_use]
    pub fn delete(&self, path_and_query: &str) -> TestRequestBuilder<'_, S> {
        self.request(Method::DELETE, path_and_query)
    }

    /// Starts a websocket upgrade request.
    #[must_use]
    pub fn upgrade(&self, path_and_query: &str) -> TestRequestBuilder<'_, S> {
        let mut builder = self.request(Method::GET, path_and_query);
        builder.kind = ConnKind::WebSocket;
        builder
    }
}

/// A request under construction.
pub struct TestRequestBuilder<'c, S> {
    client: &'c TestClient<S>,
    method: Method,
    kind: ConnKind,
    path_and_query: String,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl<S: Service> TestRequestBuilder<'_, S> {
    /// Appends a header; repeated names become repeated header lines.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Sets a raw body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a JSON body and content type.
    #[must_use]
    pub fn json<T: serde::Serialize>(mut self, value: &T) -> Self {
        self.body = serde_json::to_vec(value).map(Bytes::from).unwrap_or_default();
        self.header("content-type", "application/json")
    }

    /// Sends the request and collects the full response.
    pub async fn send(self) -> TestResponse {
        let (path, query) = match self.path_and_query.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (self.path_and_query.clone(), None),
        };
        let headers: Vec<(Bytes, Bytes)> = self
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    Bytes::from(name.clone().into_bytes()),
                    Bytes::from(value.clone().into_bytes()),
                )
            })
            .collect();
        let mut scope = ConnScope::http(self.method, path, query, headers);
        scope.kind = self.kind;

        let mut receive = QueueReceive::single_body(self.body);
        let mut transmit = BufferTransmit::new();
        self.client
            .service
            .call(scope, &mut receive, &mut transmit)
            .await;

        TestResponse::from_messages(transmit.messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daedalus_server::{Inbound, Outbound, Receive, Transmit};
    use futures_util::future::BoxFuture;
    use http::StatusCode;

    /// Echoes the method, path, and body length as JSON.
    struct EchoService;

    impl Service for EchoService {
        fn call<'a>(
            &'a self,
            scope: ConnScope,
            receive: &'a mut dyn Receive,
            transmit: &'a mut dyn Transmit,
        ) -> BoxFuture<'a, ()> {
            Box::pin(async move {
                let mut body_len = 0;
                while let Ok(Inbound::Body { body, more_body }) = receive.next().await {
                    body_len += body.len();
                    if !more_body {
                        break;
                    }
                }
                let payload = format!(
                    r#"{{"method":"{}","path":"{}","body_len":{}}}"#,
                    scope.method.as_ref().map_or("-", |m| m.as_str()),
                    scope.path,
                    body_len,
                );
                let _ = transmit
                    .send(Outbound::Start {
                        status: StatusCode::OK,
                        headers: vec![(
                            Bytes::from_static(b"content-type"),
                            Bytes::from_static(b"application/json"),
                        )],
                    })
                    .await;
                let _ = transmit
                    .send(Outbound::Body {
                        body: Bytes::from(payload),
                        more_body: false,
                    })
                    .await;
            })
        }
    }

    #[tokio::test]
    async fn test_round_trip() {
        let client = TestClient::new(EchoService);
        let response = client.post("/users?x=1").body("abc").send().await;

        assert_eq!(response.status(), 200);
        assert_eq!(response.header("content-type"), Some("application/json"));
        let value = response.json_value();
        assert_eq!(value["method"], "POST");
        assert_eq!(value["path"], "/users");
        assert_eq!(value["body_len"], 3);
    }

    #[tokio::test]
    async fn test_json_body_helper() {
        let client = TestClient::new(EchoService);
        let response = client
            .post("/users")
            .json(&serde_json::json!({"name": "ada"}))
            .send()
            .await;
        assert_eq!(response.json_value()["body_len"], 14);
    }
}
