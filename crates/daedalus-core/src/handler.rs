//! The dynamic handler contract.
//!
//! Handlers receive a bound [`Args`] tuple prepared by the endpoint
//! runtime: decoded data values in declaration order, resolved dependency
//! instances, and framework primitives. They return a [`Reply`] describing
//! the result, which the runtime encodes against the endpoint's declared
//! response variants.

use crate::meta::RequestMeta;
use crate::problem::{Problem, ProblemKind};
use crate::response::Response;
use daedalus_sse::SseEvent;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// One bound argument value.
#[derive(Clone)]
pub enum ArgValue {
    /// A decoded, validated data value (path/query/header/cookie/body/form).
    Data(serde_json::Value),
    /// A resolved instance: a dependency, primitive, or upload collection.
    Instance(Arc<dyn Any + Send + Sync>),
}

impl fmt::Debug for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data(value) => f.debug_tuple("Data").field(value).finish(),
            Self::Instance(_) => f.write_str("Instance"),
        }
    }
}

/// The bound argument tuple passed to a handler.
///
/// Values are keyed by parameter name and kept in declaration order.
///
/// # Example
///
/// ```rust
/// use daedalus_core::{Args, RequestMeta};
///
/// let mut args = Args::new(RequestMeta::default());
/// args.insert_data("count", serde_json::json!(5));
///
/// let count: u32 = args.get("count").unwrap();
/// assert_eq!(count, 5);
/// ```
#[derive(Debug, Clone)]
pub struct Args {
    meta: RequestMeta,
    values: IndexMap<String, ArgValue>,
}

impl Args {
    /// Creates an empty argument tuple for a request.
    #[must_use]
    pub fn new(meta: RequestMeta) -> Self {
        Self {
            meta,
            values: IndexMap::new(),
        }
    }

    /// Returns the request metadata.
    #[must_use]
    pub fn meta(&self) -> &RequestMeta {
        &self.meta
    }

    /// Inserts a decoded data value.
    pub fn insert_data(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.values.insert(name.into(), ArgValue::Data(value));
    }

    /// Inserts a resolved instance.
    pub fn insert_instance(
        &mut self,
        name: impl Into<String>,
        instance: Arc<dyn Any + Send + Sync>,
    ) {
        self.values.insert(name.into(), ArgValue::Instance(instance));
    }

    /// Returns the raw data value for a parameter, if bound.
    #[must_use]
    pub fn data(&self, name: &str) -> Option<&serde_json::Value> {
        match self.values.get(name) {
            Some(ArgValue::Data(value)) => Some(value),
            _ => None,
        }
    }

    /// Deserializes the data value bound for a parameter.
    ///
    /// # Errors
    ///
    /// Returns an internal problem when the parameter is absent or of the
    /// wrong shape; the binder guarantees presence for parsed signatures,
    /// so a failure here is a declaration mismatch.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T, HandlerError> {
        let value = self
            .data(name)
            .ok_or_else(|| internal_arg_error(name, "no data value bound"))?;
        serde_json::from_value(value.clone())
            .map_err(|e| internal_arg_error(name, &e.to_string()))
    }

    /// Downcasts the instance bound for a parameter.
    ///
    /// # Errors
    ///
    /// Returns an internal problem when the parameter is absent or the
    /// instance is of a different type.
    pub fn instance<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, HandlerError> {
        match self.values.get(name) {
            Some(ArgValue::Instance(instance)) => Arc::clone(instance)
                .downcast::<T>()
                .map_err(|_| internal_arg_error(name, "instance has a different type")),
            _ => Err(internal_arg_error(name, "no instance bound")),
        }
    }

    /// Returns the bound parameter names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Returns `true` when no values are bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn internal_arg_error(name: &str, message: &str) -> HandlerError {
    HandlerError::Problem(
        Problem::new(ProblemKind::Internal)
            .with_detail(format!("argument '{name}': {message}")),
    )
}

/// The result of a handler invocation.
pub enum Reply {
    /// A value encoded against the default response variant.
    Value(serde_json::Value),
    /// A value encoded against the variant registered for this status.
    Status(u16, serde_json::Value),
    /// The empty sentinel: status only, zero body bytes.
    Empty,
    /// A lazy sequence of server-sent events.
    EventStream(BoxStream<'static, SseEvent>),
    /// A lazy sequence of JSON values, framed per the declared variant.
    JsonStream(BoxStream<'static, serde_json::Value>),
    /// A fully formed response, bypassing variant encoding.
    Full(Response),
}

impl Reply {
    /// Builds a [`Reply::Value`] from a serializable value.
    ///
    /// # Errors
    ///
    /// Returns an unserializable-response problem when conversion fails.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, HandlerError> {
        let value = serde_json::to_value(value).map_err(|e| {
            HandlerError::Problem(
                Problem::new(ProblemKind::UnserializableResponse).with_detail(e.to_string()),
            )
        })?;
        Ok(Self::Value(value))
    }

    /// Builds a [`Reply::Status`] from a serializable value.
    ///
    /// # Errors
    ///
    /// Returns an unserializable-response problem when conversion fails.
    pub fn json_status<T: Serialize>(status: u16, value: &T) -> Result<Self, HandlerError> {
        match Self::json(value)? {
            Self::Value(value) => Ok(Self::Status(status, value)),
            _ => unreachable!("Reply::json returns Reply::Value"),
        }
    }

    /// Builds an event stream reply from an in-memory sequence.
    #[must_use]
    pub fn events(events: Vec<SseEvent>) -> Self {
        use futures_util::StreamExt;
        Self::EventStream(futures_util::stream::iter(events).boxed())
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Status(status, value) => {
                f.debug_tuple("Status").field(status).field(value).finish()
            }
            Self::Empty => f.write_str("Empty"),
            Self::EventStream(_) => f.write_str("EventStream"),
            Self::JsonStream(_) => f.write_str("JsonStream"),
            Self::Full(response) => f.debug_tuple("Full").field(response).finish(),
        }
    }
}

/// An error escaping a handler.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// A structured problem, translated by the problem mapper.
    #[error(transparent)]
    Problem(#[from] Problem),
    /// Any other error, rendered as an opaque 500 unless verbose.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The future returned by a handler invocation.
pub type HandlerFuture = BoxFuture<'static, Result<Reply, HandlerError>>;

/// An invocable request handler.
///
/// Handlers take the bound argument tuple by value and produce a reply.
/// Plugins wrap handlers by interposing on [`Handler::call`].
pub trait Handler: Send + Sync {
    /// Invokes the handler with bound arguments.
    fn call(&self, args: Args) -> HandlerFuture;
}

/// A shareable, type-erased handler.
pub type ArcHandler = Arc<dyn Handler>;

struct FnHandler<F>(F);

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Args) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Reply, HandlerError>> + Send + 'static,
{
    fn call(&self, args: Args) -> HandlerFuture {
        Box::pin((self.0)(args))
    }
}

/// Wraps an async closure as a shareable handler.
///
/// # Example
///
/// ```rust
/// use daedalus_core::handler::{handler_fn, Reply};
///
/// let handler = handler_fn(|args| async move {
///     let name: String = args.get("name")?;
///     Reply::json(&serde_json::json!({ "hello": name }))
/// });
/// let _ = handler;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> ArcHandler
where
    F: Fn(Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Reply, HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_data_roundtrip() {
        let mut args = Args::new(RequestMeta::default());
        args.insert_data("pid", serde_json::json!("p1"));
        args.insert_data("q", serde_json::json!(5));

        let pid: String = args.get("pid").unwrap();
        let q: i64 = args.get("q").unwrap();
        assert_eq!(pid, "p1");
        assert_eq!(q, 5);
        assert_eq!(args.names().collect::<Vec<_>>(), vec!["pid", "q"]);
    }

    #[test]
    fn test_args_missing_is_internal() {
        let args = Args::new(RequestMeta::default());
        let err = args.get::<String>("absent").unwrap_err();
        match err {
            HandlerError::Problem(p) => assert_eq!(p.kind(), ProblemKind::Internal),
            HandlerError::Other(_) => panic!("expected a problem"),
        }
    }

    #[test]
    fn test_args_instance_downcast() {
        struct Engine {
            label: &'static str,
        }

        let mut args = Args::new(RequestMeta::default());
        args.insert_instance("engine", Arc::new(Engine { label: "fake" }));

        let engine = args.instance::<Engine>("engine").unwrap();
        assert_eq!(engine.label, "fake");

        assert!(args.instance::<String>("engine").is_err());
    }

    #[tokio::test]
    async fn test_handler_fn_invocation() {
        let handler = handler_fn(|args| async move {
            let n: i64 = args.get("n")?;
            Reply::json(&serde_json::json!({ "double": n * 2 }))
        });

        let mut args = Args::new(RequestMeta::default());
        args.insert_data("n", serde_json::json!(21));

        let reply = handler.call(args).await.unwrap();
        match reply {
            Reply::Value(value) => assert_eq!(value["double"], 42),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn test_reply_json_status() {
        let reply = Reply::json_status(201, &serde_json::json!({"id": 1})).unwrap();
        match reply {
            Reply::Status(status, value) => {
                assert_eq!(status, 201);
                assert_eq!(value["id"], 1);
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }
}
