//! Daedalus: a web service framework built around an endpoint signature
//! resolver and invocation pipeline.
//!
//! Endpoints declare their parameters as data; at setup time the
//! declarations are analysed into frozen signatures with per-request
//! dependency plans. At request time the runtime binds raw bytes and
//! headers into a typed argument tuple, resolves dependencies inside a
//! scope with guaranteed release, invokes the plugin-wrapped handler, and
//! encodes the result against the declared response variants. Errors flow
//! through an RFC 9457 problem mapper.
//!
//! # Example
//!
//! ```rust
//! use daedalus::prelude::*;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let mut app = App::new();
//! app.route("/hello/{name}").get(
//!     endpoint("hello", |args: Args| async move {
//!         let name: String = args.get("name")?;
//!         Reply::json(&serde_json::json!({ "hello": name }))
//!     })
//!     .param("name", TypeExpr::string()),
//! );
//! app.setup().unwrap();
//! # });
//! ```

pub mod app;
pub mod endpoint;
pub mod plugin;
pub mod route;
pub mod ws;

pub use app::App;
pub use endpoint::{blocking_endpoint, endpoint, Endpoint, EndpointDef};
pub use plugin::{AuthGuard, EndpointInfo, Plugin, TimeoutPlugin};
pub use route::Route;
pub use ws::WebSocketHandle;

/// The commonly used surface, importable in one line.
pub mod prelude {
    pub use crate::app::App;
    pub use crate::endpoint::{blocking_endpoint, endpoint};
    pub use crate::plugin::{AuthGuard, Plugin, TimeoutPlugin};
    pub use daedalus_core::{
        Args, AuthScheme, EventBus, HandlerError, Problem, ProblemKind, Reply, RequestMeta,
        Response,
    };
    pub use daedalus_extract::{RequestParts, UploadFile};
    pub use daedalus_graph::{Graph, Lifetime, Scope, TypeKey};
    pub use daedalus_sig::returns::{
        bytes_resp, empty, html_resp, json_stream, resp, sse_stream, text_resp,
    };
    pub use daedalus_sig::typing::{
        Annotation, FieldSchema, ParamSource, StructSchema, TypeExpr,
    };
    pub use daedalus_sig::Constraints;
    pub use daedalus_sse::SseEvent;
}
