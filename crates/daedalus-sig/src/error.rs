//! Setup-time signature errors.

use daedalus_graph::GraphError;
use thiserror::Error;

/// Errors raised while analysing an endpoint signature.
///
/// All of these surface at application setup, never at request time.
#[derive(Debug, Error)]
pub enum SetupError {
    /// A parameter's declared type conflicts with its role or metadata.
    #[error("invalid type for parameter '{name}': {reason}")]
    InvalidParamType {
        /// The offending parameter.
        name: String,
        /// Why the declaration is rejected.
        reason: String,
    },

    /// More than one body or form parameter was declared.
    #[error("endpoint declares more than one body parameter ('{first}' and '{second}')")]
    DuplicateBody {
        /// The first body parameter seen.
        first: String,
        /// The conflicting parameter.
        second: String,
    },

    /// A websocket endpoint declared a body parameter.
    #[error("websocket endpoints cannot declare body parameter '{0}'")]
    WebSocketBody(String),

    /// A bodyless status was paired with a non-empty response variant.
    #[error("status {status} cannot carry a response body")]
    StatusConflict {
        /// The offending status code.
        status: u16,
    },

    /// A response union mixes annotated and bare variants.
    #[error("response union mixes status-annotated and bare variants")]
    MixedReturnVariants,

    /// A `pattern` constraint failed to compile.
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The raw pattern source.
        pattern: String,
        /// The compile error.
        reason: String,
    },

    /// A dependency-graph failure (cycle, duplicate, unknown node).
    #[error(transparent)]
    Graph(#[from] GraphError),
}
