//! The frozen endpoint signature.

use crate::param::EndpointParams;
use crate::returns::ReturnSpec;
use daedalus_graph::Plan;
use http::Method;

/// Everything the runtime needs to bind and answer one endpoint.
///
/// Signatures are produced once at application setup and never mutated
/// afterwards. Re-parsing the same declarations yields an equal signature
/// with an identical [`fingerprint`](Self::fingerprint).
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointSignature {
    /// The owning route's path template.
    pub route_path: String,
    /// The HTTP method.
    pub method: Method,
    /// Whether this is a websocket endpoint.
    pub websocket: bool,
    /// The classified parameters.
    pub params: EndpointParams,
    /// The response variants keyed by status.
    pub returns: ReturnSpec,
    /// The dependency resolution plan.
    pub plan: Plan,
    /// Whether requests open a child scope.
    pub scoped: bool,
    /// Whether the endpoint takes no parameters at all.
    pub static_call: bool,
}

impl EndpointSignature {
    /// Renders a stable, comparable dump of the signature.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        format!("{self:#?}")
    }
}
