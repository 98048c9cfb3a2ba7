//! Problem Details error taxonomy and mapping.
//!
//! Every error response in Daedalus is an RFC 9457 Problem Detail. The
//! closed [`ProblemKind`] taxonomy carries the canonical status, kebab-case
//! `type`, and `title` for each kind; [`Problem`] instances may override any
//! of them. The [`ProblemMapper`] translates problems into responses via an
//! extensible solver registry: exact kind first, then the nearest base
//! kind, then the status code, then a 500 fallback.

use crate::meta::RequestMeta;
use crate::response::Response;
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Content type for problem responses.
pub const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

/// The closed set of problem kinds with canonical statuses.
///
/// Applications extend the taxonomy through [`ProblemKind::Custom`], which
/// names a new kind and its status without touching the built-in set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProblemKind {
    /// A required request parameter was absent.
    MissingRequestParam,
    /// A request parameter failed decoding or validation.
    InvalidParamValue,
    /// The request body was not valid JSON.
    InvalidJsonReceived,
    /// A multipart form violated its declared constraints.
    InvalidFormError,
    /// Aggregate of all per-parameter validation failures.
    InvalidRequestErrors,
    /// The request content type does not match the declared body type.
    UnsupportedMediaType,
    /// The request body exceeded the configured size limit.
    PayloadTooLarge,
    /// No route matched the request path.
    NotFound,
    /// The path matched but the method did not.
    MethodNotAllowed,
    /// No acceptable representation exists.
    NotAcceptable,
    /// Credentials are missing.
    Unauthorized,
    /// Credentials were presented but rejected.
    InvalidToken,
    /// Credentials are valid but insufficient.
    Forbidden,
    /// The request conflicts with current resource state.
    Conflict,
    /// The resource existed but is permanently gone.
    Gone,
    /// The request is well-formed but semantically invalid.
    UnprocessableEntity,
    /// An upstream or handler deadline elapsed.
    Timeout,
    /// The caller exceeded a rate limit.
    TooManyRequests,
    /// An unexpected server-side failure.
    Internal,
    /// The declared response value could not be encoded.
    UnserializableResponse,
    /// The operation is declared but not implemented.
    NotImplemented,
    /// An application-defined kind with its canonical status.
    Custom {
        /// The kebab-case kind name used as the problem `type`.
        name: &'static str,
        /// The canonical status code for the kind.
        status: u16,
    },
}

impl ProblemKind {
    /// Returns the kebab-case name used as the problem `type`.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::MissingRequestParam => "missing-request-param",
            Self::InvalidParamValue => "invalid-param-value",
            Self::InvalidJsonReceived => "invalid-json-received",
            Self::InvalidFormError => "invalid-form-error",
            Self::InvalidRequestErrors => "invalid-request-errors",
            Self::UnsupportedMediaType => "unsupported-media-type",
            Self::PayloadTooLarge => "payload-too-large",
            Self::NotFound => "not-found",
            Self::MethodNotAllowed => "method-not-allowed",
            Self::NotAcceptable => "not-acceptable",
            Self::Unauthorized => "unauthorized",
            Self::InvalidToken => "invalid-token",
            Self::Forbidden => "forbidden",
            Self::Conflict => "conflict",
            Self::Gone => "gone",
            Self::UnprocessableEntity => "unprocessable-entity",
            Self::Timeout => "timeout",
            Self::TooManyRequests => "too-many-requests",
            Self::Internal => "internal",
            Self::UnserializableResponse => "unserializable-response",
            Self::NotImplemented => "not-implemented",
            Self::Custom { name, .. } => name,
        }
    }

    /// Returns the canonical HTTP status for this kind.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        let code = match self {
            Self::MissingRequestParam
            | Self::InvalidParamValue
            | Self::InvalidJsonReceived
            | Self::InvalidFormError
            | Self::InvalidRequestErrors
            | Self::UnprocessableEntity => 422,
            Self::UnsupportedMediaType => 415,
            Self::PayloadTooLarge => 413,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
            Self::NotAcceptable => 406,
            Self::Unauthorized | Self::InvalidToken => 401,
            Self::Forbidden => 403,
            Self::Conflict => 409,
            Self::Gone => 410,
            Self::Timeout => 504,
            Self::TooManyRequests => 429,
            Self::Internal | Self::UnserializableResponse => 500,
            Self::NotImplemented => 501,
            Self::Custom { status, .. } => *status,
        };
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Returns the canonical human-readable title for this kind.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Self::MissingRequestParam => "A required request parameter is missing",
            Self::InvalidParamValue => "A request parameter has an invalid value",
            Self::InvalidJsonReceived => "The request body is not valid JSON",
            Self::InvalidFormError => "The form data violates its constraints",
            Self::InvalidRequestErrors => "The request parameters failed validation",
            Self::UnsupportedMediaType => "The request media type is not supported",
            Self::PayloadTooLarge => "The request payload is too large",
            Self::NotFound => "The requested resource was not found",
            Self::MethodNotAllowed => "The method is not allowed for this resource",
            Self::NotAcceptable => "No acceptable representation is available",
            Self::Unauthorized => "Authentication is required",
            Self::InvalidToken => "The provided credentials are invalid",
            Self::Forbidden => "Access to this resource is forbidden",
            Self::Conflict => "The request conflicts with the resource state",
            Self::Gone => "The resource is no longer available",
            Self::UnprocessableEntity => "The request could not be processed",
            Self::Timeout => "The operation timed out",
            Self::TooManyRequests => "Too many requests",
            Self::Internal => "An internal error occurred",
            Self::UnserializableResponse => "The response could not be serialized",
            Self::NotImplemented => "The operation is not implemented",
            Self::Custom { .. } => "Application error",
        }
    }

    /// Returns the nearest base kind, if any.
    ///
    /// Solver lookup walks this chain before falling back to the status
    /// code registry.
    #[must_use]
    pub const fn parent(&self) -> Option<ProblemKind> {
        match self {
            Self::InvalidToken => Some(Self::Unauthorized),
            Self::InvalidJsonReceived | Self::InvalidFormError => Some(Self::InvalidParamValue),
            Self::InvalidRequestErrors => Some(Self::UnprocessableEntity),
            Self::UnserializableResponse => Some(Self::Internal),
            _ => None,
        }
    }
}

impl Serialize for ProblemKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The RFC 9457 wire shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProblemDetail {
    /// A URI reference identifying the problem type.
    #[serde(rename = "type")]
    pub type_: String,
    /// A short, human-readable summary of the problem type.
    pub title: String,
    /// The HTTP status code for this occurrence.
    pub status: u16,
    /// A human-readable explanation specific to this occurrence.
    pub detail: serde_json::Value,
    /// A URI reference identifying this occurrence.
    pub instance: String,
    /// Application-defined extension members.
    #[serde(flatten)]
    pub members: serde_json::Map<String, serde_json::Value>,
}

/// A structured error raised by the framework or by handlers.
///
/// The `type` defaults to the kebab-case kind name and the `title` to the
/// kind's canonical summary; both can be overridden per instance, as can
/// the status. Headers attached here are propagated onto the response.
///
/// # Example
///
/// ```rust
/// use daedalus_core::problem::{Problem, ProblemKind};
///
/// let problem = Problem::new(ProblemKind::Conflict)
///     .with_detail("order already shipped");
/// assert_eq!(problem.status().as_u16(), 409);
/// assert_eq!(problem.type_name(), "conflict");
/// ```
#[derive(Debug, Clone)]
pub struct Problem {
    kind: ProblemKind,
    status: StatusCode,
    type_override: Option<String>,
    title_override: Option<String>,
    detail: serde_json::Value,
    headers: HeaderMap,
    members: serde_json::Map<String, serde_json::Value>,
}

impl Problem {
    /// Creates a problem of the given kind with its canonical status.
    #[must_use]
    pub fn new(kind: ProblemKind) -> Self {
        Self {
            kind,
            status: kind.status(),
            type_override: None,
            title_override: None,
            detail: serde_json::Value::Null,
            headers: HeaderMap::new(),
            members: serde_json::Map::new(),
        }
    }

    /// Builds the aggregate validation problem from per-parameter entries.
    #[must_use]
    pub fn invalid_request(entries: Vec<ValidationEntry>) -> Self {
        let detail = serde_json::to_value(&entries).unwrap_or_default();
        Self::new(ProblemKind::InvalidRequestErrors).with_detail_value(detail)
    }

    /// Overrides the status code.
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Overrides the problem `type`.
    #[must_use]
    pub fn with_type(mut self, type_: impl Into<String>) -> Self {
        self.type_override = Some(type_.into());
        self
    }

    /// Overrides the problem `title`.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title_override = Some(title.into());
        self
    }

    /// Sets a textual detail.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = serde_json::Value::String(detail.into());
        self
    }

    /// Sets a structured detail.
    #[must_use]
    pub fn with_detail_value(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }

    /// Attaches a response header.
    #[must_use]
    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = value.parse() {
            self.headers.append(name, value);
        }
        self
    }

    /// Attaches an extension member to the serialized detail.
    #[must_use]
    pub fn with_member(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.members.insert(key.into(), value);
        self
    }

    /// Returns the kind.
    #[must_use]
    pub fn kind(&self) -> ProblemKind {
        self.kind
    }

    /// Returns the effective status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the effective `type` name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        self.type_override.as_deref().unwrap_or(self.kind.name())
    }

    /// Returns the effective `title`.
    #[must_use]
    pub fn title(&self) -> &str {
        self.title_override.as_deref().unwrap_or(self.kind.title())
    }

    /// Returns the detail value.
    #[must_use]
    pub fn detail(&self) -> &serde_json::Value {
        &self.detail
    }

    /// Returns the headers to propagate onto the response.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Renders the RFC 9457 detail for a specific occurrence.
    #[must_use]
    pub fn to_detail(&self, instance: &str) -> ProblemDetail {
        ProblemDetail {
            type_: self.type_name().to_string(),
            title: self.title().to_string(),
            status: self.status.as_u16(),
            detail: self.detail.clone(),
            instance: instance.to_string(),
            members: self.members.clone(),
        }
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.type_name(), self.status, self.title())
    }
}

impl std::error::Error for Problem {}

/// The request slot a validation failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    /// Path segment.
    Path,
    /// Query string.
    Query,
    /// HTTP header.
    Header,
    /// Cookie header.
    Cookie,
    /// Request body.
    Body,
    /// Multipart form.
    Form,
}

impl fmt::Display for ParamLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Cookie => "cookie",
            Self::Body => "body",
            Self::Form => "form",
        };
        f.write_str(name)
    }
}

/// One per-parameter entry in an aggregate validation problem.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationEntry {
    /// The parameter-level problem kind.
    #[serde(rename = "type")]
    pub kind: ProblemKind,
    /// The slot the parameter came from.
    pub location: ParamLocation,
    /// The parameter name (or dotted field path within a body).
    pub param: String,
    /// A human-readable message for this failure.
    pub message: String,
}

impl ValidationEntry {
    /// Creates an entry for a missing required parameter.
    #[must_use]
    pub fn missing(location: ParamLocation, param: impl Into<String>) -> Self {
        Self {
            kind: ProblemKind::MissingRequestParam,
            location,
            param: param.into(),
            message: "parameter is required".to_string(),
        }
    }

    /// Creates an entry for an invalid parameter value.
    #[must_use]
    pub fn invalid(
        location: ParamLocation,
        param: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: ProblemKind::InvalidParamValue,
            location,
            param: param.into(),
            message: message.into(),
        }
    }

    /// Creates an entry of an explicit kind.
    #[must_use]
    pub fn of_kind(
        kind: ProblemKind,
        location: ParamLocation,
        param: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            location,
            param: param.into(),
            message: message.into(),
        }
    }
}

/// A registered translator from problem to response.
pub type Solver = Arc<dyn Fn(&RequestMeta, &Problem) -> Response + Send + Sync>;

/// Translates problems and unexpected errors into responses.
///
/// Lookup order: exact kind, nearest base kind, status code, fallback.
/// The registry is populated during application setup and frozen after.
#[derive(Clone, Default)]
pub struct ProblemMapper {
    by_kind: HashMap<&'static str, Solver>,
    by_status: HashMap<u16, Solver>,
    verbose: bool,
}

impl ProblemMapper {
    /// Creates an empty mapper.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables verbose rendering of unexpected errors.
    ///
    /// When off, unknown errors produce an opaque 500 detail.
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Registers a solver for an exact problem kind.
    pub fn solver_for_kind(
        &mut self,
        kind: ProblemKind,
        solver: impl Fn(&RequestMeta, &Problem) -> Response + Send + Sync + 'static,
    ) {
        self.by_kind.insert(kind.name(), Arc::new(solver));
    }

    /// Registers a solver for a status code.
    pub fn solver_for_status(
        &mut self,
        status: u16,
        solver: impl Fn(&RequestMeta, &Problem) -> Response + Send + Sync + 'static,
    ) {
        self.by_status.insert(status, Arc::new(solver));
    }

    /// Finds the solver for a problem, if any is registered.
    #[must_use]
    pub fn resolve(&self, problem: &Problem) -> Option<Solver> {
        let mut kind = Some(problem.kind());
        while let Some(k) = kind {
            if let Some(solver) = self.by_kind.get(k.name()) {
                return Some(Arc::clone(solver));
            }
            kind = k.parent();
        }
        self.by_status
            .get(&problem.status().as_u16())
            .map(Arc::clone)
    }

    /// Translates a problem into a response.
    ///
    /// A registered solver wins; otherwise the default RFC 9457 rendering
    /// is used, with the problem's headers propagated.
    #[must_use]
    pub fn respond(&self, meta: &RequestMeta, problem: &Problem) -> Response {
        if let Some(solver) = self.resolve(problem) {
            return solver(meta, problem);
        }
        Self::render(meta, problem)
    }

    /// Translates an unexpected (non-problem) error into a 500 response.
    #[must_use]
    pub fn respond_unexpected(&self, meta: &RequestMeta, error: &anyhow::Error) -> Response {
        tracing::error!(request_id = meta.request_id(), error = %error, "unhandled error");
        let problem = if self.verbose {
            Problem::new(ProblemKind::Internal).with_detail(format!("{error:#}"))
        } else {
            Problem::new(ProblemKind::Internal).with_detail("an internal error occurred")
        };
        self.respond(meta, &problem)
    }

    /// The default RFC 9457 rendering, without solver lookup.
    #[must_use]
    pub fn render(meta: &RequestMeta, problem: &Problem) -> Response {
        let detail = problem.to_detail(meta.path());
        let body = serde_json::to_vec(&detail).unwrap_or_default();
        let mut response = Response::new(problem.status())
            .with_content_type(PROBLEM_CONTENT_TYPE)
            .with_body(body.into());
        for (name, value) in problem.headers() {
            response.append_header(name.clone(), value.clone());
        }
        response
    }
}

impl fmt::Debug for ProblemMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProblemMapper")
            .field("kind_solvers", &self.by_kind.len())
            .field("status_solvers", &self.by_status.len())
            .field("verbose", &self.verbose)
            .finish()
    }
}
