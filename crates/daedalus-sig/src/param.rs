//! Parameter descriptors produced by the signature parser.

use crate::constraint::Constraints;
use crate::typing::{BodyDecode, TextDecode, TypeDescriptor};
use daedalus_graph::TypeKey;
use daedalus_graph::Plan;

/// The slot a parameter is extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamRole {
    /// A path template segment.
    Path,
    /// A query string key.
    Query,
    /// An HTTP header.
    Header,
    /// A cookie.
    Cookie,
    /// The request body.
    Body,
    /// A multipart form body.
    Form,
    /// An uploaded file inside a form.
    File,
    /// A node resolved from the dependency graph.
    Dependency,
    /// A value injected by a registered plugin provider.
    Plugin,
    /// A framework primitive (request, scope, event bus, websocket).
    Primitive,
    /// A parameter pulled in by a dependency factory, not declared by
    /// the handler itself.
    Transitive,
}

/// The framework primitives injectable as parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    /// The request view.
    Request,
    /// The request scope handle.
    Scope,
    /// The in-process event bus.
    Bus,
    /// The websocket handle.
    WebSocket,
}

/// A fully analysed textual parameter (path, query, header, or cookie).
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDescriptor {
    /// The parameter name in the handler.
    pub name: String,
    /// The slot it is extracted from.
    pub role: ParamRole,
    /// The external name: query key, header wire name, path segment.
    pub source_key: String,
    /// The canonical type descriptor.
    pub descriptor: TypeDescriptor,
    /// Constraints applied after decoding.
    pub constraints: Constraints,
    /// The decoder for one wire occurrence.
    pub decoder: TextDecode,
    /// The default value used on absence.
    pub default: Option<serde_json::Value>,
    /// Whether absence is an error.
    pub required: bool,
    /// Whether all occurrences are collected into an array.
    pub multi_value: bool,
    /// Claims an authorization header must carry.
    pub required_claims: Vec<String>,
}

/// Limits applied while parsing a multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormMeta {
    /// Maximum number of uploaded files per field.
    pub max_files: usize,
    /// Maximum size of a single uploaded file, in bytes.
    pub max_file_size: usize,
}

impl Default for FormMeta {
    fn default() -> Self {
        Self {
            max_files: 16,
            max_file_size: 10 * 1024 * 1024,
        }
    }
}

/// The analysed body (or form) parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyDescriptor {
    /// The parameter name in the handler.
    pub name: String,
    /// Whether this is a JSON body or a multipart form.
    pub role: ParamRole,
    /// The expected request content type.
    pub media_type: String,
    /// The canonical type descriptor of the body value.
    pub descriptor: TypeDescriptor,
    /// A custom decoder overriding the structural one, when installed.
    pub decoder: Option<BodyDecode>,
    /// Multipart limits; present for form bodies only.
    pub form: Option<FormMeta>,
}

/// A handler parameter resolved from the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyParam {
    /// The parameter name in the handler.
    pub name: String,
    /// The graph node key.
    pub key: TypeKey,
}

/// A handler parameter filled by a primitive or plugin provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginParam {
    /// The parameter name in the handler.
    pub name: String,
    /// The nominal key of the declared type.
    pub key: TypeKey,
    /// The built-in primitive kind, when the key names one.
    pub kind: Option<PrimitiveKind>,
}

/// All parameters of one endpoint, grouped by role.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EndpointParams {
    /// Path parameters, in declaration order.
    pub path: Vec<ParamDescriptor>,
    /// Query parameters.
    pub query: Vec<ParamDescriptor>,
    /// Header parameters.
    pub header: Vec<ParamDescriptor>,
    /// Cookie parameters.
    pub cookie: Vec<ParamDescriptor>,
    /// The body or form parameter, if any.
    pub body: Option<BodyDescriptor>,
    /// Graph-resolved dependencies.
    pub dependencies: Vec<DependencyParam>,
    /// Primitive and plugin parameters.
    pub plugins: Vec<PluginParam>,
    /// Names pulled in transitively by dependency factories.
    pub transitive: Vec<String>,
}

impl EndpointParams {
    /// Returns `true` when the endpoint takes no parameters at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
            && self.query.is_empty()
            && self.header.is_empty()
            && self.cookie.is_empty()
            && self.body.is_none()
            && self.dependencies.is_empty()
            && self.plugins.is_empty()
    }

    /// Iterates the textual parameters in role order.
    pub fn textual(&self) -> impl Iterator<Item = &ParamDescriptor> {
        self.path
            .iter()
            .chain(&self.query)
            .chain(&self.header)
            .chain(&self.cookie)
    }

    /// Computes the transitive parameter names from a resolution plan:
    /// the plan's node names that no declared dependency covers.
    #[must_use]
    pub fn transitive_from_plan(&self, plan: &Plan) -> Vec<String> {
        plan.order
            .iter()
            .filter(|key| !self.dependencies.iter().any(|d| d.key == **key))
            .map(|key| key.short_name().to_string())
            .collect()
    }
}
