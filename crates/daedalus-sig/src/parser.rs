//! The signature parser: the role-resolution decision table.
//!
//! Each declared parameter is assigned exactly one role. First matching
//! rule wins:
//!
//! 1. an explicit source annotation;
//! 2. a name matching a path template placeholder;
//! 3. a nominal type registered in the dependency graph;
//! 4. a nominal type naming a framework primitive;
//! 5. a structured (or upload) type, becoming the body;
//! 6. otherwise, a query parameter.
//!
//! Structured types pinned to path/query/header/cookie expand into one
//! parameter per field (param-pack); each field inherits the role and
//! keeps its own alias, default, and constraints.

use crate::decode::scalar_decoder;
use crate::error::SetupError;
use crate::param::{
    BodyDescriptor, DependencyParam, EndpointParams, FormMeta, ParamDescriptor, ParamRole,
    PluginParam, PrimitiveKind,
};
use crate::returns::parse_returns;
use crate::signature::EndpointSignature;
use crate::typing::{inspect, ParamSource, TypeDescriptor, TypeExpr};
use daedalus_graph::Graph;
use http::Method;
use std::collections::HashSet;

/// One declared endpoint parameter: a name, a type, and an optional
/// default.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    /// The parameter name.
    pub name: String,
    /// The declared type expression.
    pub ty: TypeExpr,
    /// The default value used on absence.
    pub default: Option<serde_json::Value>,
}

impl ParamDecl {
    /// Declares a required parameter.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: TypeExpr) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
        }
    }

    /// Declares a parameter with a default.
    #[must_use]
    pub fn with_default(
        name: impl Into<String>,
        ty: TypeExpr,
        default: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            ty,
            default: Some(default),
        }
    }
}

/// Extracts `{placeholder}` names from a path template.
#[must_use]
pub fn find_path_keys(path: &str) -> Vec<String> {
    path.split('/')
        .filter_map(|segment| {
            segment
                .strip_prefix('{')
                .and_then(|s| s.strip_suffix('}'))
                .map(ToString::to_string)
        })
        .collect()
}

/// Converts a parameter name to its kebab-case wire form.
#[must_use]
pub fn to_kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, ch) in name.chars().enumerate() {
        if ch == '_' {
            out.push('-');
        } else if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Parses endpoint declarations into a frozen signature.
pub struct SignatureParser<'g> {
    graph: &'g Graph,
    route_path: String,
    method: Method,
    websocket: bool,
    path_keys: Vec<String>,
    primitives: Vec<(daedalus_graph::TypeKey, PrimitiveKind)>,
    plugin_types: Vec<daedalus_graph::TypeKey>,
}

impl<'g> SignatureParser<'g> {
    /// Creates a parser for one endpoint.
    #[must_use]
    pub fn new(graph: &'g Graph, route_path: impl Into<String>, method: Method) -> Self {
        let route_path = route_path.into();
        let path_keys = find_path_keys(&route_path);
        Self {
            graph,
            route_path,
            method,
            websocket: false,
            path_keys,
            primitives: Vec::new(),
            plugin_types: Vec::new(),
        }
    }

    /// Marks the endpoint as a websocket handler.
    ///
    /// Body parameters are rejected at parse time for these.
    #[must_use]
    pub fn websocket(mut self) -> Self {
        self.websocket = true;
        self
    }

    /// Registers a framework primitive type the parser should recognise.
    #[must_use]
    pub fn with_primitive(
        mut self,
        key: daedalus_graph::TypeKey,
        kind: PrimitiveKind,
    ) -> Self {
        self.primitives.push((key, kind));
        self
    }

    /// Registers a nominal type served by an application plugin provider.
    #[must_use]
    pub fn with_plugin_type(mut self, key: daedalus_graph::TypeKey) -> Self {
        self.plugin_types.push(key);
        self
    }

    /// Parses the declared parameters and return type.
    ///
    /// # Errors
    ///
    /// Fails on role conflicts, duplicate bodies, websocket bodies,
    /// malformed return unions, and dependency-graph errors.
    pub fn parse(
        &self,
        decls: &[ParamDecl],
        ret: Option<&TypeExpr>,
    ) -> Result<EndpointSignature, SetupError> {
        let mut params = EndpointParams::default();
        let mut seen_path: HashSet<String> = self.path_keys.iter().cloned().collect();

        for decl in decls {
            let descriptor = inspect(&decl.ty);
            self.classify(
                &decl.name,
                descriptor,
                decl.default.clone(),
                None,
                &mut params,
                &mut seen_path,
            )?;
        }

        if !seen_path.is_empty() {
            tracing::warn!(
                route = %self.route_path,
                unused = ?seen_path,
                "path placeholders without matching parameters"
            );
        }

        let returns = parse_returns(ret)?;
        let roots: Vec<_> = params.dependencies.iter().map(|d| d.key).collect();
        let plan = self.graph.plan(&roots)?;
        params.transitive = params.transitive_from_plan(&plan);
        let scoped = plan.scoped;
        let static_call = params.is_empty();

        Ok(EndpointSignature {
            route_path: self.route_path.clone(),
            method: self.method.clone(),
            websocket: self.websocket,
            params,
            returns,
            plan,
            scoped,
            static_call,
        })
    }

    fn classify(
        &self,
        name: &str,
        descriptor: TypeDescriptor,
        default: Option<serde_json::Value>,
        forced: Option<ParamSource>,
        params: &mut EndpointParams,
        seen_path: &mut HashSet<String>,
    ) -> Result<(), SetupError> {
        let source = forced.or_else(|| descriptor.source());
        match source {
            Some(source) => {
                self.declared(name, descriptor, default, source, params, seen_path)
            }
            None => self.rule_based(name, descriptor, default, params, seen_path),
        }
    }

    fn rule_based(
        &self,
        name: &str,
        descriptor: TypeDescriptor,
        default: Option<serde_json::Value>,
        params: &mut EndpointParams,
        seen_path: &mut HashSet<String>,
    ) -> Result<(), SetupError> {
        if self.path_keys.iter().any(|k| k == name) {
            seen_path.remove(name);
            let param =
                self.make_textual(name, name.to_string(), ParamRole::Path, descriptor, default)?;
            params.path.push(param);
            return Ok(());
        }

        if let Some(key) = descriptor.ident() {
            if self.graph.contains(key) {
                params.dependencies.push(DependencyParam {
                    name: name.to_string(),
                    key,
                });
                return Ok(());
            }
            if let Some((_, kind)) = self.primitives.iter().find(|(k, _)| *k == key) {
                params.plugins.push(PluginParam {
                    name: name.to_string(),
                    key,
                    kind: Some(*kind),
                });
                return Ok(());
            }
            if self.plugin_types.contains(&key) {
                params.plugins.push(PluginParam {
                    name: name.to_string(),
                    key,
                    kind: None,
                });
                return Ok(());
            }
            return Err(SetupError::InvalidParamType {
                name: name.to_string(),
                reason: format!(
                    "nominal type {} is neither a registered dependency nor a framework primitive",
                    key.short_name()
                ),
            });
        }

        if descriptor.is_upload() {
            return self.set_body(name, descriptor, ParamRole::Form, params);
        }
        if descriptor.is_structured() {
            return self.set_body(name, descriptor, ParamRole::Body, params);
        }

        let param = self.make_textual(
            name,
            name.to_string(),
            ParamRole::Query,
            descriptor,
            default,
        )?;
        params.query.push(param);
        Ok(())
    }

    fn declared(
        &self,
        name: &str,
        descriptor: TypeDescriptor,
        default: Option<serde_json::Value>,
        source: ParamSource,
        params: &mut EndpointParams,
        seen_path: &mut HashSet<String>,
    ) -> Result<(), SetupError> {
        if matches!(
            source,
            ParamSource::Path | ParamSource::Query | ParamSource::Header | ParamSource::Cookie
        ) && descriptor.is_structured()
            && !descriptor.skip_unpack()
        {
            return self.expand_param_pack(name, &descriptor, default, source, params, seen_path);
        }

        match source {
            ParamSource::Path => {
                seen_path.remove(name);
                let key = descriptor.alias().unwrap_or(name).to_string();
                let param =
                    self.make_textual(name, key, ParamRole::Path, descriptor, default)?;
                params.path.push(param);
            }
            ParamSource::Query => {
                let key = descriptor.alias().unwrap_or(name).to_string();
                let param =
                    self.make_textual(name, key, ParamRole::Query, descriptor, default)?;
                params.query.push(param);
            }
            ParamSource::Header => {
                let key = descriptor
                    .alias()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| to_kebab_case(name));
                let claims = if key.eq_ignore_ascii_case("authorization") {
                    descriptor.claims()
                } else {
                    Vec::new()
                };
                let mut param =
                    self.make_textual(name, key, ParamRole::Header, descriptor, default)?;
                param.required_claims = claims;
                params.header.push(param);
            }
            ParamSource::Cookie => {
                let key = descriptor.alias().unwrap_or(name).to_string();
                let param =
                    self.make_textual(name, key, ParamRole::Cookie, descriptor, default)?;
                params.cookie.push(param);
            }
            ParamSource::Body => {
                self.set_body(name, descriptor, ParamRole::Body, params)?;
            }
            ParamSource::Form => {
                self.set_body(name, descriptor, ParamRole::Form, params)?;
            }
            ParamSource::Plugin => {
                let key = descriptor.ident().ok_or_else(|| SetupError::InvalidParamType {
                    name: name.to_string(),
                    reason: "plugin parameters must declare a nominal type".to_string(),
                })?;
                let kind = self
                    .primitives
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, kind)| *kind);
                params.plugins.push(PluginParam {
                    name: name.to_string(),
                    key,
                    kind,
                });
            }
        }
        Ok(())
    }

    fn expand_param_pack(
        &self,
        name: &str,
        descriptor: &TypeDescriptor,
        default: Option<serde_json::Value>,
        source: ParamSource,
        params: &mut EndpointParams,
        seen_path: &mut HashSet<String>,
    ) -> Result<(), SetupError> {
        if default.is_some() {
            return Err(SetupError::InvalidParamType {
                name: name.to_string(),
                reason: "a param pack cannot carry a default value".to_string(),
            });
        }
        let TypeExpr::Struct(schema) = &descriptor.base else {
            return Err(SetupError::InvalidParamType {
                name: name.to_string(),
                reason: format!(
                    "only struct schemas expand into {source:?} parameters, got {:?}",
                    descriptor.structured
                ),
            });
        };

        for field in &schema.fields {
            let mut field_descriptor = inspect(&field.ty);
            if let Some(alias) = &field.alias {
                field_descriptor
                    .metadata
                    .push(crate::typing::Annotation::Alias(alias.clone()));
            }
            self.classify(
                &field.name,
                field_descriptor,
                field.default.clone(),
                Some(source),
                params,
                seen_path,
            )?;
        }
        Ok(())
    }

    fn set_body(
        &self,
        name: &str,
        descriptor: TypeDescriptor,
        role: ParamRole,
        params: &mut EndpointParams,
    ) -> Result<(), SetupError> {
        if self.websocket {
            return Err(SetupError::WebSocketBody(name.to_string()));
        }
        if !method_admits_body(&self.method) {
            return Err(SetupError::InvalidParamType {
                name: name.to_string(),
                reason: format!("method {} does not admit a request body", self.method),
            });
        }
        if let Some(existing) = &params.body {
            return Err(SetupError::DuplicateBody {
                first: existing.name.clone(),
                second: name.to_string(),
            });
        }

        let form = matches!(role, ParamRole::Form) || descriptor.is_upload();
        let media_type = descriptor
            .media_type()
            .map(ToString::to_string)
            .unwrap_or_else(|| {
                if form {
                    "multipart/form-data".to_string()
                } else {
                    "application/json".to_string()
                }
            });
        let form_meta = form.then(|| {
            let mut meta = FormMeta::default();
            if let Some(max_files) = descriptor.constraints().max_files {
                meta.max_files = max_files;
            }
            meta
        });

        params.body = Some(BodyDescriptor {
            name: name.to_string(),
            role: if form { ParamRole::Form } else { ParamRole::Body },
            media_type,
            decoder: descriptor.body_decoder().cloned(),
            descriptor,
            form: form_meta,
        });
        Ok(())
    }

    fn make_textual(
        &self,
        name: &str,
        source_key: String,
        role: ParamRole,
        descriptor: TypeDescriptor,
        default: Option<serde_json::Value>,
    ) -> Result<ParamDescriptor, SetupError> {
        if descriptor.is_structured() {
            return Err(SetupError::InvalidParamType {
                name: name.to_string(),
                reason: format!("structured types are not supported for {role:?} parameters"),
            });
        }
        if matches!(role, ParamRole::Path) && descriptor.sequence.is_some() {
            return Err(SetupError::InvalidParamType {
                name: name.to_string(),
                reason: "sequences are not supported for path parameters".to_string(),
            });
        }

        let multi_value = descriptor.sequence.is_some()
            && matches!(role, ParamRole::Query | ParamRole::Header | ParamRole::Cookie);
        let decoder = match (descriptor.text_decoder(), &descriptor.sequence) {
            (Some(custom), _) => custom.clone(),
            (None, Some((_, item))) if multi_value => scalar_decoder(item, false),
            (None, _) => scalar_decoder(&descriptor.base, descriptor.nullable),
        };
        let constraints = descriptor.constraints();
        let required = default.is_none() && !descriptor.nullable;

        Ok(ParamDescriptor {
            name: name.to_string(),
            role,
            source_key,
            constraints,
            decoder,
            default,
            required,
            multi_value,
            required_claims: Vec::new(),
            descriptor,
        })
    }
}

fn method_admits_body(method: &Method) -> bool {
    *method != Method::GET
        && *method != Method::HEAD
        && *method != Method::OPTIONS
        && *method != Method::TRACE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::Constraints;
    use crate::returns::{empty, resp};
    use crate::typing::{Annotation, FieldSchema, StructSchema};
    use daedalus_graph::{Graph, Lifetime, ReleaseFn, TypeKey};
    use serde_json::json;

    struct Engine;
    struct Conn;
    struct FakeRequest;

    fn graph() -> Graph {
        let mut graph = Graph::new();
        graph
            .factory(Lifetime::Reused, &[], |_| async { Ok(Engine) })
            .unwrap();
        graph
            .resource(&[], |_| async {
                Ok((Conn, Box::pin(async {}) as ReleaseFn))
            })
            .unwrap();
        graph
    }

    fn parser<'g>(graph: &'g Graph, path: &str, method: Method) -> SignatureParser<'g> {
        SignatureParser::new(graph, path, method)
            .with_primitive(TypeKey::of::<FakeRequest>(), PrimitiveKind::Request)
    }

    #[test]
    fn test_find_path_keys() {
        assert_eq!(find_path_keys("/profile/{pid}"), vec!["pid"]);
        assert_eq!(
            find_path_keys("/orgs/{org}/users/{user}"),
            vec!["org", "user"]
        );
        assert!(find_path_keys("/plain/path").is_empty());
    }

    #[test]
    fn test_to_kebab_case() {
        assert_eq!(to_kebab_case("x_token"), "x-token");
        assert_eq!(to_kebab_case("ContentType"), "content-type");
        assert_eq!(to_kebab_case("simple"), "simple");
    }

    #[test]
    fn test_decision_table_roles() {
        let graph = graph();
        let sig = parser(&graph, "/profile/{pid}", Method::GET)
            .parse(
                &[
                    ParamDecl::new("pid", TypeExpr::string()),
                    ParamDecl::new("q", TypeExpr::integer()),
                    ParamDecl::new("engine", TypeExpr::of::<Engine>()),
                    ParamDecl::new("req", TypeExpr::of::<FakeRequest>()),
                ],
                None,
            )
            .unwrap();

        assert_eq!(sig.params.path.len(), 1);
        assert_eq!(sig.params.path[0].role, ParamRole::Path);
        assert_eq!(sig.params.query.len(), 1);
        assert_eq!(sig.params.dependencies.len(), 1);
        assert_eq!(sig.params.plugins.len(), 1);
        assert_eq!(sig.params.plugins[0].kind, Some(PrimitiveKind::Request));
        assert!(!sig.scoped);
        assert!(!sig.static_call);
    }

    #[test]
    fn test_structured_type_becomes_body() {
        let graph = Graph::new();
        let schema = TypeExpr::schema(StructSchema::named(
            "CreateUser",
            vec![FieldSchema::new("name", TypeExpr::string())],
        ));
        let sig = parser(&graph, "/users", Method::POST)
            .parse(&[ParamDecl::new("payload", schema)], None)
            .unwrap();

        let body = sig.params.body.expect("body classified");
        assert_eq!(body.role, ParamRole::Body);
        assert_eq!(body.media_type, "application/json");
    }

    #[test]
    fn test_structured_body_on_get_is_rejected() {
        let graph = Graph::new();
        let schema = TypeExpr::schema(StructSchema::record(vec![FieldSchema::new(
            "name",
            TypeExpr::string(),
        )]));
        let err = parser(&graph, "/users", Method::GET)
            .parse(&[ParamDecl::new("payload", schema)], None)
            .unwrap_err();
        assert!(matches!(err, SetupError::InvalidParamType { .. }));
    }

    #[test]
    fn test_duplicate_body_is_rejected() {
        let graph = Graph::new();
        let schema = || {
            TypeExpr::schema(StructSchema::record(vec![FieldSchema::new(
                "name",
                TypeExpr::string(),
            )]))
        };
        let err = parser(&graph, "/users", Method::POST)
            .parse(
                &[
                    ParamDecl::new("first", schema()),
                    ParamDecl::new("second", schema()),
                ],
                None,
            )
            .unwrap_err();
        assert!(matches!(err, SetupError::DuplicateBody { .. }));
    }

    #[test]
    fn test_websocket_rejects_body() {
        let graph = Graph::new();
        let schema = TypeExpr::schema(StructSchema::record(vec![FieldSchema::new(
            "name",
            TypeExpr::string(),
        )]));
        let err = SignatureParser::new(&graph, "/ws", Method::POST)
            .websocket()
            .parse(&[ParamDecl::new("payload", schema)], None)
            .unwrap_err();
        assert!(matches!(err, SetupError::WebSocketBody(_)));
    }

    #[test]
    fn test_scoped_when_resource_in_plan() {
        let graph = graph();
        let sig = parser(&graph, "/work", Method::GET)
            .parse(&[ParamDecl::new("conn", TypeExpr::of::<Conn>())], None)
            .unwrap();
        assert!(sig.scoped);
    }

    #[test]
    fn test_multi_value_header() {
        let graph = Graph::new();
        let ty = TypeExpr::optional(TypeExpr::list(TypeExpr::string()))
            .from_source(ParamSource::Header);
        let sig = parser(&graph, "/items", Method::GET)
            .parse(&[ParamDecl::new("x_token", ty)], None)
            .unwrap();

        let header = &sig.params.header[0];
        assert_eq!(header.source_key, "x-token");
        assert!(header.multi_value);
        assert!(!header.required);
    }

    #[test]
    fn test_required_flag_rules() {
        let graph = Graph::new();
        let sig = parser(&graph, "/flags", Method::GET)
            .parse(
                &[
                    ParamDecl::new("a", TypeExpr::integer()),
                    ParamDecl::with_default("b", TypeExpr::integer(), json!(7)),
                    ParamDecl::new("c", TypeExpr::optional(TypeExpr::integer())),
                ],
                None,
            )
            .unwrap();

        assert!(sig.params.query[0].required);
        assert!(!sig.params.query[1].required);
        assert!(!sig.params.query[2].required);
    }

    #[test]
    fn test_param_pack_expansion() {
        let graph = Graph::new();
        let pack = TypeExpr::schema(StructSchema::record(vec![
            FieldSchema::new("page", TypeExpr::integer()).with_default(json!(1)),
            FieldSchema::new("per_page", TypeExpr::integer()).with_alias("perPage"),
        ]))
        .from_source(ParamSource::Query);

        let sig = parser(&graph, "/list", Method::GET)
            .parse(&[ParamDecl::new("paging", pack)], None)
            .unwrap();

        assert_eq!(sig.params.query.len(), 2);
        assert_eq!(sig.params.query[0].name, "page");
        assert!(!sig.params.query[0].required);
        assert_eq!(sig.params.query[1].source_key, "perPage");
        assert!(sig.params.body.is_none());
    }

    #[test]
    fn test_authorization_header_claims() {
        let graph = Graph::new();
        let ty = TypeExpr::string()
            .from_source(ParamSource::Header)
            .aliased("Authorization")
            .with(Annotation::Claims(vec!["sub".into(), "scope".into()]));
        let sig = parser(&graph, "/me", Method::GET)
            .parse(&[ParamDecl::new("token", ty)], None)
            .unwrap();

        assert_eq!(sig.params.header[0].required_claims, vec!["sub", "scope"]);
    }

    #[test]
    fn test_unknown_nominal_type_fails() {
        struct Mystery;
        let graph = Graph::new();
        let err = parser(&graph, "/x", Method::GET)
            .parse(&[ParamDecl::new("m", TypeExpr::of::<Mystery>())], None)
            .unwrap_err();
        assert!(matches!(err, SetupError::InvalidParamType { .. }));
    }

    #[test]
    fn test_static_call_detection() {
        let graph = Graph::new();
        let sig = parser(&graph, "/health", Method::GET).parse(&[], None).unwrap();
        assert!(sig.static_call);
        assert!(!sig.scoped);
    }

    #[test]
    fn test_constraints_flow_into_descriptor() {
        let graph = Graph::new();
        let ty = TypeExpr::integer().constrained(Constraints::new().ge(0.0).le(130.0));
        let sig = parser(&graph, "/ages", Method::GET)
            .parse(&[ParamDecl::new("age", ty)], None)
            .unwrap();
        assert_eq!(sig.params.query[0].constraints.ge, Some(0.0));
        assert_eq!(sig.params.query[0].constraints.le, Some(130.0));
    }

    #[test]
    fn test_reparse_yields_identical_signature() {
        let graph = graph();
        let decls = vec![
            ParamDecl::new("pid", TypeExpr::string()),
            ParamDecl::new("q", TypeExpr::integer()),
            ParamDecl::new("engine", TypeExpr::of::<Engine>()),
        ];
        let ret = TypeExpr::union(vec![resp(TypeExpr::mapping(), 200), empty(204)]);

        let a = parser(&graph, "/profile/{pid}", Method::GET)
            .parse(&decls, Some(&ret))
            .unwrap();
        let b = parser(&graph, "/profile/{pid}", Method::GET)
            .parse(&decls, Some(&ret))
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }
}
