//! The endpoint runtime.
//!
//! An [`EndpointDef`] is the declarative half: a handler plus parameter
//! and return declarations, collected on routes. At application setup
//! each definition is analysed into a frozen [`Endpoint`], which serves
//! requests: bind parameters, resolve dependencies in the request scope,
//! invoke the plugin-wrapped handler, encode the reply against the
//! declared response variants, and unwind the scope before the final
//! send completes.

use crate::plugin::{compose, dedup, ArcPlugin, AuthGuard, EndpointInfo};
use crate::ws::WebSocketHandle;
use bytes::Bytes;
use daedalus_config::LimitsConfig;
use daedalus_core::handler::{handler_fn, ArcHandler, Reply};
use daedalus_core::problem::{Problem, ProblemKind};
use daedalus_core::response::ResponseBody;
use daedalus_core::{
    Args, AuthScheme, BusTerminal, HandlerError, ProblemMapper, RequestMeta, Response,
    SyncExecutor,
};
use daedalus_extract::{bind_request, BodyStream, RequestParts};
use daedalus_graph::{Graph, Resolver, Scope, TypeKey};
use daedalus_router::RouteMethod;
use daedalus_sig::returns::{ResponseShape, ReturnVariant, StreamFraming};
use daedalus_sig::typing::TypeExpr;
use daedalus_sig::{
    EndpointSignature, ParamDecl, PrimitiveKind, SetupError, SignatureParser,
};
use daedalus_sse::{frame_events, SseFraming};
use futures_util::{future, stream, StreamExt};
use http::StatusCode;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// A request-time injector registered for a nominal parameter type.
pub type Provider =
    Arc<dyn Fn(&RequestParts) -> Result<Arc<dyn Any + Send + Sync>, Problem> + Send + Sync>;

pub(crate) type ProviderMap = Arc<HashMap<TypeKey, Provider>>;

type BlockingFn = Arc<dyn Fn(Args) -> Result<Reply, HandlerError> + Send + Sync>;

#[derive(Clone)]
enum HandlerSpec {
    Async(ArcHandler),
    Blocking(BlockingFn),
}

/// A declared endpoint: handler, parameters, return type, and properties.
#[derive(Clone)]
pub struct EndpointDef {
    pub(crate) name: String,
    handler: HandlerSpec,
    pub(crate) params: Vec<ParamDecl>,
    pub(crate) ret: Option<TypeExpr>,
    pub(crate) plugins: Vec<ArcPlugin>,
    pub(crate) auth: Option<AuthScheme>,
    pub(crate) scoped_opt_in: bool,
    pub(crate) declared_problems: Vec<ProblemKind>,
}

/// Declares an endpoint around an async handler.
///
/// # Example
///
/// ```rust
/// use daedalus::prelude::*;
///
/// let ep = endpoint("echo", |args: Args| async move {
///     let q: i64 = args.get("q")?;
///     Reply::json(&serde_json::json!({ "q": q }))
/// })
/// .param("q", TypeExpr::integer());
/// # let _ = ep;
/// ```
pub fn endpoint<F, Fut>(name: impl Into<String>, handler: F) -> EndpointDef
where
    F: Fn(Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Reply, HandlerError>> + Send + 'static,
{
    EndpointDef {
        name: name.into(),
        handler: HandlerSpec::Async(handler_fn(handler)),
        params: Vec::new(),
        ret: None,
        plugins: Vec::new(),
        auth: None,
        scoped_opt_in: false,
        declared_problems: Vec::new(),
    }
}

/// Declares an endpoint around a synchronous handler.
///
/// The handler runs on the bounded sync pool.
pub fn blocking_endpoint<F>(name: impl Into<String>, handler: F) -> EndpointDef
where
    F: Fn(Args) -> Result<Reply, HandlerError> + Send + Sync + 'static,
{
    EndpointDef {
        name: name.into(),
        handler: HandlerSpec::Blocking(Arc::new(handler)),
        params: Vec::new(),
        ret: None,
        plugins: Vec::new(),
        auth: None,
        scoped_opt_in: false,
        declared_problems: Vec::new(),
    }
}

impl EndpointDef {
    /// Declares a required parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, ty: TypeExpr) -> Self {
        self.params.push(ParamDecl::new(name, ty));
        self
    }

    /// Declares a parameter with a default.
    #[must_use]
    pub fn param_default(
        mut self,
        name: impl Into<String>,
        ty: TypeExpr,
        default: serde_json::Value,
    ) -> Self {
        self.params.push(ParamDecl::with_default(name, ty, default));
        self
    }

    /// Declares the return type.
    #[must_use]
    pub fn returns(mut self, ty: TypeExpr) -> Self {
        self.ret = Some(ty);
        self
    }

    /// Adds a plugin; the first added runs outermost.
    #[must_use]
    pub fn plugin(mut self, plugin: Arc<dyn crate::plugin::Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Publishes an authentication scheme and installs its precondition.
    #[must_use]
    pub fn auth(mut self, scheme: AuthScheme) -> Self {
        self.auth = Some(scheme);
        self
    }

    /// Forces a child scope even without resource dependencies, so
    /// registered exit callbacks always run.
    #[must_use]
    pub fn scoped(mut self) -> Self {
        self.scoped_opt_in = true;
        self
    }

    /// Enumerates the problems this endpoint can produce, for document
    /// generation.
    #[must_use]
    pub fn problems(mut self, kinds: &[ProblemKind]) -> Self {
        self.declared_problems.extend_from_slice(kinds);
        self
    }
}

/// A frozen, servable endpoint.
pub struct Endpoint {
    name: String,
    signature: Arc<EndpointSignature>,
    handler: ArcHandler,
    resolver: Arc<Resolver>,
    busterm: BusTerminal,
    mapper: Arc<ProblemMapper>,
    providers: ProviderMap,
    limits: LimitsConfig,
    scoped: bool,
    static_call: bool,
    declared_problems: Vec<ProblemKind>,
}

impl Endpoint {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn setup(
        def: &EndpointDef,
        path: &str,
        method: &RouteMethod,
        graph: &Arc<Graph>,
        resolver: Arc<Resolver>,
        busterm: BusTerminal,
        mapper: Arc<ProblemMapper>,
        providers: ProviderMap,
        limits: LimitsConfig,
        executor: &SyncExecutor,
    ) -> Result<Self, SetupError> {
        let http_method = match method {
            RouteMethod::Http(method) => method.clone(),
            RouteMethod::Upgrade => http::Method::GET,
        };
        let mut parser = SignatureParser::new(graph, path, http_method)
            .with_primitive(TypeKey::of::<RequestParts>(), PrimitiveKind::Request)
            .with_primitive(TypeKey::of::<Scope>(), PrimitiveKind::Scope)
            .with_primitive(TypeKey::of::<daedalus_core::EventBus>(), PrimitiveKind::Bus)
            .with_primitive(TypeKey::of::<WebSocketHandle>(), PrimitiveKind::WebSocket);
        if matches!(method, RouteMethod::Upgrade) {
            parser = parser.websocket();
        }
        for key in providers.keys() {
            parser = parser.with_plugin_type(*key);
        }
        let signature = Arc::new(parser.parse(&def.params, def.ret.as_ref())?);

        let wants_scope = signature
            .params
            .plugins
            .iter()
            .any(|p| p.kind == Some(PrimitiveKind::Scope));
        let scoped = signature.scoped || def.scoped_opt_in || wants_scope;
        let static_call = signature.static_call && !scoped;

        let base: ArcHandler = match &def.handler {
            HandlerSpec::Async(handler) => Arc::clone(handler),
            HandlerSpec::Blocking(f) => {
                let f = Arc::clone(f);
                let executor = executor.clone();
                handler_fn(move |args| {
                    let f = Arc::clone(&f);
                    let executor = executor.clone();
                    async move { executor.run(move || f(args)).await.map_err(HandlerError::Other)? }
                })
            }
        };

        let mut plugins: Vec<ArcPlugin> = Vec::new();
        if let Some(scheme) = def.auth {
            plugins.push(Arc::new(AuthGuard::new(scheme)));
        }
        plugins.extend(def.plugins.iter().cloned());
        let plugins = dedup(plugins);

        let info = EndpointInfo {
            name: def.name.clone(),
            path: path.to_string(),
            signature: Arc::clone(&signature),
            graph: Arc::clone(graph),
        };
        let handler = compose(&plugins, &info, base);

        Ok(Self {
            name: def.name.clone(),
            signature,
            handler,
            resolver,
            busterm,
            mapper,
            providers,
            limits,
            scoped,
            static_call,
            declared_problems: def.declared_problems.clone(),
        })
    }

    /// Returns the endpoint name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the frozen signature.
    #[must_use]
    pub fn signature(&self) -> &Arc<EndpointSignature> {
        &self.signature
    }

    /// Returns the problems this endpoint declares it can produce.
    #[must_use]
    pub fn declared_problems(&self) -> &[ProblemKind] {
        &self.declared_problems
    }

    /// Returns whether requests open a child scope.
    #[must_use]
    pub fn is_scoped(&self) -> bool {
        self.scoped
    }

    /// Serves one request to a response.
    ///
    /// The scope (when any) is unwound on every path: for buffered
    /// responses before this method returns, for streaming responses when
    /// the stream ends, in both cases before the final send completes.
    pub async fn dispatch(&self, parts: RequestParts, body: BodyStream) -> Response {
        let meta = parts.to_meta();
        let scope = self.scoped.then(|| self.resolver.scope());

        let result = self.invoke(&parts, body, &meta, scope.as_ref()).await;
        let response = match result {
            Ok(reply) => self.encode(reply, &meta),
            Err(HandlerError::Problem(problem)) => self.mapper.respond(&meta, &problem),
            Err(HandlerError::Other(error)) => match error.downcast_ref::<Problem>() {
                Some(problem) => self.mapper.respond(&meta, problem),
                None => self.mapper.respond_unexpected(&meta, &error),
            },
        };

        match scope {
            None => response,
            Some(scope) => finish_with_scope(response, scope).await,
        }
    }

    async fn invoke(
        &self,
        parts: &RequestParts,
        body: BodyStream,
        meta: &RequestMeta,
        scope: Option<&Scope>,
    ) -> Result<Reply, HandlerError> {
        if self.static_call {
            return self.handler.call(Args::new(meta.clone())).await;
        }

        let bound =
            bind_request(&self.signature, parts, body, self.limits.max_body_size).await?;
        let mut args = Args::new(meta.clone());
        for (name, value) in bound.data {
            args.insert_data(name, value);
        }
        for (field, files) in bound.files {
            args.insert_instance(field, Arc::new(files));
        }

        for plugin in &self.signature.params.plugins {
            match plugin.kind {
                Some(PrimitiveKind::Request) => {
                    args.insert_instance(&plugin.name, Arc::new(parts.clone()));
                }
                Some(PrimitiveKind::Bus) => {
                    args.insert_instance(&plugin.name, Arc::new(self.busterm.bus()));
                }
                Some(PrimitiveKind::Scope) => {
                    let scope = scope.ok_or_else(|| {
                        HandlerError::Problem(
                            Problem::new(ProblemKind::Internal)
                                .with_detail("scope primitive requested outside a scope"),
                        )
                    })?;
                    args.insert_instance(&plugin.name, Arc::new(scope.clone()));
                }
                Some(PrimitiveKind::WebSocket) => {
                    args.insert_instance(&plugin.name, Arc::new(WebSocketHandle::new()));
                }
                None => {
                    let provider = self.providers.get(&plugin.key).ok_or_else(|| {
                        HandlerError::Problem(Problem::new(ProblemKind::Internal).with_detail(
                            format!("no provider registered for '{}'", plugin.name),
                        ))
                    })?;
                    let instance = provider(parts)?;
                    args.insert_instance(&plugin.name, instance);
                }
            }
        }

        for dep in &self.signature.params.dependencies {
            let resolved = match scope {
                Some(scope) => scope.resolve_key(dep.key).await,
                None => self.resolver.resolve_key(dep.key).await,
            }
            .map_err(|e| HandlerError::Other(anyhow::Error::new(e)))?;
            args.insert_instance(&dep.name, resolved);
        }

        self.handler.call(args).await
    }

    fn encode(&self, reply: Reply, meta: &RequestMeta) -> Response {
        let returns = &self.signature.returns;
        match reply {
            Reply::Full(response) => response,
            Reply::Empty => {
                let status = returns
                    .default_variant()
                    .map_or(returns.default_status, |v| v.status);
                Response::empty(status_code(status))
            }
            Reply::Value(value) => self.encode_value(returns.variant_for(None), None, &value, meta),
            Reply::Status(code, value) => {
                self.encode_value(returns.variant_for(Some(code)), Some(code), &value, meta)
            }
            Reply::EventStream(events) => {
                let variant = returns.variant_for(None);
                let status = variant.map_or(200, |v| v.status);
                let media = variant
                    .and_then(|v| v.media_type.clone())
                    .unwrap_or_else(|| daedalus_sse::EVENT_STREAM_CONTENT_TYPE.to_string());
                let frames = frame_events(events, SseFraming::EventStream);
                Response::stream(status_code(status), &media, frames)
            }
            Reply::JsonStream(values) => {
                let variant = returns.variant_for(None);
                let status = variant.map_or(200, |v| v.status);
                let framing = variant.map_or(StreamFraming::NewlineDelimited, |v| v.framing);
                let media = variant
                    .and_then(|v| v.media_type.clone())
                    .unwrap_or_else(|| "application/x-ndjson".to_string());
                let frames = values
                    .map(move |value| frame_json(&value, framing))
                    .boxed();
                Response::stream(status_code(status), &media, frames)
            }
        }
    }

    fn encode_value(
        &self,
        variant: Option<&ReturnVariant>,
        explicit_status: Option<u16>,
        value: &serde_json::Value,
        meta: &RequestMeta,
    ) -> Response {
        let Some(variant) = variant else {
            return match Response::json(StatusCode::OK, value) {
                Ok(response) => response,
                Err(problem) => self.mapper.respond(meta, &problem),
            };
        };
        if variant.shape == ResponseShape::Empty {
            return Response::empty(status_code(variant.status));
        }

        let status = explicit_status.unwrap_or(variant.status);
        match variant.encoder.encode(value) {
            Ok(bytes) => {
                let mut response = Response::new(status_code(status)).with_body(bytes);
                if let Some(media) = &variant.media_type {
                    response = response.with_content_type(media);
                }
                response
            }
            Err(message) => {
                let problem =
                    Problem::new(ProblemKind::UnserializableResponse).with_detail(message);
                self.mapper.respond(meta, &problem)
            }
        }
    }
}

fn status_code(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn frame_json(value: &serde_json::Value, framing: StreamFraming) -> Bytes {
    let encoded = value.to_string();
    match framing {
        StreamFraming::NewlineDelimited => Bytes::from(format!("{encoded}\n")),
        StreamFraming::LengthPrefixed => Bytes::from(format!("{}:{encoded}", encoded.len())),
    }
}

async fn finish_with_scope(response: Response, scope: Scope) -> Response {
    let (status, headers, body) = response.into_parts();
    match body {
        ResponseBody::Stream(chunks) => {
            let closing = chunks
                .chain(stream::once(async move {
                    scope.close().await;
                    Bytes::new()
                }))
                .filter(|chunk| future::ready(!chunk.is_empty()))
                .boxed();
            Response::from_parts(status, headers, ResponseBody::Stream(closing))
        }
        other => {
            scope.close().await;
            Response::from_parts(status, headers, other)
        }
    }
}
