//! The declared-type language and its introspector.
//!
//! Endpoints declare their parameters and return values as [`TypeExpr`]
//! values: a small tagged union covering scalars, sequences, mappings,
//! struct schemas, unions, uploads, and opaque nominal types. Metadata
//! wraps a type in [`TypeExpr::Annotated`] layers; [`inspect`] flattens
//! those layers into a canonical [`TypeDescriptor`] with the metadata in
//! source order, where a later annotation of the same kind overrides an
//! earlier one.

use crate::constraint::Constraints;
use crate::returns::StreamFraming;
use daedalus_graph::TypeKey;
use std::fmt;
use std::sync::Arc;

/// Scalar base types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    /// UTF-8 text.
    Str,
    /// Signed integer.
    Int,
    /// Floating point number.
    Float,
    /// Boolean with the usual wire spellings.
    Bool,
    /// Raw bytes, carried as text at the JSON layer.
    Bytes,
}

/// Sequence flavours; all decode to a JSON array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqKind {
    /// An ordered list.
    List,
    /// A set; duplicates are not rejected at decode time.
    Set,
    /// A homogeneous tuple.
    Tuple,
}

/// One field of a struct schema.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    /// The field name in the decoded value.
    pub name: String,
    /// The field's declared type.
    pub ty: TypeExpr,
    /// The default used when the field is absent.
    pub default: Option<serde_json::Value>,
    /// The wire name, when it differs from `name`.
    pub alias: Option<String>,
}

impl FieldSchema {
    /// Creates a required field.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: TypeExpr) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
            alias: None,
        }
    }

    /// Sets the default value.
    #[must_use]
    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Sets the wire alias.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Returns the wire name.
    #[must_use]
    pub fn wire_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// A schema of named, typed fields with optional defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct StructSchema {
    /// The schema name; named schemas are tagged structs.
    pub name: Option<String>,
    /// The fields, in declaration order.
    pub fields: Vec<FieldSchema>,
}

impl StructSchema {
    /// Creates a named (tagged) schema.
    #[must_use]
    pub fn named(name: impl Into<String>, fields: Vec<FieldSchema>) -> Self {
        Self {
            name: Some(name.into()),
            fields,
        }
    }

    /// Creates an anonymous record schema.
    #[must_use]
    pub fn record(fields: Vec<FieldSchema>) -> Self {
        Self { name: None, fields }
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// The explicit source roles a parameter can be pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSource {
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
    /// A value injected by a registered plugin provider.
    Plugin,
}

/// A custom textual decoder: wire string to decoded JSON value.
///
/// The label keeps descriptors printable and comparable across re-parses.
#[derive(Clone)]
pub struct TextDecode {
    label: String,
    decode: Arc<dyn Fn(&str) -> Result<serde_json::Value, String> + Send + Sync>,
}

impl TextDecode {
    /// Creates a labelled decoder.
    pub fn new(
        label: impl Into<String>,
        decode: impl Fn(&str) -> Result<serde_json::Value, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            decode: Arc::new(decode),
        }
    }

    /// Returns the decoder label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Decodes one wire value.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message when the value does not decode.
    pub fn decode(&self, raw: &str) -> Result<serde_json::Value, String> {
        (self.decode)(raw)
    }
}

impl fmt::Debug for TextDecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TextDecode({})", self.label)
    }
}

impl PartialEq for TextDecode {
    fn eq(&self, other: &Self) -> bool {
        self.label == other.label
    }
}

/// A custom body decoder: raw bytes to decoded JSON value.
#[derive(Clone)]
pub struct BodyDecode {
    label: String,
    decode: Arc<dyn Fn(&[u8]) -> Result<serde_json::Value, String> + Send + Sync>,
}

impl BodyDecode {
    /// Creates a labelled decoder.
    pub fn new(
        label: impl Into<String>,
        decode: impl Fn(&[u8]) -> Result<serde_json::Value, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            decode: Arc::new(decode),
        }
    }

    /// Returns the decoder label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Decodes a full body.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message when the body does not decode.
    pub fn decode(&self, raw: &[u8]) -> Result<serde_json::Value, String> {
        (self.decode)(raw)
    }
}

impl fmt::Debug for BodyDecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BodyDecode({})", self.label)
    }
}

impl PartialEq for BodyDecode {
    fn eq(&self, other: &Self) -> bool {
        self.label == other.label
    }
}

/// One metadata layer on a declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    /// Pins the parameter to an explicit source role.
    Source(ParamSource),
    /// Overrides the wire name.
    Alias(String),
    /// Adds validation constraints.
    Constrained(Constraints),
    /// Installs a custom textual decoder.
    Decode(TextDecode),
    /// Installs a custom body decoder.
    DecodeBody(BodyDecode),
    /// Overrides the media type of a body or response variant.
    MediaType(String),
    /// Attaches a status code to a response variant.
    Status(u16),
    /// Marks the response shape of a variant.
    Shape(crate::returns::ResponseShape),
    /// Selects the framing of a JSON stream variant.
    Framing(StreamFraming),
    /// Names the claims an authorization header must carry.
    Claims(Vec<String>),
    /// Keeps a structured param whole instead of expanding per field.
    SkipUnpack,
}

/// A declared type expression.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    /// A scalar.
    Scalar(Scalar),
    /// A homogeneous sequence.
    Seq {
        /// The sequence flavour.
        kind: SeqKind,
        /// The element type.
        item: Box<TypeExpr>,
    },
    /// A string-keyed mapping; `value: None` means untyped.
    Mapping {
        /// The declared value type, when any.
        value: Option<Box<TypeExpr>>,
    },
    /// A struct schema.
    Struct(Arc<StructSchema>),
    /// A union of alternatives.
    Union(Vec<TypeExpr>),
    /// The null type; unions with `Null` are nullable.
    Null,
    /// A streaming upload sink.
    Upload,
    /// An opaque nominal type: a dependency or framework primitive.
    Ident(TypeKey),
    /// A metadata layer around an inner type.
    Annotated {
        /// The wrapped type.
        inner: Box<TypeExpr>,
        /// This layer's metadata, in source order.
        metadata: Vec<Annotation>,
    },
}

impl TypeExpr {
    /// Text scalar.
    #[must_use]
    pub fn string() -> Self {
        Self::Scalar(Scalar::Str)
    }

    /// Integer scalar.
    #[must_use]
    pub fn integer() -> Self {
        Self::Scalar(Scalar::Int)
    }

    /// Float scalar.
    #[must_use]
    pub fn float() -> Self {
        Self::Scalar(Scalar::Float)
    }

    /// Boolean scalar.
    #[must_use]
    pub fn boolean() -> Self {
        Self::Scalar(Scalar::Bool)
    }

    /// Raw bytes scalar.
    #[must_use]
    pub fn raw_bytes() -> Self {
        Self::Scalar(Scalar::Bytes)
    }

    /// A list of `item`.
    #[must_use]
    pub fn list(item: TypeExpr) -> Self {
        Self::Seq {
            kind: SeqKind::List,
            item: Box::new(item),
        }
    }

    /// A set of `item`.
    #[must_use]
    pub fn set_of(item: TypeExpr) -> Self {
        Self::Seq {
            kind: SeqKind::Set,
            item: Box::new(item),
        }
    }

    /// A homogeneous tuple of `item`.
    #[must_use]
    pub fn tuple_of(item: TypeExpr) -> Self {
        Self::Seq {
            kind: SeqKind::Tuple,
            item: Box::new(item),
        }
    }

    /// An untyped string-keyed mapping.
    #[must_use]
    pub fn mapping() -> Self {
        Self::Mapping { value: None }
    }

    /// A typed string-keyed mapping.
    #[must_use]
    pub fn mapping_of(value: TypeExpr) -> Self {
        Self::Mapping {
            value: Some(Box::new(value)),
        }
    }

    /// A struct schema type.
    #[must_use]
    pub fn schema(schema: StructSchema) -> Self {
        Self::Struct(Arc::new(schema))
    }

    /// A union of alternatives.
    #[must_use]
    pub fn union(variants: Vec<TypeExpr>) -> Self {
        Self::Union(variants)
    }

    /// `ty` or null.
    #[must_use]
    pub fn optional(ty: TypeExpr) -> Self {
        Self::Union(vec![ty, Self::Null])
    }

    /// A streaming upload sink.
    #[must_use]
    pub fn upload() -> Self {
        Self::Upload
    }

    /// The nominal type `T`, resolved against the graph and primitives.
    #[must_use]
    pub fn of<T: Send + Sync + 'static>() -> Self {
        Self::Ident(TypeKey::of::<T>())
    }

    /// Wraps this type in one more metadata layer.
    ///
    /// Later layers override earlier ones for the same concern.
    #[must_use]
    pub fn with(self, annotation: Annotation) -> Self {
        match self {
            Self::Annotated { inner, mut metadata } => {
                metadata.push(annotation);
                Self::Annotated { inner, metadata }
            }
            other => Self::Annotated {
                inner: Box::new(other),
                metadata: vec![annotation],
            },
        }
    }

    /// Shorthand for [`Annotation::Source`].
    #[must_use]
    pub fn from_source(self, source: ParamSource) -> Self {
        self.with(Annotation::Source(source))
    }

    /// Shorthand for [`Annotation::Constrained`].
    #[must_use]
    pub fn constrained(self, constraints: Constraints) -> Self {
        self.with(Annotation::Constrained(constraints))
    }

    /// Shorthand for [`Annotation::Alias`].
    #[must_use]
    pub fn aliased(self, alias: impl Into<String>) -> Self {
        self.with(Annotation::Alias(alias.into()))
    }
}

/// Structured-kind classification of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuredKind {
    /// A named schema with typed fields.
    TaggedStruct,
    /// A keyed aggregate with declared field or value types.
    PlainRecord,
    /// A keyed aggregate without declared value types.
    UntypedMapping,
    /// Not a structured type.
    None,
}

/// The canonical descriptor the introspector produces.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    /// The annotation-free base type. For reduced optionals this is the
    /// single non-null variant; for wider unions, the union itself.
    pub base: TypeExpr,
    /// All metadata layers, in source order (inner layers first).
    pub metadata: Vec<Annotation>,
    /// Whether null is an accepted value.
    pub nullable: bool,
    /// Non-null union variants; empty for non-union types.
    pub variants: Vec<TypeExpr>,
    /// Sequence info: the flavour and element type, when the type (or any
    /// union variant) is a sequence.
    pub sequence: Option<(SeqKind, TypeExpr)>,
    /// The structured-kind classification of the base.
    pub structured: StructuredKind,
}

impl TypeDescriptor {
    fn last<'a, T>(&'a self, pick: impl Fn(&'a Annotation) -> Option<T>) -> Option<T> {
        self.metadata.iter().rev().find_map(pick)
    }

    /// The explicit source role, when pinned.
    #[must_use]
    pub fn source(&self) -> Option<ParamSource> {
        self.last(|a| match a {
            Annotation::Source(source) => Some(*source),
            _ => None,
        })
    }

    /// The wire-name override, when present.
    #[must_use]
    pub fn alias(&self) -> Option<&str> {
        self.last(|a| match a {
            Annotation::Alias(alias) => Some(alias.as_str()),
            _ => None,
        })
    }

    /// All constraint layers merged in order; later layers override.
    #[must_use]
    pub fn constraints(&self) -> Constraints {
        self.metadata
            .iter()
            .fold(Constraints::new(), |acc, a| match a {
                Annotation::Constrained(c) => acc.merged_with(c),
                _ => acc,
            })
    }

    /// The custom textual decoder, when installed; the last one wins.
    #[must_use]
    pub fn text_decoder(&self) -> Option<&TextDecode> {
        self.last(|a| match a {
            Annotation::Decode(decode) => Some(decode),
            _ => None,
        })
    }

    /// The custom body decoder, when installed; the last one wins.
    #[must_use]
    pub fn body_decoder(&self) -> Option<&BodyDecode> {
        self.last(|a| match a {
            Annotation::DecodeBody(decode) => Some(decode),
            _ => None,
        })
    }

    /// The media-type override, when present.
    #[must_use]
    pub fn media_type(&self) -> Option<&str> {
        self.last(|a| match a {
            Annotation::MediaType(media) => Some(media.as_str()),
            _ => None,
        })
    }

    /// The claims an authorization header must carry.
    #[must_use]
    pub fn claims(&self) -> Vec<String> {
        self.last(|a| match a {
            Annotation::Claims(claims) => Some(claims.clone()),
            _ => None,
        })
        .unwrap_or_default()
    }

    /// Whether param-pack expansion is suppressed.
    #[must_use]
    pub fn skip_unpack(&self) -> bool {
        self.metadata
            .iter()
            .any(|a| matches!(a, Annotation::SkipUnpack))
    }

    /// Whether the base (or any variant) is the upload sink.
    #[must_use]
    pub fn is_upload(&self) -> bool {
        matches!(self.base, TypeExpr::Upload)
            || self.variants.iter().any(|v| matches!(v, TypeExpr::Upload))
    }

    /// Whether the base is a structured type.
    #[must_use]
    pub fn is_structured(&self) -> bool {
        self.structured != StructuredKind::None
    }

    /// The nominal key, when the base is an opaque type.
    #[must_use]
    pub fn ident(&self) -> Option<TypeKey> {
        match &self.base {
            TypeExpr::Ident(key) => Some(*key),
            _ => None,
        }
    }
}

fn classify_structured(ty: &TypeExpr) -> StructuredKind {
    match ty {
        TypeExpr::Struct(schema) => {
            if schema.name.is_some() {
                StructuredKind::TaggedStruct
            } else {
                StructuredKind::PlainRecord
            }
        }
        TypeExpr::Mapping { value: Some(_) } => StructuredKind::PlainRecord,
        TypeExpr::Mapping { value: None } => StructuredKind::UntypedMapping,
        TypeExpr::Union(variants) => variants
            .iter()
            .map(classify_structured)
            .find(|kind| *kind != StructuredKind::None)
            .unwrap_or(StructuredKind::None),
        _ => StructuredKind::None,
    }
}

fn find_sequence(ty: &TypeExpr) -> Option<(SeqKind, TypeExpr)> {
    match ty {
        TypeExpr::Seq { kind, item } => Some((*kind, (**item).clone())),
        TypeExpr::Union(variants) => variants.iter().find_map(find_sequence),
        _ => None,
    }
}

/// Flattens annotation layers and classifies a declared type.
///
/// Unwrapping preserves each layer's metadata in source order (inner
/// layers first); a union of one non-null variant plus null reduces to
/// that variant with `nullable = true`.
///
/// # Example
///
/// ```rust
/// use daedalus_sig::typing::{inspect, TypeExpr};
///
/// let descriptor = inspect(&TypeExpr::optional(TypeExpr::list(TypeExpr::string())));
/// assert!(descriptor.nullable);
/// assert!(descriptor.sequence.is_some());
/// ```
#[must_use]
pub fn inspect(ty: &TypeExpr) -> TypeDescriptor {
    let mut metadata = Vec::new();
    let mut current = ty.clone();

    // Unwrap annotation layers outside-in, then reverse so the innermost
    // (leftmost in source) layer comes first.
    let mut layers = Vec::new();
    while let TypeExpr::Annotated { inner, metadata: layer } = current {
        layers.push(layer);
        current = *inner;
    }
    for layer in layers.into_iter().rev() {
        metadata.extend(layer);
    }

    let (base, nullable, variants) = match current {
        TypeExpr::Union(all) => {
            let nullable = all.iter().any(|v| matches!(v, TypeExpr::Null));
            let non_null: Vec<TypeExpr> = all
                .into_iter()
                .filter(|v| !matches!(v, TypeExpr::Null))
                .collect();
            match non_null.len() {
                0 => (TypeExpr::Null, true, Vec::new()),
                1 => {
                    let only = non_null.into_iter().next().expect("one variant");
                    (only, nullable, Vec::new())
                }
                _ => (TypeExpr::Union(non_null.clone()), nullable, non_null),
            }
        }
        other => (other, false, Vec::new()),
    };

    let sequence = find_sequence(&base);
    let structured = classify_structured(&base);

    TypeDescriptor {
        base,
        metadata,
        nullable,
        variants,
        sequence,
        structured,
    }
}
