//! Response variant analysis.
//!
//! The declared return type is unwrapped into one or more
//! [`ReturnVariant`]s keyed by status code. A union whose arms carry
//! status or shape annotations yields one variant per arm; a bare union is
//! a single JSON variant. The empty sentinel forbids a body and sends the
//! declared status with zero-length content.

use crate::error::SetupError;
use crate::typing::{inspect, Annotation, TypeDescriptor, TypeExpr};
use bytes::Bytes;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// The wire shape of one response variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// A JSON document.
    Json,
    /// Plain text.
    Text,
    /// An HTML document.
    Html,
    /// Raw bytes.
    Bytes,
    /// No body at all.
    Empty,
    /// A lazy stream of server-sent events.
    EventStream,
    /// A lazy stream of JSON values.
    JsonStream,
}

/// How a JSON stream frames its elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamFraming {
    /// One compact JSON document per line.
    #[default]
    NewlineDelimited,
    /// A decimal length prefix and colon before each document.
    LengthPrefixed,
}

/// An encoder from decoded value to response bytes.
///
/// The label keeps variants printable and comparable across re-parses.
#[derive(Clone)]
pub struct Encode {
    label: &'static str,
    encode: Arc<dyn Fn(&serde_json::Value) -> Result<Bytes, String> + Send + Sync>,
}

impl Encode {
    fn new(
        label: &'static str,
        encode: impl Fn(&serde_json::Value) -> Result<Bytes, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            label,
            encode: Arc::new(encode),
        }
    }

    /// Returns the encoder label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Encodes a value.
    ///
    /// # Errors
    ///
    /// Returns a message when the value cannot be represented.
    pub fn encode(&self, value: &serde_json::Value) -> Result<Bytes, String> {
        (self.encode)(value)
    }

    fn json() -> Self {
        Self::new("json", |value| {
            serde_json::to_vec(value)
                .map(Bytes::from)
                .map_err(|e| e.to_string())
        })
    }

    fn text() -> Self {
        Self::new("text", |value| match value {
            serde_json::Value::String(text) => Ok(Bytes::from(text.clone())),
            other => Ok(Bytes::from(other.to_string())),
        })
    }

    fn raw() -> Self {
        Self::new("bytes", |value| match value {
            serde_json::Value::String(text) => Ok(Bytes::from(text.clone().into_bytes())),
            _ => Err("byte responses require a string value".to_string()),
        })
    }

    fn empty() -> Self {
        Self::new("empty", |_| Ok(Bytes::new()))
    }
}

impl fmt::Debug for Encode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Encode({})", self.label)
    }
}

impl PartialEq for Encode {
    fn eq(&self, other: &Self) -> bool {
        self.label == other.label
    }
}

/// One possible response of an endpoint, keyed by status.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnVariant {
    /// The status code this variant answers with.
    pub status: u16,
    /// The content type, when a body is present.
    pub media_type: Option<String>,
    /// The wire shape.
    pub shape: ResponseShape,
    /// Element framing for JSON stream variants.
    pub framing: StreamFraming,
    /// The value encoder.
    pub encoder: Encode,
    /// The declared value type, when the variant carries one.
    pub declared: Option<TypeExpr>,
}

/// The parsed response surface of an endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnSpec {
    /// Variants keyed by status, in declaration order.
    pub variants: IndexMap<u16, ReturnVariant>,
    /// The status used when the handler does not pick one.
    pub default_status: u16,
    /// Whether any variant is a streaming producer.
    pub streaming: bool,
}

impl ReturnSpec {
    /// Returns the variant for a status, falling back to the default.
    #[must_use]
    pub fn variant_for(&self, status: Option<u16>) -> Option<&ReturnVariant> {
        match status {
            Some(code) => self
                .variants
                .get(&code)
                .or_else(|| self.variants.get(&self.default_status)),
            None => self.variants.get(&self.default_status),
        }
    }

    /// Returns the default variant.
    #[must_use]
    pub fn default_variant(&self) -> Option<&ReturnVariant> {
        self.variants.get(&self.default_status)
    }
}

/// Declares a JSON response of `ty` with a status code.
#[must_use]
pub fn resp(ty: TypeExpr, status: u16) -> TypeExpr {
    ty.with(Annotation::Shape(ResponseShape::Json))
        .with(Annotation::Status(status))
}

/// Declares the empty sentinel with a status code.
#[must_use]
pub fn empty(status: u16) -> TypeExpr {
    TypeExpr::Null
        .with(Annotation::Shape(ResponseShape::Empty))
        .with(Annotation::Status(status))
}

/// Declares a plain-text response.
#[must_use]
pub fn text_resp(status: u16) -> TypeExpr {
    TypeExpr::string()
        .with(Annotation::Shape(ResponseShape::Text))
        .with(Annotation::Status(status))
}

/// Declares an HTML response.
#[must_use]
pub fn html_resp(status: u16) -> TypeExpr {
    TypeExpr::string()
        .with(Annotation::Shape(ResponseShape::Html))
        .with(Annotation::Status(status))
}

/// Declares a static-bytes response.
#[must_use]
pub fn bytes_resp(status: u16) -> TypeExpr {
    TypeExpr::raw_bytes()
        .with(Annotation::Shape(ResponseShape::Bytes))
        .with(Annotation::Status(status))
}

/// Declares a server-sent-event stream.
#[must_use]
pub fn sse_stream() -> TypeExpr {
    TypeExpr::mapping().with(Annotation::Shape(ResponseShape::EventStream))
}

/// Declares a newline-delimited JSON stream of `item`.
#[must_use]
pub fn json_stream(item: TypeExpr) -> TypeExpr {
    TypeExpr::list(item).with(Annotation::Shape(ResponseShape::JsonStream))
}

fn default_media_type(shape: ResponseShape) -> Option<&'static str> {
    match shape {
        ResponseShape::Json => Some("application/json"),
        ResponseShape::Text => Some("text/plain; charset=utf-8"),
        ResponseShape::Html => Some("text/html; charset=utf-8"),
        ResponseShape::Bytes => Some("application/octet-stream"),
        ResponseShape::Empty => None,
        ResponseShape::EventStream => Some("text/event-stream"),
        ResponseShape::JsonStream => Some("application/x-ndjson"),
    }
}

fn encoder_for(shape: ResponseShape) -> Encode {
    match shape {
        ResponseShape::Json | ResponseShape::JsonStream | ResponseShape::EventStream => {
            Encode::json()
        }
        ResponseShape::Text | ResponseShape::Html => Encode::text(),
        ResponseShape::Bytes => Encode::raw(),
        ResponseShape::Empty => Encode::empty(),
    }
}

const BODYLESS: [u16; 3] = [204, 205, 304];

fn parse_variant(descriptor: &TypeDescriptor) -> Result<ReturnVariant, SetupError> {
    let shape = descriptor
        .metadata
        .iter()
        .rev()
        .find_map(|a| match a {
            Annotation::Shape(shape) => Some(*shape),
            _ => None,
        })
        .unwrap_or(ResponseShape::Json);

    let status = descriptor
        .metadata
        .iter()
        .rev()
        .find_map(|a| match a {
            Annotation::Status(status) => Some(*status),
            _ => None,
        })
        .unwrap_or(match shape {
            ResponseShape::Empty => 204,
            _ => 200,
        });

    if (status < 200 || BODYLESS.contains(&status)) && shape != ResponseShape::Empty {
        return Err(SetupError::StatusConflict { status });
    }

    let framing = descriptor
        .metadata
        .iter()
        .rev()
        .find_map(|a| match a {
            Annotation::Framing(framing) => Some(*framing),
            _ => None,
        })
        .unwrap_or_default();

    let media_type = descriptor
        .media_type()
        .map(ToString::to_string)
        .or_else(|| default_media_type(shape).map(ToString::to_string));

    let declared = match shape {
        ResponseShape::Empty => None,
        _ => Some(descriptor.base.clone()),
    };

    Ok(ReturnVariant {
        status,
        media_type,
        shape,
        framing,
        encoder: encoder_for(shape),
        declared,
    })
}

fn has_variant_marks(descriptor: &TypeDescriptor) -> bool {
    descriptor
        .metadata
        .iter()
        .any(|a| matches!(a, Annotation::Shape(_) | Annotation::Status(_)))
}

/// Parses the declared return type into status-keyed variants.
///
/// # Errors
///
/// Fails on mixed annotated/bare unions and on bodyless statuses paired
/// with non-empty shapes.
pub fn parse_returns(ret: Option<&TypeExpr>) -> Result<ReturnSpec, SetupError> {
    let Some(ret) = ret else {
        let variant = parse_variant(&inspect(&TypeExpr::mapping()))?;
        let mut variants = IndexMap::new();
        variants.insert(variant.status, variant);
        return Ok(ReturnSpec {
            variants,
            default_status: 200,
            streaming: false,
        });
    };

    let top = inspect(ret);
    let arm_descriptors: Vec<TypeDescriptor> = match (&top.base, top.metadata.is_empty()) {
        // A bare union: arms may carry their own variant marks.
        (TypeExpr::Union(arms), true) => arms.iter().map(inspect).collect(),
        _ => Vec::new(),
    };

    let parsed: Vec<ReturnVariant> = if arm_descriptors.is_empty() {
        vec![parse_variant(&top)?]
    } else {
        let marked = arm_descriptors.iter().filter(|d| has_variant_marks(d)).count();
        if marked == 0 {
            vec![parse_variant(&top)?]
        } else if marked != arm_descriptors.len() {
            return Err(SetupError::MixedReturnVariants);
        } else {
            arm_descriptors
                .iter()
                .map(parse_variant)
                .collect::<Result<_, _>>()?
        }
    };

    let default_status = parsed.first().map_or(200, |v| v.status);
    let streaming = parsed
        .iter()
        .any(|v| matches!(v.shape, ResponseShape::EventStream | ResponseShape::JsonStream));
    let mut variants = IndexMap::new();
    for variant in parsed {
        variants.insert(variant.status, variant);
    }

    Ok(ReturnSpec {
        variants,
        default_status,
        streaming,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_return_is_json_200() {
        let spec = parse_returns(None).unwrap();
        assert_eq!(spec.default_status, 200);
        let variant = spec.default_variant().unwrap();
        assert_eq!(variant.shape, ResponseShape::Json);
        assert_eq!(variant.media_type.as_deref(), Some("application/json"));
    }

    #[test]
    fn test_single_annotated_variant() {
        let ty = resp(TypeExpr::mapping(), 201);
        let spec = parse_returns(Some(&ty)).unwrap();
        assert_eq!(spec.default_status, 201);
        assert_eq!(spec.variants.len(), 1);
    }

    #[test]
    fn test_union_of_variants_keyed_by_status() {
        let ty = TypeExpr::union(vec![resp(TypeExpr::mapping(), 200), empty(204)]);
        let spec = parse_returns(Some(&ty)).unwrap();
        assert_eq!(spec.variants.len(), 2);
        assert_eq!(spec.default_status, 200);
        assert_eq!(spec.variants[&204].shape, ResponseShape::Empty);
    }

    #[test]
    fn test_mixed_union_is_rejected() {
        let ty = TypeExpr::union(vec![resp(TypeExpr::mapping(), 200), TypeExpr::string()]);
        let err = parse_returns(Some(&ty)).unwrap_err();
        assert!(matches!(err, SetupError::MixedReturnVariants));
    }

    #[test]
    fn test_bare_union_is_single_json_variant() {
        let ty = TypeExpr::union(vec![TypeExpr::integer(), TypeExpr::string()]);
        let spec = parse_returns(Some(&ty)).unwrap();
        assert_eq!(spec.variants.len(), 1);
        assert_eq!(spec.default_status, 200);
    }

    #[test]
    fn test_empty_forbids_body_status_conflict() {
        let ty = TypeExpr::mapping()
            .with(Annotation::Shape(ResponseShape::Json))
            .with(Annotation::Status(204));
        let err = parse_returns(Some(&ty)).unwrap_err();
        assert!(matches!(err, SetupError::StatusConflict { status: 204 }));
    }

    #[test]
    fn test_empty_variant_has_no_media_type() {
        let spec = parse_returns(Some(&empty(204))).unwrap();
        let variant = spec.default_variant().unwrap();
        assert_eq!(variant.media_type, None);
        assert_eq!(variant.encoder.encode(&json!("anything")).unwrap().len(), 0);
    }

    #[test]
    fn test_sse_stream_marks_streaming() {
        let spec = parse_returns(Some(&sse_stream())).unwrap();
        assert!(spec.streaming);
        let variant = spec.default_variant().unwrap();
        assert_eq!(variant.media_type.as_deref(), Some("text/event-stream"));
    }

    #[test]
    fn test_json_stream_default_framing() {
        let spec = parse_returns(Some(&json_stream(TypeExpr::mapping()))).unwrap();
        let variant = spec.default_variant().unwrap();
        assert_eq!(variant.shape, ResponseShape::JsonStream);
        assert_eq!(variant.framing, StreamFraming::NewlineDelimited);
        assert_eq!(variant.media_type.as_deref(), Some("application/x-ndjson"));
    }

    #[test]
    fn test_text_encoder() {
        let spec = parse_returns(Some(&text_resp(200))).unwrap();
        let encoder = &spec.default_variant().unwrap().encoder;
        assert_eq!(encoder.encode(&json!("plain")).unwrap(), Bytes::from("plain"));
    }

    #[test]
    fn test_json_roundtrip() {
        let spec = parse_returns(Some(&resp(TypeExpr::mapping(), 200))).unwrap();
        let value = json!({"id": "p", "q": 5});
        let bytes = spec.default_variant().unwrap().encoder.encode(&value).unwrap();
        let decoded: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_variant_for_falls_back_to_default() {
        let ty = TypeExpr::union(vec![resp(TypeExpr::mapping(), 200), empty(204)]);
        let spec = parse_returns(Some(&ty)).unwrap();
        assert_eq!(spec.variant_for(Some(204)).unwrap().status, 204);
        assert_eq!(spec.variant_for(Some(418)).unwrap().status, 200);
        assert_eq!(spec.variant_for(None).unwrap().status, 200);
    }
}
