//! Scalar coercion and structural validation.
//!
//! Textual parameters decode through [`scalar_decoder`], which coerces one
//! wire string into a typed JSON value. Structured bodies run through
//! [`conform`], which walks the declared type, fills defaults, applies
//! constraints, and collects every violation instead of stopping at the
//! first one.

use crate::constraint::Constraints;
use crate::typing::{Annotation, Scalar, TypeExpr};

/// Boolean wire spellings that decode to `true`.
const TRUE_WORDS: [&str; 4] = ["1", "true", "yes", "on"];
/// Boolean wire spellings that decode to `false`.
const FALSE_WORDS: [&str; 4] = ["0", "false", "no", "off"];

/// A parameter decoder: one wire string to a typed JSON value.
pub use crate::typing::TextDecode;

fn decode_scalar(raw: &str, scalar: Scalar) -> Result<serde_json::Value, String> {
    match scalar {
        Scalar::Str | Scalar::Bytes => Ok(serde_json::Value::String(raw.to_string())),
        Scalar::Int => raw
            .parse::<i64>()
            .map(serde_json::Value::from)
            .map_err(|_| format!("expected an integer, got {raw:?}")),
        Scalar::Float => raw
            .parse::<f64>()
            .map(serde_json::Value::from)
            .map_err(|_| format!("expected a number, got {raw:?}")),
        Scalar::Bool => {
            let lowered = raw.to_ascii_lowercase();
            if TRUE_WORDS.contains(&lowered.as_str()) {
                Ok(serde_json::Value::Bool(true))
            } else if FALSE_WORDS.contains(&lowered.as_str()) {
                Ok(serde_json::Value::Bool(false))
            } else {
                Err(format!("expected a boolean, got {raw:?}"))
            }
        }
    }
}

fn decode_value(raw: &str, ty: &TypeExpr, nullable: bool) -> Result<serde_json::Value, String> {
    if nullable && raw == "null" {
        return Ok(serde_json::Value::Null);
    }
    match ty {
        TypeExpr::Scalar(scalar) => decode_scalar(raw, *scalar),
        TypeExpr::Union(variants) => {
            for variant in variants {
                if matches!(variant, TypeExpr::Null) {
                    if raw == "null" {
                        return Ok(serde_json::Value::Null);
                    }
                    continue;
                }
                if let Ok(value) = decode_value(raw, variant, false) {
                    return Ok(value);
                }
            }
            Err(format!("value {raw:?} matches no union variant"))
        }
        TypeExpr::Null => {
            if raw == "null" {
                Ok(serde_json::Value::Null)
            } else {
                Err(format!("expected null, got {raw:?}"))
            }
        }
        TypeExpr::Annotated { inner, .. } => decode_value(raw, inner, nullable),
        other => Err(format!("type {other:?} cannot decode from text")),
    }
}

fn label_of(ty: &TypeExpr) -> String {
    match ty {
        TypeExpr::Scalar(Scalar::Str) => "str".to_string(),
        TypeExpr::Scalar(Scalar::Int) => "int".to_string(),
        TypeExpr::Scalar(Scalar::Float) => "float".to_string(),
        TypeExpr::Scalar(Scalar::Bool) => "bool".to_string(),
        TypeExpr::Scalar(Scalar::Bytes) => "bytes".to_string(),
        TypeExpr::Seq { item, .. } => format!("seq<{}>", label_of(item)),
        TypeExpr::Union(variants) => {
            let labels: Vec<String> = variants.iter().map(label_of).collect();
            format!("union<{}>", labels.join("|"))
        }
        TypeExpr::Null => "null".to_string(),
        TypeExpr::Mapping { .. } => "mapping".to_string(),
        TypeExpr::Struct(schema) => schema
            .name
            .clone()
            .unwrap_or_else(|| "record".to_string()),
        TypeExpr::Upload => "upload".to_string(),
        TypeExpr::Ident(key) => key.short_name().to_string(),
        TypeExpr::Annotated { inner, .. } => label_of(inner),
    }
}

/// Builds the scalar-coercion decoder for a textual parameter.
///
/// The decoder handles one occurrence; the binder assembles sequences
/// from repeated occurrences itself.
#[must_use]
pub fn scalar_decoder(ty: &TypeExpr, nullable: bool) -> TextDecode {
    let label = if nullable {
        format!("{}?", label_of(ty))
    } else {
        label_of(ty)
    };
    let ty = ty.clone();
    TextDecode::new(label, move |raw| decode_value(raw, &ty, nullable))
}

/// How a structural check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// A required field was absent.
    Missing,
    /// A present value was of the wrong type or violated a constraint.
    Invalid,
}

/// One structural or constraint violation, with the field path.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    /// Dotted path to the failing field; empty for the top value.
    pub path: String,
    /// Whether the field was missing or invalid.
    pub kind: ViolationKind,
    /// Human-readable message.
    pub message: String,
}

impl Violation {
    fn missing(path: &str) -> Self {
        Self {
            path: path.to_string(),
            kind: ViolationKind::Missing,
            message: "field is required".to_string(),
        }
    }

    fn invalid(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            kind: ViolationKind::Invalid,
            message: message.into(),
        }
    }
}

fn join(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{path}.{field}")
    }
}

/// Validates a decoded value against a declared type, filling defaults.
///
/// Returns the normalized value; every violation found anywhere in the
/// tree is appended to `out`, so K invalid fields produce exactly K
/// entries.
pub fn conform(
    value: &serde_json::Value,
    ty: &TypeExpr,
    path: &str,
    out: &mut Vec<Violation>,
) -> serde_json::Value {
    match ty {
        TypeExpr::Annotated { inner, metadata } => {
            let before = out.len();
            let conformed = conform(value, inner, path, out);
            if out.len() == before {
                let constraints = metadata
                    .iter()
                    .fold(Constraints::new(), |acc, a| match a {
                        Annotation::Constrained(c) => acc.merged_with(c),
                        _ => acc,
                    });
                for message in constraints.validate(&conformed) {
                    out.push(Violation::invalid(path, message));
                }
            }
            conformed
        }
        TypeExpr::Scalar(scalar) => {
            let ok = match scalar {
                Scalar::Str | Scalar::Bytes => value.is_string(),
                Scalar::Int => value.is_i64() || value.is_u64(),
                Scalar::Float => value.is_number(),
                Scalar::Bool => value.is_boolean(),
            };
            if !ok {
                out.push(Violation::invalid(
                    path,
                    format!("expected {}", label_of(ty)),
                ));
            }
            value.clone()
        }
        TypeExpr::Seq { item, .. } => match value.as_array() {
            Some(items) => {
                let conformed: Vec<serde_json::Value> = items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| conform(v, item, &join(path, &i.to_string()), out))
                    .collect();
                serde_json::Value::Array(conformed)
            }
            None => {
                out.push(Violation::invalid(path, "expected an array"));
                value.clone()
            }
        },
        TypeExpr::Mapping { value: value_ty } => match value.as_object() {
            Some(entries) => match value_ty {
                Some(value_ty) => {
                    let conformed: serde_json::Map<String, serde_json::Value> = entries
                        .iter()
                        .map(|(k, v)| (k.clone(), conform(v, value_ty, &join(path, k), out)))
                        .collect();
                    serde_json::Value::Object(conformed)
                }
                None => value.clone(),
            },
            None => {
                out.push(Violation::invalid(path, "expected an object"));
                value.clone()
            }
        },
        TypeExpr::Struct(schema) => match value.as_object() {
            Some(entries) => {
                let mut conformed = serde_json::Map::new();
                for field in &schema.fields {
                    let present = entries
                        .get(field.wire_name())
                        .or_else(|| entries.get(&field.name));
                    match present {
                        Some(found) => {
                            let field_path = join(path, &field.name);
                            conformed.insert(
                                field.name.clone(),
                                conform(found, &field.ty, &field_path, out),
                            );
                        }
                        None => match &field.default {
                            Some(default) => {
                                conformed.insert(field.name.clone(), default.clone());
                            }
                            None => {
                                let descriptor = crate::typing::inspect(&field.ty);
                                if descriptor.nullable {
                                    conformed
                                        .insert(field.name.clone(), serde_json::Value::Null);
                                } else {
                                    out.push(Violation::missing(&join(path, &field.name)));
                                }
                            }
                        },
                    }
                }
                serde_json::Value::Object(conformed)
            }
            None => {
                out.push(Violation::invalid(path, "expected an object"));
                value.clone()
            }
        },
        TypeExpr::Union(variants) => {
            if value.is_null() && variants.iter().any(|v| matches!(v, TypeExpr::Null)) {
                return serde_json::Value::Null;
            }
            for variant in variants {
                if matches!(variant, TypeExpr::Null) {
                    continue;
                }
                let mut probe = Vec::new();
                let conformed = conform(value, variant, path, &mut probe);
                if probe.is_empty() {
                    return conformed;
                }
            }
            out.push(Violation::invalid(path, "matches no union variant"));
            value.clone()
        }
        TypeExpr::Null => {
            if !value.is_null() {
                out.push(Violation::invalid(path, "expected null"));
            }
            serde_json::Value::Null
        }
        TypeExpr::Upload => {
            out.push(Violation::invalid(
                path,
                "file fields are only allowed in multipart forms",
            ));
            value.clone()
        }
        TypeExpr::Ident(key) => {
            out.push(Violation::invalid(
                path,
                format!("opaque type {} cannot appear in a body", key.short_name()),
            ));
            value.clone()
        }
    }
}
