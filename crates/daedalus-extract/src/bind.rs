//! The parameter binder.
//!
//! Walks a frozen endpoint signature against one request: every textual
//! parameter is extracted from its source and decoded, the body (if any)
//! is read with back-pressure and validated structurally, and all
//! failures are aggregated into a single invalid-request problem with one
//! entry per failed parameter.

use crate::body::{media_type_matches, read_full, BodyStream};
use crate::context::RequestParts;
use crate::form::{parse_form, UploadFile};
use daedalus_core::problem::{ParamLocation, Problem, ProblemKind, ValidationEntry};
use daedalus_sig::{
    conform, BodyDescriptor, EndpointSignature, ParamDescriptor, ParamRole, ViolationKind,
};
use percent_encoding::percent_decode_str;
use std::collections::HashMap;

/// The values the binder produced for one request.
#[derive(Debug, Default)]
pub struct BoundValues {
    /// Decoded data values in declaration order.
    pub data: Vec<(String, serde_json::Value)>,
    /// Uploaded files grouped by field name.
    pub files: HashMap<String, Vec<UploadFile>>,
}

fn location_of(role: ParamRole) -> ParamLocation {
    match role {
        ParamRole::Path => ParamLocation::Path,
        ParamRole::Header => ParamLocation::Header,
        ParamRole::Cookie => ParamLocation::Cookie,
        ParamRole::Body => ParamLocation::Body,
        ParamRole::Form | ParamRole::File => ParamLocation::Form,
        _ => ParamLocation::Query,
    }
}

fn occurrences_for<'a>(
    param: &ParamDescriptor,
    parts: &'a RequestParts,
    query_pairs: &'a [(String, String)],
    cookie_pairs: &'a [(String, String)],
) -> Vec<String> {
    match param.role {
        ParamRole::Path => parts
            .path_params()
            .get(&param.source_key)
            .map(|raw| vec![raw.to_string()])
            .unwrap_or_default(),
        ParamRole::Query => query_pairs
            .iter()
            .filter(|(name, _)| *name == param.source_key)
            .map(|(_, value)| value.clone())
            .collect(),
        ParamRole::Header => parts
            .header_values(&param.source_key)
            .into_iter()
            .map(ToString::to_string)
            .collect(),
        ParamRole::Cookie => cookie_pairs
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case(&param.source_key))
            .map(|(_, value)| value.clone())
            .collect(),
        _ => Vec::new(),
    }
}

fn bind_textual(
    param: &ParamDescriptor,
    occurrences: Vec<String>,
    entries: &mut Vec<ValidationEntry>,
) -> Option<serde_json::Value> {
    let location = location_of(param.role);

    if param.multi_value {
        let mut items = Vec::new();
        let mut failed = false;
        for raw in &occurrences {
            match param.decoder.decode(raw) {
                Ok(item) => items.push(item),
                Err(message) => {
                    failed = true;
                    entries.push(ValidationEntry::invalid(location, &param.name, message));
                }
            }
        }
        if failed {
            return None;
        }
        let value = if items.is_empty() {
            match &param.default {
                Some(default) => default.clone(),
                None => serde_json::Value::Array(Vec::new()),
            }
        } else {
            serde_json::Value::Array(items)
        };
        for message in param.constraints.validate(&value) {
            entries.push(ValidationEntry::invalid(location, &param.name, message));
        }
        return Some(value);
    }

    let Some(raw) = occurrences.first() else {
        if let Some(default) = &param.default {
            return Some(default.clone());
        }
        if param.descriptor.nullable {
            return Some(serde_json::Value::Null);
        }
        entries.push(ValidationEntry::missing(location, &param.name));
        return None;
    };

    match param.decoder.decode(raw) {
        Ok(value) => {
            if !value.is_null() {
                for message in param.constraints.validate(&value) {
                    entries.push(ValidationEntry::invalid(location, &param.name, message));
                }
            }
            Some(value)
        }
        Err(message) => {
            entries.push(ValidationEntry::invalid(location, &param.name, message));
            None
        }
    }
}

fn decode_path_segment(raw: &str, name: &str, entries: &mut Vec<ValidationEntry>) -> Option<String> {
    match percent_decode_str(raw).decode_utf8() {
        Ok(decoded) => Some(decoded.into_owned()),
        Err(_) => {
            entries.push(ValidationEntry::invalid(
                ParamLocation::Path,
                name,
                "invalid percent-encoding",
            ));
            None
        }
    }
}

async fn bind_body(
    descriptor: &BodyDescriptor,
    parts: &RequestParts,
    body: BodyStream,
    max_body_size: usize,
    data: &mut Vec<(String, serde_json::Value)>,
    files: &mut HashMap<String, Vec<UploadFile>>,
    entries: &mut Vec<ValidationEntry>,
) -> Result<(), Problem> {
    if let Some(actual) = parts.content_type() {
        if !media_type_matches(&descriptor.media_type, actual) {
            return Err(Problem::new(ProblemKind::UnsupportedMediaType).with_detail(format!(
                "expected {}, got {}",
                descriptor.media_type, actual
            )));
        }
    }

    if descriptor.role == ParamRole::Form {
        let content_type = parts
            .content_type()
            .map(ToString::to_string)
            .unwrap_or_else(|| descriptor.media_type.clone());
        let parsed = parse_form(body, &content_type, descriptor).await?;
        entries.extend(parsed.entries);
        data.push((descriptor.name.clone(), parsed.value));
        files.extend(parsed.files);
        return Ok(());
    }

    let raw = read_full(body, max_body_size).await?;
    let decoded = match &descriptor.decoder {
        Some(custom) => custom.decode(&raw).map_err(|message| {
            ValidationEntry::invalid(ParamLocation::Body, &descriptor.name, message)
        }),
        None => serde_json::from_slice::<serde_json::Value>(&raw).map_err(|e| {
            ValidationEntry::of_kind(
                ProblemKind::InvalidJsonReceived,
                ParamLocation::Body,
                descriptor.name.clone(),
                e.to_string(),
            )
        }),
    };
    let decoded = match decoded {
        Ok(decoded) => decoded,
        Err(entry) => {
            entries.push(entry);
            return Ok(());
        }
    };

    let mut violations = Vec::new();
    let conformed = conform(&decoded, &descriptor.descriptor.base, "", &mut violations);
    for violation in violations {
        let kind = match violation.kind {
            ViolationKind::Missing => ProblemKind::MissingRequestParam,
            ViolationKind::Invalid => ProblemKind::InvalidParamValue,
        };
        let param = if violation.path.is_empty() {
            descriptor.name.clone()
        } else {
            violation.path
        };
        entries.push(ValidationEntry::of_kind(
            kind,
            ParamLocation::Body,
            param,
            violation.message,
        ));
    }
    data.push((descriptor.name.clone(), conformed));
    Ok(())
}

/// Binds every declared parameter of a signature against one request.
///
/// Validation failures across all parameters are attempted before any
/// error is raised; K invalid parameters yield exactly K entries in the
/// resulting invalid-request problem.
///
/// # Errors
///
/// Returns an aggregate 422 problem for validation failures, a 415 for a
/// content-type mismatch, or a 413 for an oversized body.
pub async fn bind_request(
    signature: &EndpointSignature,
    parts: &RequestParts,
    body: BodyStream,
    max_body_size: usize,
) -> Result<BoundValues, Problem> {
    let mut bound = BoundValues::default();
    let mut entries = Vec::new();

    let query_pairs: Vec<(String, String)> = parts
        .query_string()
        .map(|qs| serde_urlencoded::from_str(qs).unwrap_or_default())
        .unwrap_or_default();
    let cookie_pairs = parts.cookies();

    for param in signature.params.textual() {
        let mut occurrences = occurrences_for(param, parts, &query_pairs, &cookie_pairs);
        if param.role == ParamRole::Path {
            occurrences = occurrences
                .iter()
                .filter_map(|raw| decode_path_segment(raw, &param.name, &mut entries))
                .collect();
        }
        if let Some(value) = bind_textual(param, occurrences, &mut entries) {
            bound.data.push((param.name.clone(), value));
        }
    }

    if let Some(descriptor) = &signature.params.body {
        bind_body(
            descriptor,
            parts,
            body,
            max_body_size,
            &mut bound.data,
            &mut bound.files,
            &mut entries,
        )
        .await?;
    }

    if !entries.is_empty() {
        return Err(Problem::invalid_request(entries));
    }
    Ok(bound)
}
