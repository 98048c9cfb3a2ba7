//! Multipart form parsing.
//!
//! Form bodies are stream-parsed part by part. Parts that map to upload
//! fields become [`UploadFile`] handles, subject to the declared
//! `max_files` and per-file size limits; the remaining parts are plain
//! fields, decoded and assembled into the declared structured body type.

use crate::body::BodyStream;
use bytes::{Bytes, BytesMut};
use daedalus_core::problem::{ParamLocation, Problem, ProblemKind, ValidationEntry};
use daedalus_sig::decode::scalar_decoder;
use daedalus_sig::typing::{inspect, TypeExpr};
use daedalus_sig::{conform, BodyDescriptor, FormMeta, ViolationKind};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::collections::HashMap;

/// One uploaded file from a multipart form.
///
/// Exposes the original filename, the part's content type, and the bytes
/// as either a buffer or a lazy chunk stream.
#[derive(Debug, Clone)]
pub struct UploadFile {
    field: String,
    filename: Option<String>,
    content_type: Option<String>,
    data: Bytes,
}

impl UploadFile {
    /// Creates an upload handle; used by the form parser and by tests.
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        filename: Option<String>,
        content_type: Option<String>,
        data: Bytes,
    ) -> Self {
        Self {
            field: field.into(),
            filename,
            content_type,
            data,
        }
    }

    /// Returns the form field name the file arrived under.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Returns the client-supplied filename, if any.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Returns the part's content type, if any.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` for an empty file.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the buffered bytes.
    #[must_use]
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// Returns the bytes as a lazy chunk stream.
    #[must_use]
    pub fn stream(&self) -> BoxStream<'static, Bytes> {
        let data = self.data.clone();
        futures_util::stream::once(async move { data }).boxed()
    }
}

/// The outcome of parsing one multipart body.
#[derive(Debug, Default)]
pub struct ParsedForm {
    /// The assembled structured value of the plain fields.
    pub value: serde_json::Value,
    /// Uploaded files grouped by field name, in wire order.
    pub files: HashMap<String, Vec<UploadFile>>,
    /// Per-field validation failures.
    pub entries: Vec<ValidationEntry>,
}

fn is_upload_field(ty: &TypeExpr) -> bool {
    let descriptor = inspect(ty);
    descriptor.is_upload()
        || descriptor
            .sequence
            .as_ref()
            .is_some_and(|(_, item)| inspect(item).is_upload())
}

/// Stream-parses a multipart body against its declared descriptor.
///
/// # Errors
///
/// Returns an unsupported-media-type problem when the boundary is
/// missing; field-level failures are collected into `entries` instead.
pub async fn parse_form(
    body: BodyStream,
    content_type: &str,
    descriptor: &BodyDescriptor,
) -> Result<ParsedForm, Problem> {
    let boundary = multer::parse_boundary(content_type).map_err(|_| {
        Problem::new(ProblemKind::UnsupportedMediaType).with_detail(
            "multipart/form-data with a boundary parameter is required",
        )
    })?;
    let meta = descriptor.form.clone().unwrap_or_default();

    let mut multipart = multer::Multipart::new(body, boundary);
    let mut files: HashMap<String, Vec<UploadFile>> = HashMap::new();
    let mut texts: HashMap<String, Vec<String>> = HashMap::new();
    let mut entries = Vec::new();

    let upload_fields: Vec<String> = match &descriptor.descriptor.base {
        TypeExpr::Struct(schema) => schema
            .fields
            .iter()
            .filter(|f| is_upload_field(&f.ty))
            .map(|f| f.wire_name().to_string())
            .collect(),
        TypeExpr::Upload => vec![descriptor.name.clone()],
        _ => Vec::new(),
    };
    let standalone_upload = matches!(descriptor.descriptor.base, TypeExpr::Upload);

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                entries.push(ValidationEntry::of_kind(
                    ProblemKind::InvalidFormError,
                    ParamLocation::Form,
                    descriptor.name.clone(),
                    format!("malformed multipart body: {e}"),
                ));
                break;
            }
        };
        let Some(name) = field.name().map(ToString::to_string) else {
            continue;
        };

        let treat_as_file =
            upload_fields.contains(&name) || field.file_name().is_some() || standalone_upload;
        if treat_as_file {
            let slot = files.entry(name.clone()).or_default();
            if slot.len() >= meta.max_files {
                entries.push(ValidationEntry::of_kind(
                    ProblemKind::InvalidFormError,
                    ParamLocation::Form,
                    name.clone(),
                    format!("max_files exceeded: at most {} files allowed", meta.max_files),
                ));
                // Drain the part so the parser can continue.
                let mut field = field;
                while matches!(field.chunk().await, Ok(Some(_))) {}
                continue;
            }

            let filename = field.file_name().map(ToString::to_string);
            let part_type = field.content_type().map(ToString::to_string);
            let mut field = field;
            let mut buffer = BytesMut::new();
            let mut oversize = false;
            loop {
                match field.chunk().await {
                    Ok(Some(chunk)) => {
                        if buffer.len() + chunk.len() > meta.max_file_size {
                            oversize = true;
                            // Keep draining so later parts still parse.
                            continue;
                        }
                        buffer.extend_from_slice(&chunk);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        entries.push(ValidationEntry::of_kind(
                            ProblemKind::InvalidFormError,
                            ParamLocation::Form,
                            name.clone(),
                            format!("failed to read file part: {e}"),
                        ));
                        break;
                    }
                }
            }
            if oversize {
                entries.push(ValidationEntry::of_kind(
                    ProblemKind::InvalidFormError,
                    ParamLocation::Form,
                    name.clone(),
                    format!(
                        "max_file_size exceeded: each file is limited to {} bytes",
                        meta.max_file_size
                    ),
                ));
                continue;
            }
            slot.push(UploadFile::new(name, filename, part_type, buffer.freeze()));
        } else {
            match field.text().await {
                Ok(text) => texts.entry(name).or_default().push(text),
                Err(e) => entries.push(ValidationEntry::of_kind(
                    ProblemKind::InvalidFormError,
                    ParamLocation::Form,
                    name,
                    format!("failed to read field: {e}"),
                )),
            }
        }
    }

    let value = assemble(descriptor, &texts, &files, &mut entries);
    Ok(ParsedForm {
        value,
        files,
        entries,
    })
}

fn assemble(
    descriptor: &BodyDescriptor,
    texts: &HashMap<String, Vec<String>>,
    files: &HashMap<String, Vec<UploadFile>>,
    entries: &mut Vec<ValidationEntry>,
) -> serde_json::Value {
    let TypeExpr::Struct(schema) = &descriptor.descriptor.base else {
        if matches!(descriptor.descriptor.base, TypeExpr::Upload) {
            let required = !descriptor.descriptor.nullable;
            if required && files.get(&descriptor.name).map_or(true, Vec::is_empty) {
                entries.push(ValidationEntry::of_kind(
                    ProblemKind::MissingRequestParam,
                    ParamLocation::Form,
                    descriptor.name.clone(),
                    "an uploaded file is required",
                ));
            }
            return serde_json::Value::Null;
        }
        // Untyped mapping: every field as a string, repeats as arrays.
        let mut object = serde_json::Map::new();
        for (name, values) in texts {
            let value = match values.as_slice() {
                [single] => serde_json::Value::String(single.clone()),
                many => serde_json::Value::Array(
                    many.iter()
                        .map(|v| serde_json::Value::String(v.clone()))
                        .collect(),
                ),
            };
            object.insert(name.clone(), value);
        }
        return serde_json::Value::Object(object);
    };

    let mut object = serde_json::Map::new();
    for field in &schema.fields {
        if is_upload_field(&field.ty) {
            let field_descriptor = inspect(&field.ty);
            let count = files.get(field.wire_name()).map_or(0, Vec::len);
            if count == 0 && field.default.is_none() && !field_descriptor.nullable {
                entries.push(ValidationEntry::of_kind(
                    ProblemKind::MissingRequestParam,
                    ParamLocation::Form,
                    field.name.clone(),
                    "an uploaded file is required",
                ));
            }
            continue;
        }

        let field_descriptor = inspect(&field.ty);
        let occurrences = texts.get(field.wire_name());
        match occurrences {
            Some(values) if !values.is_empty() => {
                if let Some((_, item)) = &field_descriptor.sequence {
                    let decoder = scalar_decoder(item, false);
                    let mut decoded = Vec::new();
                    for value in values {
                        match decoder.decode(value) {
                            Ok(item) => decoded.push(item),
                            Err(message) => entries.push(ValidationEntry::of_kind(
                                ProblemKind::InvalidParamValue,
                                ParamLocation::Form,
                                field.name.clone(),
                                message,
                            )),
                        }
                    }
                    object.insert(field.name.clone(), serde_json::Value::Array(decoded));
                } else {
                    let decoder =
                        scalar_decoder(&field_descriptor.base, field_descriptor.nullable);
                    match decoder.decode(&values[0]) {
                        Ok(value) => {
                            object.insert(field.name.clone(), value);
                        }
                        Err(message) => entries.push(ValidationEntry::of_kind(
                            ProblemKind::InvalidParamValue,
                            ParamLocation::Form,
                            field.name.clone(),
                            message,
                        )),
                    }
                }
            }
            _ => {
                // Absent: conform() applies defaults or reports it missing.
            }
        }
    }

    let value = serde_json::Value::Object(object);
    let mut violations = Vec::new();
    let schema_ty = TypeExpr::Struct(schema.clone());
    let conformed = conform(&value, &schema_ty, "", &mut violations);
    for violation in violations {
        let kind = match violation.kind {
            ViolationKind::Missing => ProblemKind::MissingRequestParam,
            ViolationKind::Invalid => ProblemKind::InvalidParamValue,
        };
        // Upload fields are validated above, not by the JSON walker.
        if schema
            .fields
            .iter()
            .any(|f| f.name == violation.path && is_upload_field(&f.ty))
        {
            continue;
        }
        entries.push(ValidationEntry::of_kind(
            kind,
            ParamLocation::Form,
            violation.path,
            violation.message,
        ));
    }
    conformed
}
