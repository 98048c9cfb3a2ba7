//! Request binding for Daedalus.
//!
//! The binder takes a frozen [`EndpointSignature`](daedalus_sig::EndpointSignature)
//! and one request's [`RequestParts`] plus body stream, extracts every
//! declared parameter from its source, decodes and validates it, and
//! aggregates all failures into a single invalid-request problem with one
//! entry per failed parameter.

pub mod bind;
pub mod body;
pub mod context;
pub mod form;

pub use bind::{bind_request, BoundValues};
pub use body::{empty_body, full_body, read_full, BodyError, BodyStream};
pub use context::{RequestParts, RequestPartsBuilder};
pub use form::UploadFile;
