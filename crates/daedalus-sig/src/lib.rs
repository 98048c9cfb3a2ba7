//! Endpoint signature analysis for Daedalus.
//!
//! This crate performs the setup-time half of the invocation pipeline:
//!
//! - [`typing`]: the declared-type language ([`TypeExpr`]) and the
//!   introspector that flattens annotation layers into a canonical
//!   [`TypeDescriptor`].
//! - [`constraint`]: the recognised validation predicates and their
//!   collecting validator.
//! - [`decode`]: scalar coercion, boolean wire forms, and the structural
//!   validator for JSON bodies.
//! - [`parser`]: the role-resolution decision table that turns declared
//!   parameters into a frozen [`EndpointSignature`].
//! - [`returns`]: response variant analysis keyed by status code.
//!
//! Everything here runs before the first request; the products are
//! immutable descriptors the runtime binds against.

pub mod constraint;
pub mod decode;
mod error;
pub mod param;
pub mod parser;
pub mod returns;
pub mod signature;
pub mod typing;

pub use constraint::Constraints;
pub use decode::{conform, Violation, ViolationKind};
pub use error::SetupError;
pub use param::{
    BodyDescriptor, DependencyParam, EndpointParams, FormMeta, ParamDescriptor, ParamRole,
    PluginParam, PrimitiveKind,
};
pub use parser::{ParamDecl, SignatureParser};
pub use returns::{Encode, ResponseShape, ReturnSpec, ReturnVariant, StreamFraming};
pub use signature::EndpointSignature;
pub use typing::{
    Annotation, BodyDecode, FieldSchema, ParamSource, Scalar, SeqKind, StructSchema,
    StructuredKind, TextDecode, TypeDescriptor, TypeExpr,
};
