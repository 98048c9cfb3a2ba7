//! Core types for the Daedalus framework.
//!
//! This crate holds the pieces every other Daedalus crate builds on:
//!
//! - [`problem`]: the RFC 9457 Problem Details taxonomy and the
//!   exception-to-response mapper.
//! - [`response`]: the framework-level [`Response`] and body model.
//! - [`handler`]: the dynamic handler contract with [`Args`], [`Reply`],
//!   and the [`Handler`] trait.
//! - [`bus`]: the in-process event bus.
//! - [`executor`]: the bounded pool for synchronous user code.

pub mod auth;
pub mod bus;
pub mod executor;
pub mod handler;
pub mod meta;
pub mod problem;
pub mod response;

pub use auth::AuthScheme;
pub use bus::{BusTerminal, EventBus, EventRegistry};
pub use executor::SyncExecutor;
pub use handler::{ArcHandler, Args, Handler, HandlerError, Reply};
pub use meta::RequestMeta;
pub use problem::{
    ParamLocation, Problem, ProblemDetail, ProblemKind, ProblemMapper, Solver, ValidationEntry,
    PROBLEM_CONTENT_TYPE,
};
pub use response::{Response, ResponseBody};
