//! Dependency graph for the Daedalus framework.
//!
//! A [`Graph`] is a registry of factories keyed by [`TypeKey`], each with a
//! declared [`Lifetime`] and dependency list. At application setup the graph
//! is frozen and per-endpoint resolution [`Plan`]s are computed: a
//! topological order over the transitive dependencies, with cycles rejected
//! up front. At request time a [`Resolver`] serves non-scoped endpoints from
//! process-wide caches, while scoped endpoints open a child [`Scope`] that
//! enters resources in dependency order and releases them in reverse on
//! every exit path.

mod error;
mod graph;
mod key;
mod plan;
mod scope;

pub use error::{GraphError, ResolveError};
pub use graph::{Graph, Instance, Lifetime, Provided, ReleaseFn, Resolved};
pub use key::TypeKey;
pub use plan::Plan;
pub use scope::{Resolver, Scope};
