//! The transport boundary of Daedalus.
//!
//! An application is an async callable over one immutable connection
//! scope, a receive side producing inbound messages, and a send side
//! consuming outbound messages ([`Service`]). This crate defines those
//! message shapes, the lifespan protocol, in-memory channel endpoints for
//! tests, and a Hyper bridge that drives the callable from real sockets.

pub mod boundary;
mod bridge;
pub mod lifespan;

pub use boundary::{
    write_response, BufferTransmit, ChannelReceive, ConnKind, ConnScope, Inbound, Outbound,
    QueueReceive, Receive, Service, Transmit, TransportError,
};
pub use bridge::Server;
pub use lifespan::{run_shutdown, run_startup, LifespanError};
