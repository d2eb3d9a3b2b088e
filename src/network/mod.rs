//! Network Module
//!
//! Blocking TCP serving for the Postgres front end, and the termination
//! latch both front ends stop on.
//!
//! ## Architecture
//! - Single non-blocking acceptor loop, stopped by a [`TerminationLatch`]
//! - One thread per accepted connection, capped by `max_connections`
//! - Connections handed to a [`FrontEnd`]

mod connection;
mod latch;
mod server;

pub use connection::{is_disconnect_error, Connection};
pub use latch::TerminationLatch;
pub use server::{FrontEnd, Server};
