// src/remote/mod.rs

//! Remote execution layer.
//!
//! - [`command`] holds the typed command builder and command output.
//! - [`backend`] provides the `RemoteBackend` trait and the `SshBackend`
//!   used in production, which tests replace with an in-memory fleet.
//! - [`gateway`] wraps a backend with the transport retry policy and
//!   cancellation.

pub mod backend;
pub mod command;
pub mod gateway;

pub use backend::{BoxFuture, RemoteBackend, SshBackend, SshOptions, TransportError};
pub use command::{CommandOutput, RemoteCommand};
pub use gateway::RemoteGateway;
