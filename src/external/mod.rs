//! Remote host abstractions
//!
//! Trait-based access to the batch server, so the batch runner can be tested
//! without a real SSH endpoint.

pub mod command;
pub mod ssh;

pub use command::{CommandOutput, RemoteExecutionGateway, RemoteSession};
pub use ssh::SshRemoteGateway;
