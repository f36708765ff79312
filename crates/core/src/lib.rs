//! Domain types and seams for the fleetrun execution engine.
//!
//! This crate carries no I/O. It defines the environment/account/
//! instance/execution data model, the error taxonomy, the transport
//! traits implemented by the AWS adapters in `fleetrun-aws`, and the
//! engine configuration.

pub mod config;
pub mod credential;
pub mod error;
pub mod execution;
pub mod instance;
pub mod script;
pub mod transport;
pub mod types;
