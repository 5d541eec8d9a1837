//! Client side of the live-updates connection.

pub mod policy;
pub mod supervisor;

pub use policy::{BackoffConfig, ConnectionState, Disconnect, ReconnectionPolicy};
pub use supervisor::{Link, Reconciler, SupervisorHandle, Transport, spawn};
