//! arthub core service library.
//!
//! This crate primarily ships the `hubctl` binary, but we expose a small
//! library surface so application code and integration tests can wire the
//! collaborators the same way.

pub mod config;
pub mod external;
pub mod services;

pub use services::Services;
