//! Oxide CI Core
//!
//! Core domain types, ports, and error handling for the Oxide CI build
//! orchestrator. This crate has no I/O of its own and defines the shared
//! vocabulary used by the scheduler and its adapters.

pub mod build;
pub mod cron;
pub mod error;
pub mod ids;
pub mod manifest;
pub mod ports;
pub mod repo;
pub mod status;

pub use error::{Error, Result};
pub use ids::*;
pub use status::Status;
