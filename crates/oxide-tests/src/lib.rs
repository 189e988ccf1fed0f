//! Integration test infrastructure for Oxide CI.
//!
//! This crate provides recording in-memory fakes for every orchestrator
//! port, fixtures for repositories, hooks, and pipeline configuration, and
//! a [`TestContext`] that wires them to the build triggerer, the stage
//! transitions and the cron scheduler.
//!
//! # Usage
//!
//! ```ignore
//! use oxide_tests::{SIMPLE_YAML, TestContext};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let ctx = TestContext::with_yaml(SIMPLE_YAML);
//!     // Use ctx.triggerer(), ctx.store, ctx.scheduler, etc.
//! }
//! ```

pub mod context;
pub mod fakes;
pub mod fixtures;
pub mod helpers;

pub use context::TestContext;
pub use fixtures::*;
pub use helpers::*;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,oxide_tests=debug,oxide_scheduler=debug")),
        )
        .with_test_writer()
        .try_init();
}
