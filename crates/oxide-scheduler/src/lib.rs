//! Build assembly and stage orchestration for Oxide CI.
//!
//! Turns inbound hooks into builds ([`trigger`]), filters pipeline documents
//! against the event ([`triggers`]), resolves stage ordering ([`dag`]), and
//! drives the approve/decline/restart transitions of existing stages
//! ([`transitions`]). Scheduled builds are started by [`cron`].

pub mod config;
pub mod cron;
pub mod dag;
pub mod lint;
pub mod queue;
pub mod signer;
pub mod tasks;
pub mod transitions;
pub mod trigger;
pub mod triggers;

pub use config::OrchestratorConfig;
pub use cron::{CronError, CronScheduler};
pub use dag::{DagError, DependencyGraph};
pub use lint::ManifestLinter;
pub use queue::StageQueue;
pub use signer::HmacSigner;
pub use tasks::BackgroundTasks;
pub use transitions::StageTransitions;
pub use trigger::{BuildTriggerer, TriggerPorts};
