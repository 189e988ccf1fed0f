//! Scheduled builds.

use crate::ids::{CronId, RepoId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named schedule that periodically builds the head of a branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cron {
    pub id: CronId,
    pub repo_id: RepoId,
    /// Exposed to trigger conditions as the `cron` axis.
    pub name: String,
    /// Standard five-field expression, a six-field expression with
    /// seconds, or a shorthand such as `@daily`.
    pub expr: String,
    pub next: DateTime<Utc>,
    pub prev: Option<DateTime<Utc>>,
    pub branch: String,
    /// Deployment target, if the job deploys.
    pub target: String,
    pub disabled: bool,
}

impl Cron {
    /// A job that is due immediately.
    pub fn new(
        repo_id: RepoId,
        name: impl Into<String>,
        expr: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            id: CronId::new(),
            repo_id,
            name: name.into(),
            expr: expr.into(),
            next: Utc::now(),
            prev: None,
            branch: branch.into(),
            target: String::new(),
            disabled: false,
        }
    }
}
