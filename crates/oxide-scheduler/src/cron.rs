//! Cron-driven builds.
//!
//! Each pass lists the jobs that are due, advances their schedule, and
//! triggers a build of the head of the job's branch. A failing job never
//! stops the pass; failures are collected and reported together.

use ::cron::Schedule;
use chrono::{DateTime, Utc};
use oxide_core::cron::Cron;
use oxide_core::ports::{CommitService, CronStore, RepositoryStore, Triggerer, UserStore};
use oxide_core::repo::{Commit, Event, Hook, TRIGGER_CRON};
use oxide_core::{Error, Result};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

#[derive(Debug, thiserror::Error)]
pub enum CronError {
    #[error("cron: cannot list ready jobs: {0}")]
    List(#[source] Error),
    #[error("cron: {} job(s) failed", .0.len())]
    Jobs(Vec<JobFailure>),
}

/// A job that could not be run during a pass.
#[derive(Debug)]
pub struct JobFailure {
    pub name: String,
    pub error: Error,
}

/// Next run of `expr` strictly after `after`.
///
/// Five-field expressions are read with an implicit `0` seconds field.
pub fn next_after(expr: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let expr = expr.trim();
    let normalized = if expr.split_whitespace().count() == 5 {
        format!("0 {}", expr)
    } else {
        expr.to_string()
    };
    let schedule = Schedule::from_str(&normalized)
        .map_err(|e| Error::Config(format!("invalid cron expression {:?}: {}", expr, e)))?;
    schedule
        .after(&after)
        .next()
        .ok_or_else(|| Error::Config(format!("cron expression {:?} never fires again", expr)))
}

/// Hook describing a scheduled build of `commit` on the job's branch.
fn cron_hook(job: &Cron, commit: &Commit) -> Hook {
    Hook {
        trigger: TRIGGER_CRON.to_string(),
        event: Event::Cron,
        link: commit.link.clone(),
        message: commit.message.clone(),
        after: commit.sha.clone(),
        git_ref: format!("refs/heads/{}", job.branch),
        source: job.branch.clone(),
        target: job.branch.clone(),
        author_login: commit.author.login.clone(),
        author_name: commit.author.name.clone(),
        author_email: commit.author.email.clone(),
        author_avatar: commit.author.avatar.clone(),
        sender: commit.author.login.clone(),
        cron: job.name.clone(),
        deployment: job.target.clone(),
        ..Default::default()
    }
}

/// Periodically turns due cron jobs into builds.
pub struct CronScheduler {
    crons: Arc<dyn CronStore>,
    repos: Arc<dyn RepositoryStore>,
    users: Arc<dyn UserStore>,
    commits: Arc<dyn CommitService>,
    triggerer: Arc<dyn Triggerer>,
}

impl CronScheduler {
    pub fn new(
        crons: Arc<dyn CronStore>,
        repos: Arc<dyn RepositoryStore>,
        users: Arc<dyn UserStore>,
        commits: Arc<dyn CommitService>,
        triggerer: Arc<dyn Triggerer>,
    ) -> Self {
        Self {
            crons,
            repos,
            users,
            commits,
            triggerer,
        }
    }

    /// Run a pass every `interval` until `cancel` fires. The first pass
    /// happens one interval after the call.
    pub async fn start(&self, cancel: &CancellationToken, interval: Duration) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("cron: scheduler stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run().await {
                        warn!(error = %e, "cron: pass failed");
                    }
                }
            }
        }
    }

    /// Trigger every job that is due now.
    pub async fn run(&self) -> std::result::Result<(), CronError> {
        let now = Utc::now();
        let jobs = self.crons.ready(now).await.map_err(CronError::List)?;
        debug!(jobs = jobs.len(), "cron: found ready jobs");

        let mut failures = Vec::new();
        for mut job in jobs {
            let span = info_span!("cron", repo = %job.repo_id, name = %job.name);
            let result = self.run_job(&mut job, now).instrument(span).await;
            if let Err(error) = result {
                failures.push(JobFailure {
                    name: job.name,
                    error,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CronError::Jobs(failures))
        }
    }

    async fn run_job(&self, job: &mut Cron, now: DateTime<Utc>) -> Result<()> {
        if job.disabled {
            debug!("cron: skipping disabled job");
            return Ok(());
        }

        let next = next_after(&job.expr, now).inspect_err(|e| {
            warn!(expr = %job.expr, error = %e, "cron: cannot parse expression");
        })?;
        job.prev = Some(job.next);
        job.next = next;
        self.crons.update(job).await.inspect_err(|e| {
            warn!(error = %e, "cron: cannot update next execution time");
        })?;

        let repo = self.repos.find(job.repo_id).await.inspect_err(|e| {
            warn!(error = %e, "cron: cannot find repository");
        })?;
        let user = self.users.find(repo.user_id).await.inspect_err(|e| {
            warn!(error = %e, "cron: cannot find repository owner");
        })?;
        let commit = self
            .commits
            .find_ref(&user, &repo.slug, &job.branch)
            .await
            .inspect_err(|e| {
                warn!(branch = %job.branch, error = %e, "cron: cannot find commit");
            })?;

        let hook = cron_hook(job, &commit);
        self.triggerer
            .trigger(&repo, &hook)
            .await
            .inspect_err(|e| warn!(error = %e, "cron: cannot trigger build"))?;

        info!(next = %job.next, "cron: build triggered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use oxide_core::ids::RepoId;
    use oxide_core::repo::CommitAuthor;
    use pretty_assertions::assert_eq;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_five_field_expression() {
        let next = next_after("0 0 * * *", at(12, 30)).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_six_field_expression_and_shorthand() {
        assert_eq!(next_after("0 15 * * * *", at(12, 30)).unwrap(), at(13, 15));
        assert_eq!(next_after("@hourly", at(12, 30)).unwrap(), at(13, 0));
    }

    #[test]
    fn test_next_is_strictly_after() {
        assert_eq!(next_after("0 * * * *", at(12, 0)).unwrap(), at(13, 0));
    }

    #[test]
    fn test_invalid_expression() {
        let err = next_after("A B C D E", at(12, 0)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("A B C D E"));
    }

    #[test]
    fn test_cron_hook() {
        let mut job = Cron::new(RepoId::new(), "nightly", "0 0 * * *", "develop");
        job.target = "staging".to_string();
        let commit = Commit {
            sha: "7fd1a60b01f91b314f59955a4e4d4e80d8edf11d".to_string(),
            message: "first commit".to_string(),
            link: "https://github.com/octocat/hello-world/commit/7fd1a60".to_string(),
            author: CommitAuthor {
                login: "octocat".to_string(),
                name: "The Octocat".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };

        let hook = cron_hook(&job, &commit);
        assert_eq!(hook.trigger, "@cron");
        assert_eq!(hook.event, Event::Cron);
        assert_eq!(hook.git_ref, "refs/heads/develop");
        assert_eq!(hook.target, "develop");
        assert_eq!(hook.after, commit.sha);
        assert_eq!(hook.message, "first commit");
        assert_eq!(hook.sender, "octocat");
        assert_eq!(hook.author_name, "The Octocat");
        assert_eq!(hook.cron, "nightly");
        assert_eq!(hook.deployment, "staging");
        assert!(!hook.is_webhook());
    }
}
