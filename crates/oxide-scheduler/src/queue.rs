//! In-memory stage queue.

use async_trait::async_trait;
use oxide_core::build::Stage;
use oxide_core::ids::{BuildId, RepoId, StageId};
use oxide_core::ports::{Filter, Scheduler};
use oxide_core::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How long a cancelled build is remembered.
pub const CANCEL_TTL: Duration = Duration::from_secs(5 * 60);

/// Queue state guarded by [`StageQueue`].
#[derive(Debug, Default)]
struct QueueState {
    /// Ordered oldest first: by build, then by stage number.
    pending: BTreeMap<(BuildId, u32), Stage>,
    running: HashMap<StageId, Stage>,
    /// Cancelled builds and when they may be forgotten.
    cancelled: HashMap<BuildId, Instant>,
    paused: bool,
}

impl QueueState {
    /// Remove and return the oldest stage that matches `filter` and fits
    /// within its concurrency limits.
    fn dequeue(&mut self, filter: &Filter) -> Option<Stage> {
        let key = self
            .pending
            .iter()
            .find(|(_, stage)| matches_filter(stage, filter) && self.can_execute(stage))
            .map(|(key, _)| *key)?;
        let stage = self.pending.remove(&key)?;
        self.running.insert(stage.id, stage.clone());
        Some(stage)
    }

    fn can_execute(&self, stage: &Stage) -> bool {
        if stage.limit > 0 && self.running_named(stage.repo_id, &stage.name) >= stage.limit as usize
        {
            return false;
        }
        if stage.limit_repo > 0 && self.running_in_repo(stage.repo_id) >= stage.limit_repo as usize {
            return false;
        }
        true
    }

    fn prune_cancelled(&mut self, now: Instant) {
        self.cancelled.retain(|_, expires| *expires > now);
    }

    fn running_named(&self, repo_id: RepoId, name: &str) -> usize {
        self.running
            .values()
            .filter(|s| s.repo_id == repo_id && s.name == name)
            .count()
    }

    fn running_in_repo(&self, repo_id: RepoId) -> usize {
        self.running.values().filter(|s| s.repo_id == repo_id).count()
    }
}

/// Empty filter fields match anything. Every label the stage requires must
/// be offered by the filter with the same value.
fn matches_filter(stage: &Stage, filter: &Filter) -> bool {
    let field = |want: &str, have: &str| want.is_empty() || want == have;
    field(&filter.kind, &stage.kind)
        && field(&filter.pipeline_type, &stage.pipeline_type)
        && field(&filter.os, &stage.os)
        && field(&filter.arch, &stage.arch)
        && field(&filter.variant, &stage.variant)
        && field(&filter.kernel, &stage.kernel)
        && stage
            .labels
            .iter()
            .all(|(key, value)| filter.labels.get(key) == Some(value))
}

/// In-memory [`Scheduler`] with per-stage and per-repository concurrency
/// limits.
#[derive(Debug)]
pub struct StageQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    shutdown: CancellationToken,
    cancel_ttl: Duration,
}

impl Default for StageQueue {
    fn default() -> Self {
        Self {
            state: Mutex::default(),
            notify: Notify::new(),
            shutdown: CancellationToken::new(),
            cancel_ttl: CANCEL_TTL,
        }
    }
}

impl StageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember cancelled builds for `ttl` instead of [`CANCEL_TTL`].
    pub fn with_cancel_ttl(mut self, ttl: Duration) -> Self {
        self.cancel_ttl = ttl;
        self
    }

    /// Mark a running stage as finished, freeing its concurrency slot.
    pub async fn complete(&self, stage_id: StageId) -> Option<Stage> {
        let stage = self.state.lock().await.running.remove(&stage_id);
        if stage.is_some() {
            self.notify.notify_waiters();
        }
        stage
    }

    /// Wake every pending [`request`](Scheduler::request) with an error.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.pending.is_empty()
    }
}

#[async_trait]
impl Scheduler for StageQueue {
    async fn schedule(&self, stage: &Stage) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .pending
            .insert((stage.build_id, stage.number), stage.clone());
        debug!(build = %stage.build_id, stage = %stage.name, "Stage queued");
        drop(state);

        self.notify.notify_waiters();
        Ok(())
    }

    async fn request(&self, filter: &Filter) -> Result<Stage> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                if !state.paused
                    && let Some(stage) = state.dequeue(filter)
                {
                    return Ok(stage);
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Err(Error::Scheduler("queue closed".to_string()));
                }
                _ = &mut notified => {}
            }
        }
    }

    async fn cancel(&self, build_id: BuildId) -> Result<()> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.prune_cancelled(now);
        state.pending.retain(|(id, _), _| *id != build_id);
        state.cancelled.insert(build_id, now + self.cancel_ttl);
        Ok(())
    }

    async fn cancelled(&self, build_id: BuildId) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.prune_cancelled(Instant::now());
        Ok(state.cancelled.contains_key(&build_id))
    }

    async fn pause(&self) -> Result<()> {
        self.state.lock().await.paused = true;
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.state.lock().await.paused = false;
        self.notify.notify_waiters();
        Ok(())
    }

    async fn stats(&self) -> Result<serde_json::Value> {
        let state = self.state.lock().await;
        Ok(serde_json::json!({
            "pending": state.pending.len(),
            "running": state.running.len(),
            "paused": state.paused,
        }))
    }
}
