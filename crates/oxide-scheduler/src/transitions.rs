//! Manual stage transitions: approve, decline, and restart.

use crate::dag::DependencyGraph;
use oxide_core::build::Stage;
use oxide_core::ids::BuildId;
use oxide_core::ports::{BuildStore, LogStore, Scheduler, StageStore, StepStore};
use oxide_core::{Error, Result, Status};
use std::sync::Arc;
use tracing::{Instrument, info, info_span, warn};

/// Applies user-requested status changes to the stages of a build.
pub struct StageTransitions {
    builds: Arc<dyn BuildStore>,
    stages: Arc<dyn StageStore>,
    steps: Arc<dyn StepStore>,
    logs: Arc<dyn LogStore>,
    scheduler: Arc<dyn Scheduler>,
}

impl StageTransitions {
    pub fn new(
        builds: Arc<dyn BuildStore>,
        stages: Arc<dyn StageStore>,
        steps: Arc<dyn StepStore>,
        logs: Arc<dyn LogStore>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            builds,
            stages,
            steps,
            logs,
            scheduler,
        }
    }

    /// Release a blocked stage to the scheduler.
    pub async fn approve(&self, build_id: BuildId, stage_number: u32) -> Result<Stage> {
        let span = info_span!("stage", build = %build_id, stage = stage_number);
        async move {
            self.builds.find(build_id).await?;
            let mut stage = self.stages.find_number(build_id, stage_number).await?;
            if stage.status != Status::Blocked {
                return Err(Error::InvalidTransition {
                    action: "approve",
                    status: stage.status,
                });
            }

            stage.status = Status::Pending;
            self.stages.update(&stage).await?;
            self.scheduler.schedule(&stage).await?;

            info!(name = %stage.name, "stage approved");
            Ok(stage)
        }
        .instrument(span)
        .await
    }

    /// Decline a blocked stage, which also declines its build.
    pub async fn decline(&self, build_id: BuildId, stage_number: u32) -> Result<Stage> {
        let span = info_span!("stage", build = %build_id, stage = stage_number);
        async move {
            let mut build = self.builds.find(build_id).await?;
            let mut stage = self.stages.find_number(build_id, stage_number).await?;
            if stage.status != Status::Blocked {
                return Err(Error::InvalidTransition {
                    action: "decline",
                    status: stage.status,
                });
            }

            stage.status = Status::Declined;
            self.stages.update(&stage).await?;

            build.status = Status::Declined;
            self.builds.update(&build).await?;

            info!(name = %stage.name, "stage declined");
            Ok(stage)
        }
        .instrument(span)
        .await
    }

    /// Re-run a finished stage. Its steps are reset and their logs removed,
    /// and every stage downstream of it goes back to waiting.
    ///
    /// Updates are not transactional: if one fails, the stages already
    /// reset stay reset and the call may be retried.
    pub async fn restart(&self, build_id: BuildId, stage_number: u32) -> Result<Stage> {
        let span = info_span!("stage", build = %build_id, stage = stage_number);
        async move {
            let build = self.builds.find(build_id).await?;
            if build.status.is_gated() {
                return Err(Error::InvalidBuildTransition {
                    action: "restart",
                    status: build.status,
                });
            }
            let mut stage = self.stages.find_number(build_id, stage_number).await?;
            if !stage.status.is_restartable() {
                return Err(Error::InvalidTransition {
                    action: "restart",
                    status: stage.status,
                });
            }

            for mut step in self.steps.list(stage.id).await? {
                step.reset();
                self.steps.update(&step).await?;
                if let Err(e) = self.logs.delete(step.id).await {
                    warn!(step = %step.name, error = %e, "cannot delete step logs");
                }
            }

            stage.reset_pending();
            self.stages.update(&stage).await?;

            let siblings = self.stages.list(build_id).await?;
            let mut graph = DependencyGraph::new();
            for sibling in &siblings {
                graph.add(sibling.name.as_str(), sibling.depends_on.iter().cloned());
            }
            for name in graph.descendants(&stage.name) {
                let Some(mut downstream) = siblings.iter().find(|s| s.name == name).cloned() else {
                    continue;
                };
                downstream.reset_waiting();
                self.stages.update(&downstream).await?;
            }

            self.scheduler.schedule(&stage).await?;

            info!(name = %stage.name, "stage restarted");
            Ok(stage)
        }
        .instrument(span)
        .await
    }
}
