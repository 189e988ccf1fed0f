//! Build assembly: turns an inbound hook into a persisted build.
//!
//! The triggerer resolves the repository configuration, selects the
//! pipeline documents whose trigger conditions match the hook, derives the
//! stage dependency graph, and hands every stage that is ready to run to
//! the scheduler. Configuration problems are recorded as a build in the
//! error state rather than returned, so they remain visible to the user.

use crate::config::OrchestratorConfig;
use crate::dag::DependencyGraph;
use crate::tasks::BackgroundTasks;
use crate::triggers;
use async_trait::async_trait;
use oxide_core::build::{Build, Stage};
use oxide_core::manifest::{Manifest, PipelineDocument};
use oxide_core::ports::{
    BuildStore, Canceler, CommitService, ConfigArgs, ConfigService, ConvertService,
    LegacyConverter, LegacyMetadata, Linter, RepositoryStore, Scheduler, Signer, StatusInput,
    StatusService, Triggerer, UserStore, ValidateService, ValidationOutcome, WebhookAction,
    WebhookData, WebhookEvent, WebhookSender,
};
use oxide_core::repo::{Event, Hook, Repository, User};
use oxide_core::{Result, Status};
use std::sync::Arc;
use tracing::{Instrument, Span, debug, info, info_span, warn};

/// External collaborators used while assembling a build.
#[derive(Clone)]
pub struct TriggerPorts {
    pub users: Arc<dyn UserStore>,
    pub repos: Arc<dyn RepositoryStore>,
    pub builds: Arc<dyn BuildStore>,
    pub commits: Arc<dyn CommitService>,
    pub configs: Arc<dyn ConfigService>,
    pub converter: Arc<dyn ConvertService>,
    pub legacy: Arc<dyn LegacyConverter>,
    pub validator: Arc<dyn ValidateService>,
    pub linter: Arc<dyn Linter>,
    pub signer: Arc<dyn Signer>,
    pub status: Arc<dyn StatusService>,
    pub scheduler: Arc<dyn Scheduler>,
    pub webhooks: Arc<dyn WebhookSender>,
    pub canceler: Arc<dyn Canceler>,
}

/// Default [`Triggerer`].
pub struct BuildTriggerer {
    ports: TriggerPorts,
    settings: OrchestratorConfig,
    tasks: BackgroundTasks,
}

impl BuildTriggerer {
    pub fn new(ports: TriggerPorts) -> Self {
        Self {
            ports,
            settings: OrchestratorConfig::default(),
            tasks: BackgroundTasks::new(),
        }
    }

    pub fn with_config(mut self, settings: OrchestratorConfig) -> Self {
        self.settings = settings;
        self
    }

    /// Run detached work such as auto-cancellation on `tasks`.
    pub fn with_tasks(mut self, tasks: BackgroundTasks) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    async fn assemble(&self, repo: &Repository, hook: &Hook) -> Result<Option<Build>> {
        debug!("trigger: received");

        if triggers::skip_message(hook) {
            info!("trigger: skipping hook. found skip directive");
            return Ok(None);
        }
        if hook.event == Event::PullRequest {
            if repo.ignore_pulls {
                info!("trigger: skipping hook. project ignores pull requests");
                return Ok(None);
            }
            if repo.ignore_forks && !hook.fork.eq_ignore_ascii_case(&repo.slug) {
                info!(fork = %hook.fork, "trigger: skipping hook. project ignores forks");
                return Ok(None);
            }
        }

        let user = self.ports.users.find(repo.user_id).await.inspect_err(|e| {
            warn!(error = %e, "trigger: cannot find repository owner");
        })?;
        if !user.active {
            info!("trigger: skipping hook. repository owner is inactive");
            return Ok(None);
        }

        let mut hook = hook.clone();
        if hook.message.is_empty() && !hook.after.is_empty() {
            match self.ports.commits.find(&user, &repo.slug, &hook.after).await {
                Ok(commit) => hook.backfill(&commit),
                Err(e) => debug!(error = %e, "trigger: cannot find commit"),
            }
        }

        // Unsaved build handed to the configuration services.
        let draft = Build::from_hook(repo, &hook, self.settings.max_message_runes);
        let args = ConfigArgs {
            user: &user,
            repo,
            build: &draft,
        };

        let raw = self.ports.configs.find(args).await.inspect_err(|e| {
            warn!(error = %e, "trigger: cannot find yaml");
        })?;

        let mut raw = match self.ports.converter.convert(args, &raw).await {
            Ok(converted) => converted,
            Err(e) => {
                warn!(error = %e, "trigger: cannot convert yaml");
                return self.create_build_error(repo, &hook, e.to_string()).await;
            }
        };

        let metadata = LegacyMetadata {
            filename: repo.config.clone(),
            url: repo.link.clone(),
            git_ref: hook.git_ref.clone(),
        };
        raw.data = match self.ports.legacy.convert(&raw.data, &metadata) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "trigger: cannot convert legacy yaml");
                return self.create_build_error(repo, &hook, e.to_string()).await;
            }
        };

        let manifest = match Manifest::parse(&raw.data) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(error = %e, "trigger: cannot parse yaml");
                return self.create_build_error(repo, &hook, e.to_string()).await;
            }
        };

        let mut blocked = false;
        match self.ports.validator.validate(args, &raw).await {
            ValidationOutcome::Proceed => {}
            ValidationOutcome::Block => {
                info!("trigger: yaml validation requires approval");
                blocked = true;
            }
            ValidationOutcome::Skip => {
                info!("trigger: skipping hook. yaml validation requested skip");
                return Ok(None);
            }
            ValidationOutcome::Failed(message) => {
                warn!(error = %message, "trigger: yaml validation error");
                return self.create_build_error(repo, &hook, message).await;
            }
        }

        if let Err(e) = self.ports.linter.lint(&manifest, repo.trusted) {
            warn!(error = %e, "trigger: yaml linting error");
            return self.create_build_error(repo, &hook, e.to_string()).await;
        }

        let mut verified = true;
        if repo.protected && hook.is_webhook() {
            verified = self.ports.signer.verify(&raw.data, &repo.secret);
            if !verified {
                info!("trigger: cannot verify yaml signature, stages require approval");
            }
        }
        if blocked {
            verified = false;
        }

        let mut graph = DependencyGraph::new();
        let mut matched = Vec::new();
        for pipeline in manifest.pipelines() {
            let name = pipeline.resolved_name();
            let vertex = graph.add(name, pipeline.depends_on.iter().cloned());
            vertex.skip = true;

            if let Some(mismatch) = triggers::check(pipeline, &hook, &repo.slug) {
                info!(
                    pipeline = %name,
                    "trigger: skipping pipeline, does not match {}",
                    mismatch.as_str()
                );
                continue;
            }
            vertex.skip = false;
            matched.push(pipeline);
        }

        if let Err(e) = graph.verify() {
            warn!("trigger: dependency cycle detected");
            return self
                .create_build_error(repo, &hook, format!("Error: {}", e))
                .await;
        }

        if matched.is_empty() {
            info!("trigger: skipping build, no matching pipelines");
            return Ok(None);
        }

        let repo = self.ports.repos.increment(repo).await.inspect_err(|e| {
            warn!(error = %e, "trigger: cannot increment build sequence");
        })?;

        let build = Build::from_hook(&repo, &hook, self.settings.max_message_runes);
        let mut stages: Vec<Stage> = matched
            .iter()
            .enumerate()
            .map(|(i, pipeline)| self.new_stage(&repo, &build, i as u32 + 1, pipeline, verified))
            .collect();

        for stage in &mut stages {
            stage.depends_on = graph.dependencies(&stage.name);
            if stage.status == Status::Waiting && stage.depends_on.is_empty() {
                stage.status = Status::Pending;
            }
        }

        self.ports
            .builds
            .create(&build, &stages)
            .await
            .inspect_err(|e| warn!(error = %e, "trigger: cannot create build"))?;

        info!(build = %build.id, number = build.number, stages = stages.len(), "trigger: build created");

        self.send_status(&user, &repo, &build).await;

        for stage in stages.iter().filter(|s| s.status == Status::Pending) {
            self.ports.scheduler.schedule(stage).await.inspect_err(|e| {
                warn!(error = %e, stage = %stage.name, "trigger: cannot enqueue build");
            })?;
        }

        self.send_webhook(user, repo.clone(), build.clone()).await;

        if self.settings.auto_cancel && repo.auto_cancels(build.event) {
            let canceler = self.ports.canceler.clone();
            let (repo, superseding) = (repo, build.clone());
            self.tasks.spawn(
                "cancel_pending",
                async move { canceler.cancel_pending(&repo, &superseding).await }
                    .instrument(Span::current()),
            );
        }

        Ok(Some(build))
    }

    fn new_stage(
        &self,
        repo: &Repository,
        build: &Build,
        number: u32,
        pipeline: &PipelineDocument,
        verified: bool,
    ) -> Stage {
        let mut stage = Stage::new(repo.id, build.id, number, pipeline.resolved_name());
        stage.kind = pipeline.kind.clone();
        stage.pipeline_type = pipeline.pipeline_type.clone();
        stage.os = pipeline.platform.os.clone();
        stage.arch = pipeline.platform.arch.clone();
        stage.variant = pipeline.platform.variant.clone();
        stage.kernel = pipeline.platform.version.clone();
        stage.limit = pipeline.concurrency.limit;
        stage.limit_repo = repo.throttle;
        stage.depends_on = pipeline.depends_on.clone();
        stage.labels = pipeline.node.clone();

        let status = &pipeline.trigger.status;
        stage.on_success = status.matches(Status::Passing.as_str());
        stage.on_failure = !status.is_empty() && status.matches(Status::Failing.as_str());

        if stage.kind == "pipeline" && stage.pipeline_type.is_empty() {
            stage.pipeline_type = self.settings.default_pipeline_type.clone();
        }
        if stage.os.is_empty() {
            stage.os = self.settings.default_os.clone();
        }
        if stage.arch.is_empty() {
            stage.arch = self.settings.default_arch.clone();
        }

        stage.status = if !verified {
            Status::Blocked
        } else if stage.depends_on.is_empty() {
            Status::Pending
        } else {
            Status::Waiting
        };
        stage
    }

    /// Record a configuration failure as a build in the error state.
    async fn create_build_error(
        &self,
        repo: &Repository,
        hook: &Hook,
        message: String,
    ) -> Result<Option<Build>> {
        let repo = self.ports.repos.increment(repo).await.inspect_err(|e| {
            warn!(error = %e, "trigger: cannot increment build sequence");
        })?;

        let mut build = Build::from_hook(&repo, hook, self.settings.max_message_runes);
        build.fail(message);

        self.ports
            .builds
            .create(&build, &[])
            .await
            .inspect_err(|e| warn!(error = %e, "trigger: cannot create build error"))?;

        let user = self.ports.users.find(repo.user_id).await.inspect_err(|e| {
            warn!(error = %e, "trigger: cannot find repository owner");
        })?;

        self.send_status(&user, &repo, &build).await;
        self.send_webhook(user, repo, build.clone()).await;
        Ok(Some(build))
    }

    async fn send_status(&self, user: &User, repo: &Repository, build: &Build) {
        let input = StatusInput { repo, build };
        if let Err(e) = self.ports.status.send(user, input).await {
            warn!(error = %e, "trigger: cannot create status");
        }
    }

    async fn send_webhook(&self, user: User, repo: Repository, build: Build) {
        let payload = WebhookData {
            event: WebhookEvent::Build,
            action: WebhookAction::Created,
            user,
            repo,
            build,
        };
        if let Err(e) = self.ports.webhooks.send(&payload).await {
            warn!(error = %e, "trigger: cannot send webhook");
        }
    }
}

#[async_trait]
impl Triggerer for BuildTriggerer {
    async fn trigger(&self, repo: &Repository, hook: &Hook) -> Result<Option<Build>> {
        let span = info_span!(
            "trigger",
            repo = %repo.slug,
            git_ref = %hook.git_ref,
            event = %hook.event,
            commit = %hook.after,
        );
        self.assemble(repo, hook).instrument(span).await
    }
}
