//! Render job queue and the auto-promotion watchdog.
//!
//! `JobQueue` is a handle to a single actor task that owns the FIFO queue and
//! the active-job slot. Callers talk to it over `mpsc` with `oneshot` replies;
//! at most one job is handed to the [`Renderer`] at a time. When a render
//! finishes the actor persists status and artifacts, then evaluates
//! auto-promotion for rerender jobs.
//!
//! The watchdog sweeps every root on an interval and evaluates terminal
//! rerender jobs that were never evaluated (for example after a restart).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use scriptgate_state::{
    AuditEntry, AuditKind, GenerationMode, ProjectRoot, ProjectStore, ProjectVersion,
    QualitySnapshot, VersionArtifacts, VersionStatus,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{Result, ScrapedData, ScriptGateError, ScriptResult};
use crate::improve::{run_auto_improve, AutoImproveOutcome, ImproveOptions};
use crate::learning::{collect_outcome_learning, read_versions_or_default};
use crate::metrics::METRICS;
use crate::obs;
use crate::pipeline::{persist_guard_output, run_quality_guard, GuardOptions};
use crate::promotion::{evaluate_auto_promote, PromotionConfig};

const COMMAND_BUFFER: usize = 64;

/// A job handed to the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderJob {
    pub job_id: String,
    pub root: ProjectRoot,
    pub version: u32,
    pub mode: GenerationMode,
    pub script: ScriptResult,
}

/// What the renderer reports back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderOutcome {
    pub status: VersionStatus,
    #[serde(default)]
    pub artifacts: VersionArtifacts,
    #[serde(default)]
    pub error: Option<String>,
}

impl RenderOutcome {
    pub fn completed(artifacts: VersionArtifacts) -> Self {
        Self {
            status: VersionStatus::Completed,
            artifacts,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: VersionStatus::Failed,
            artifacts: VersionArtifacts::default(),
            error: Some(error.into()),
        }
    }
}

/// External video renderer.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, job: &RenderJob) -> RenderOutcome;
}

/// Request to create and enqueue a new version.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub root: ProjectRoot,
    pub script: ScriptResult,
    pub mode: GenerationMode,
    pub quality: Option<QualitySnapshot>,
    pub auto_promote_if_winner: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub job_id: String,
    pub version: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub active: Option<String>,
    pub queued: usize,
}

enum Command {
    Enqueue {
        request: EnqueueRequest,
        reply: oneshot::Sender<Result<QueuedJob>>,
    },
    Status {
        reply: oneshot::Sender<QueueStatus>,
    },
    WaitIdle {
        reply: oneshot::Sender<()>,
    },
}

struct Finished {
    job: RenderJob,
    outcome: RenderOutcome,
}

/// Cloneable handle to the queue actor.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Command>,
}

impl JobQueue {
    /// Spawn the actor. It exits once every handle is dropped and the
    /// active job has finished.
    pub fn spawn(
        store: Arc<dyn ProjectStore>,
        renderer: Arc<dyn Renderer>,
        config: PromotionConfig,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let actor = QueueActor::new(store, renderer, config, rx);
        let handle = tokio::spawn(actor.run());
        (Self { tx }, handle)
    }

    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<QueuedJob> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Enqueue { request, reply })
            .await
            .map_err(|_| ScriptGateError::QueueClosed)?;
        rx.await.map_err(|_| ScriptGateError::QueueClosed)?
    }

    pub async fn status(&self) -> Result<QueueStatus> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Status { reply })
            .await
            .map_err(|_| ScriptGateError::QueueClosed)?;
        rx.await.map_err(|_| ScriptGateError::QueueClosed)
    }

    /// Resolve once nothing is queued or rendering.
    pub async fn wait_idle(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::WaitIdle { reply })
            .await
            .map_err(|_| ScriptGateError::QueueClosed)?;
        rx.await.map_err(|_| ScriptGateError::QueueClosed)
    }
}

struct QueueActor {
    store: Arc<dyn ProjectStore>,
    renderer: Arc<dyn Renderer>,
    config: PromotionConfig,
    commands: mpsc::Receiver<Command>,
    done_tx: mpsc::UnboundedSender<Finished>,
    done_rx: mpsc::UnboundedReceiver<Finished>,
    queue: VecDeque<RenderJob>,
    active: Option<String>,
    idle_waiters: Vec<oneshot::Sender<()>>,
}

impl QueueActor {
    fn new(
        store: Arc<dyn ProjectStore>,
        renderer: Arc<dyn Renderer>,
        config: PromotionConfig,
        commands: mpsc::Receiver<Command>,
    ) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            store,
            renderer,
            config,
            commands,
            done_tx,
            done_rx,
            queue: VecDeque::new(),
            active: None,
            idle_waiters: Vec::new(),
        }
    }

    async fn run(mut self) {
        let mut accepting = true;
        loop {
            if !accepting && self.active.is_none() {
                break;
            }
            tokio::select! {
                cmd = self.commands.recv(), if accepting => match cmd {
                    Some(cmd) => self.handle(cmd).await,
                    None => accepting = false,
                },
                Some(finished) = self.done_rx.recv() => {
                    self.finish(finished).await;
                    self.dispatch_next().await;
                }
            }
            self.notify_if_idle();
        }
        debug!("job queue actor stopped");
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Enqueue { request, reply } => {
                let result = self.create_version(request).await;
                if let Ok((job, _)) = &result {
                    self.queue.push_back(job.clone());
                    obs::emit_job_queued(&job.job_id, job.version, self.queue.len());
                }
                let _ = reply.send(result.map(|(_, queued)| queued));
                self.dispatch_next().await;
            }
            Command::Status { reply } => {
                let _ = reply.send(QueueStatus {
                    active: self.active.clone(),
                    queued: self.queue.len(),
                });
            }
            Command::WaitIdle { reply } => self.idle_waiters.push(reply),
        }
    }

    fn notify_if_idle(&mut self) {
        if self.active.is_none() && self.queue.is_empty() {
            for waiter in self.idle_waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }

    async fn create_version(&self, request: EnqueueRequest) -> Result<(RenderJob, QueuedJob)> {
        let root = request.root;
        let _guard = self.store.lock_root(&root).await;
        let mut file = read_versions_or_default(self.store.as_ref(), &root).await?;

        let job_id = Uuid::new_v4().to_string();
        let version = file.next_version();
        let mut record = ProjectVersion::queued(job_id.clone(), version, request.mode);
        record.quality = request.quality;
        record.auto_promote_if_winner = request.auto_promote_if_winner;
        file.versions.push(record);
        self.store.write_versions(&file).await?;

        if request.mode == GenerationMode::Rerender {
            let entry = AuditEntry::new(AuditKind::RerenderQueued)
                .with_job(job_id.clone())
                .with_detail(serde_json::json!({
                    "version": version,
                    "auto_promote_if_winner": request.auto_promote_if_winner,
                }));
            self.store.append_audit(&root, &entry).await?;
        }

        let job = RenderJob {
            job_id: job_id.clone(),
            root,
            version,
            mode: request.mode,
            script: request.script,
        };
        Ok((job, QueuedJob { job_id, version }))
    }

    async fn dispatch_next(&mut self) {
        if self.active.is_some() {
            return;
        }
        let Some(job) = self.queue.pop_front() else {
            return;
        };
        if let Err(err) = self
            .set_status(&job.root, &job.job_id, VersionStatus::Running, None)
            .await
        {
            warn!(job_id = %job.job_id, error = %err, "failed to mark job running");
        }
        self.active = Some(job.job_id.clone());

        let renderer = self.renderer.clone();
        let done = self.done_tx.clone();
        tokio::spawn(async move {
            let render_job = job.clone();
            let render = tokio::spawn(async move { renderer.render(&render_job).await });
            let outcome = match render.await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(job_id = %job.job_id, error = %err, "renderer task aborted");
                    RenderOutcome::failed(format!("renderer aborted: {err}"))
                }
            };
            let _ = done.send(Finished { job, outcome });
        });
    }

    async fn finish(&mut self, finished: Finished) {
        let Finished { job, outcome } = finished;
        self.active = None;
        obs::emit_job_finished(
            &job.job_id,
            &format!("{:?}", outcome.status).to_lowercase(),
            outcome.artifacts.has_video(),
        );
        if let Some(error) = &outcome.error {
            warn!(job_id = %job.job_id, error = %error, "render failed");
        }

        let status = if outcome.status.is_terminal() {
            outcome.status
        } else {
            VersionStatus::Failed
        };
        if let Err(err) = self
            .set_status(&job.root, &job.job_id, status, Some(outcome.artifacts))
            .await
        {
            warn!(job_id = %job.job_id, error = %err, "failed to persist render outcome");
            return;
        }

        if job.mode == GenerationMode::Rerender {
            if let Err(err) = self.evaluate(&job).await {
                warn!(job_id = %job.job_id, error = %err, "auto-promotion evaluation failed");
            }
        }
    }

    async fn evaluate(&self, job: &RenderJob) -> Result<()> {
        let learning = collect_outcome_learning(self.store.as_ref()).await?;
        evaluate_auto_promote(
            self.store.as_ref(),
            &job.root,
            &job.job_id,
            &learning,
            &self.config,
        )
        .await?;
        Ok(())
    }

    async fn set_status(
        &self,
        root: &ProjectRoot,
        job_id: &str,
        status: VersionStatus,
        artifacts: Option<VersionArtifacts>,
    ) -> Result<()> {
        let _guard = self.store.lock_root(root).await;
        let mut file = read_versions_or_default(self.store.as_ref(), root).await?;
        let version = file
            .find_mut(job_id)
            .ok_or_else(|| ScriptGateError::VersionNotFound {
                root: root.to_string(),
                job_id: job_id.to_string(),
            })?;
        version.status = status;
        if status.is_terminal() {
            version.completed_at = Some(Utc::now());
        }
        if let Some(artifacts) = artifacts {
            version.artifacts = artifacts;
        }
        self.store.write_versions(&file).await?;
        Ok(())
    }
}

/// Run the improve loop and, when it succeeds with `queue_rerender`, persist
/// the improved script and enqueue a rerender.
pub async fn improve_and_queue(
    queue: &JobQueue,
    store: &dyn ProjectStore,
    root: &ProjectRoot,
    script: &ScriptResult,
    scraped: &ScrapedData,
    options: &ImproveOptions,
) -> Result<AutoImproveOutcome> {
    let mut outcome = run_auto_improve(script, scraped, options);
    if !options.queue_rerender || !outcome.succeeded() {
        return Ok(outcome);
    }

    let guard = run_quality_guard(
        &outcome.script,
        scraped,
        &GuardOptions {
            pack_override: Some(outcome.pack_id.clone()),
            quality: options.quality.clone(),
            skip_autofix: true,
            mode: Some(GenerationMode::Rerender),
        },
    )?;
    persist_guard_output(store, root, &guard).await?;

    let queued = queue
        .enqueue(EnqueueRequest {
            root: root.clone(),
            script: guard.script.clone(),
            mode: GenerationMode::Rerender,
            quality: Some(guard.quality.snapshot(guard.script.template_id.clone())),
            auto_promote_if_winner: options.auto_promote_if_winner,
        })
        .await?;
    info!(job_id = %queued.job_id, version = queued.version, "rerender queued after improvement");
    outcome.queued_version = Some(queued.version);
    Ok(outcome)
}

/// Tally of one watchdog pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub roots: usize,
    pub evaluated: usize,
    pub promoted: usize,
    pub errors: usize,
}

/// Evaluate every terminal rerender job that has not been evaluated yet.
pub async fn sweep_pending_promotions(
    store: &dyn ProjectStore,
    config: &PromotionConfig,
) -> Result<SweepReport> {
    let learning = collect_outcome_learning(store).await?;
    let mut report = SweepReport::default();

    for root in store.list_roots().await? {
        report.roots += 1;
        let file = read_versions_or_default(store, &root).await?;
        let pending: Vec<String> = file
            .versions
            .iter()
            .filter(|v| {
                v.mode == GenerationMode::Rerender
                    && v.status.is_terminal()
                    && v.auto_promote_evaluated_at.is_none()
            })
            .map(|v| v.id.clone())
            .collect();

        for job_id in pending {
            match evaluate_auto_promote(store, &root, &job_id, &learning, config).await {
                Ok(result) => {
                    report.evaluated += 1;
                    if result.promoted {
                        report.promoted += 1;
                    }
                }
                Err(err) => {
                    report.errors += 1;
                    warn!(root = %root.key(), job_id = %job_id, error = %err, "sweep evaluation failed");
                }
            }
        }
    }

    debug!(
        roots = report.roots,
        evaluated = report.evaluated,
        promoted = report.promoted,
        "promotion sweep finished"
    );
    Ok(report)
}

/// Sweep on an interval until `shutdown` flips to `true` or its sender drops.
pub fn spawn_watchdog(
    store: Arc<dyn ProjectStore>,
    config: PromotionConfig,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = Duration::from_secs(config.watchdog_interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_secs = period.as_secs(), "promotion watchdog started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match sweep_pending_promotions(store.as_ref(), &config).await {
                        Ok(report) if report.evaluated > 0 => {
                            info!(evaluated = report.evaluated, promoted = report.promoted, "watchdog evaluated pending jobs");
                            METRICS.flush();
                        }
                        Ok(_) => {}
                        Err(err) => warn!(error = %err, "watchdog sweep failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("promotion watchdog stopped");
    })
}
