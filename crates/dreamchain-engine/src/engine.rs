use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dreamchain_contracts::events::{now_utc_iso, RunEvent, RunEventKind};
use dreamchain_contracts::models::ModelRegistry;
use dreamchain_contracts::prompts::{initial_image_prompt, next_frame_prompt};
use dreamchain_contracts::runs::RunSummary;
use dreamchain_contracts::{
    Block, BlockKind, BlockOutcome, ConfigError, DebugLog, EngineStatus, HistoryLog, RunConfig,
    RunPhase, RunState,
};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::bus::EventBus;
use crate::client::{default_client_registry, ClientRegistry, GenerationClient};
use crate::error::{EngineError, Stage};

pub const DEFAULT_CYCLE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub cycle_delay: Duration,
    pub event_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            cycle_delay: DEFAULT_CYCLE_DELAY,
            event_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSnapshot {
    pub run_id: Option<String>,
    pub state: RunState,
    pub blocks: Vec<Block>,
    pub log: Vec<String>,
}

/// Clones share the same run.
#[derive(Clone)]
pub struct IterationEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    clients: ClientRegistry,
    models: ModelRegistry,
    settings: EngineSettings,
    bus: EventBus,
    run: Mutex<ActiveRun>,
}

#[derive(Default)]
struct ActiveRun {
    run_id: Option<String>,
    started_at: String,
    state: RunState,
    history: HistoryLog,
    log: DebugLog,
    cancel: CancellationToken,
}

pub struct RunHandle {
    run_id: String,
    task: JoinHandle<RunSummary>,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the run to reach `Stopped` and returns its summary.
    pub async fn wait(self) -> Result<RunSummary, EngineError> {
        self.task
            .await
            .map_err(|err| EngineError::TaskFailed(err.to_string()))
    }
}

impl IterationEngine {
    pub fn new(clients: ClientRegistry, models: ModelRegistry) -> Self {
        Self::with_settings(clients, models, EngineSettings::default())
    }

    pub fn with_settings(
        clients: ClientRegistry,
        models: ModelRegistry,
        settings: EngineSettings,
    ) -> Self {
        let bus = EventBus::new(settings.event_capacity);
        Self {
            inner: Arc::new(EngineInner {
                clients,
                models,
                settings,
                bus,
                run: Mutex::new(ActiveRun::default()),
            }),
        }
    }

    /// Default model registry with the OpenAI and dryrun clients.
    pub fn with_defaults() -> Self {
        Self::new(default_client_registry(), ModelRegistry::default())
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.inner.models
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.inner.bus.subscribe()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let run = self.inner.lock();
        EngineSnapshot {
            run_id: run.run_id.clone(),
            state: run.state.clone(),
            blocks: run.history.blocks().to_vec(),
            log: run.log.snapshot(),
        }
    }

    pub fn state(&self) -> RunState {
        self.inner.lock().state.clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().state.running
    }

    /// Must be called inside a tokio runtime.
    pub fn start(&self, config: RunConfig) -> Result<RunHandle, EngineError> {
        config.validate(&self.inner.models)?;
        let image_client = self.client_for(&config.image_model)?;
        let vision_client = self.client_for(&config.text_model)?;

        let run_id = Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        {
            let mut run = self.inner.lock();
            if run.state.running {
                return Err(EngineError::AlreadyRunning);
            }
            run.run_id = Some(run_id.clone());
            run.started_at = now_utc_iso();
            run.state = RunState::started();
            run.history.reset();
            run.log.clear();
            run.cancel = cancel.clone();
            self.inner.emit(
                &run,
                RunEventKind::RunStarted {
                    config: config.clone(),
                },
            );
            let state = run.state.clone();
            self.inner.emit(&run, RunEventKind::StateChanged { state });
        }

        tracing::info!(
            %run_id,
            loops = %config.loops,
            image_model = %config.image_model,
            text_model = %config.text_model,
            "run started"
        );
        let task = tokio::spawn(drive_run(
            self.inner.clone(),
            config,
            image_client,
            vision_client,
            cancel,
        ));
        Ok(RunHandle { run_id, task })
    }

    pub async fn run(&self, config: RunConfig) -> Result<RunSummary, EngineError> {
        self.start(config)?.wait().await
    }

    /// The in-flight remote call still settles.
    pub fn stop(&self) -> bool {
        let mut run = self.inner.lock();
        if !run.state.running || run.cancel.is_cancelled() {
            return false;
        }
        run.cancel.cancel();
        run.state.status = EngineStatus::Stopping;
        let line = run.log.append("User stopped the loop.");
        self.inner.emit(&run, RunEventKind::LogLine { line });
        let state = run.state.clone();
        self.inner.emit(&run, RunEventKind::StateChanged { state });
        tracing::info!("stop requested");
        true
    }

    fn client_for(&self, model: &str) -> Result<Arc<dyn GenerationClient>, EngineError> {
        let provider = self.inner.models.provider_of(model).ok_or_else(|| {
            ConfigError::UnsupportedModel {
                model: model.to_string(),
                capability: "any".to_string(),
            }
        })?;
        self.inner
            .clients
            .get(provider)
            .ok_or_else(|| EngineError::NoClient(provider.to_string()))
    }
}

impl EngineInner {
    fn lock(&self) -> MutexGuard<'_, ActiveRun> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, run: &ActiveRun, kind: RunEventKind) {
        let run_id = run.run_id.clone().unwrap_or_default();
        self.bus.publish(RunEvent::new(run_id, kind));
    }

    fn log(&self, message: &str) {
        let mut run = self.lock();
        let line = run.log.append(message);
        self.emit(&run, RunEventKind::LogLine { line });
    }

    fn update_state(&self, apply: impl FnOnce(&mut RunState)) {
        let mut run = self.lock();
        apply(&mut run.state);
        let state = run.state.clone();
        self.emit(&run, RunEventKind::StateChanged { state });
    }

    fn append_pending(&self, kind: BlockKind) -> usize {
        let mut run = self.lock();
        let index = run.history.append_pending(kind, kind.placeholder());
        let block = run.history.blocks()[index].clone();
        self.emit(&run, RunEventKind::BlockAppended { index, block });
        index
    }

    fn append_done(&self, kind: BlockKind, content: &str) -> usize {
        let mut run = self.lock();
        let index = run.history.append_done(kind, content);
        let block = run.history.blocks()[index].clone();
        self.emit(&run, RunEventKind::BlockAppended { index, block });
        index
    }

    fn resolve(&self, kind: BlockKind, outcome: BlockOutcome) -> Result<usize, EngineError> {
        let mut run = self.lock();
        let index = run.history.resolve_last_pending(kind, outcome)?;
        let block = run.history.blocks()[index].clone();
        self.emit(&run, RunEventKind::BlockResolved { index, block });
        Ok(index)
    }

    async fn step<F>(&self, phase: RunPhase, stage: Stage, call: F) -> Result<String, EngineError>
    where
        F: Future<Output = Result<String, EngineError>>,
    {
        let kind = block_kind(stage);
        self.append_pending(kind);
        self.update_state(|state| {
            state.awaiting = true;
            state.phase = Some(phase);
        });
        self.log(&format!("Requesting {stage}..."));

        let outcome = call.await;
        self.update_state(|state| state.awaiting = false);

        match outcome {
            Ok(content) => {
                self.resolve(kind, BlockOutcome::Done(content.clone()))?;
                self.log(match stage {
                    Stage::Image => "Image received.",
                    Stage::Description => "Description received.",
                });
                Ok(content)
            }
            Err(err) => {
                self.resolve(kind, BlockOutcome::Error)?;
                self.log(&match stage {
                    Stage::Image => format!("Image generation failed: {err}"),
                    Stage::Description => format!("Description failed: {err}"),
                });
                Err(err)
            }
        }
    }

    /// Settles anything the run task left pending when it died.
    fn abandon(&self, reason: &str) {
        tracing::error!(reason, "run task ended without settling");
        let mut run = self.lock();
        run.cancel.cancel();
        for kind in [BlockKind::Prompt, BlockKind::Image, BlockKind::Description] {
            while let Ok(index) = run.history.resolve_last_pending(kind, BlockOutcome::Error) {
                let block = run.history.blocks()[index].clone();
                self.emit(&run, RunEventKind::BlockResolved { index, block });
            }
        }
        let line = run.log.append(&format!("Run failed: {reason}"));
        self.emit(&run, RunEventKind::LogLine { line });
        run.state.last_error = Some(reason.to_string());
    }

    fn finalize(&self) -> RunSummary {
        let mut run = self.lock();
        let line = run.log.append("Loop stopped.");
        self.emit(&run, RunEventKind::LogLine { line });
        run.state.running = false;
        run.state.awaiting = false;
        run.state.phase = None;
        run.state.status = EngineStatus::Stopped;
        let state = run.state.clone();
        self.emit(&run, RunEventKind::RunFinished { state });

        RunSummary::from_run(
            run.run_id.clone().unwrap_or_default(),
            run.started_at.clone(),
            now_utc_iso(),
            &run.state,
            run.history.blocks(),
        )
    }
}

struct RunGuard {
    inner: Arc<EngineInner>,
    finished: bool,
}

impl RunGuard {
    fn finish(mut self) -> RunSummary {
        self.finished = true;
        self.inner.finalize()
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.finished {
            let reason = if std::thread::panicking() {
                "run task panicked"
            } else {
                "run task was aborted"
            };
            self.inner.abandon(reason);
            self.inner.finalize();
        }
    }
}

async fn drive_run(
    inner: Arc<EngineInner>,
    config: RunConfig,
    image_client: Arc<dyn GenerationClient>,
    vision_client: Arc<dyn GenerationClient>,
    cancel: CancellationToken,
) -> RunSummary {
    let guard = RunGuard {
        inner: inner.clone(),
        finished: false,
    };

    let result = run_cycles(
        &inner,
        &config,
        image_client.as_ref(),
        vision_client.as_ref(),
        &cancel,
    )
    .await;

    if let Err(err) = result {
        cancel.cancel();
        tracing::warn!(stage = ?err.stage(), status = ?err.status(), error = %err, "run aborted");
        if err.stage().is_none() {
            inner.log(&format!("Run failed: {err}"));
        }
        let message = err.to_string();
        inner.update_state(|state| state.last_error = Some(message));
    }

    let summary = guard.finish();
    tracing::info!(
        run_id = %summary.run_id,
        cycles = summary.cycles,
        failed = !summary.succeeded(),
        "run stopped"
    );
    summary
}

async fn run_cycles(
    inner: &EngineInner,
    config: &RunConfig,
    image_client: &dyn GenerationClient,
    vision_client: &dyn GenerationClient,
    cancel: &CancellationToken,
) -> Result<(), EngineError> {
    let mut completed: u64 = 0;
    let mut prior_description: Option<String> = None;

    while !cancel.is_cancelled() && config.loops.allows(completed) {
        let cycle = completed + 1;
        let (phase, image_prompt) = if completed == 0 {
            (
                RunPhase::GeneratingFirstImage,
                initial_image_prompt(&config.prompt, &config.style),
            )
        } else {
            let description = prior_description
                .take()
                .ok_or(EngineError::Sequence { cycle })?;
            (
                RunPhase::GeneratingNextImage,
                next_frame_prompt(&description),
            )
        };

        tracing::debug!(cycle, ?phase, "cycle started");
        inner.log(&format!(
            "Loop {cycle}: Generating image for prompt: {image_prompt}"
        ));
        if config.record_prompts {
            inner.append_done(BlockKind::Prompt, &image_prompt);
        }
        let image_ref = inner
            .step(
                phase,
                Stage::Image,
                image_client.generate_image(&image_prompt, &config.image_model),
            )
            .await?;

        if cancel.is_cancelled() {
            break;
        }
        inner.log(&format!("Loop {cycle}: Describing image..."));
        let description = inner
            .step(
                RunPhase::Describing,
                Stage::Description,
                vision_client.describe_image(
                    &image_ref,
                    &config.description_template,
                    &config.text_model,
                ),
            )
            .await?;

        completed += 1;
        inner.update_state(|state| state.loop_count = completed);
        inner.log(&format!("Loop {cycle}: Success!"));
        prior_description = Some(description);

        if !config.loops.allows(completed) {
            break;
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(inner.settings.cycle_delay) => {}
        }
    }
    Ok(())
}

fn block_kind(stage: Stage) -> BlockKind {
    match stage {
        Stage::Image => BlockKind::Image,
        Stage::Description => BlockKind::Description,
    }
}
