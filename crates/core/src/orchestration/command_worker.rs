use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

use crate::capture::domain::frame_source::FrameSource;
use crate::capture::domain::source_spec::SourceSpec;
use crate::capture::infrastructure::ffmpeg_source::FfmpegSource;
use crate::export::export_controller::{ExportController, RecordingInfo};
use crate::orchestration::frame_orchestrator::FrameOrchestrator;
use crate::pipeline::domain::pipeline_handle::PipelineHandle;
use crate::pipeline::domain::pipeline_registry::PipelineRegistry;
use crate::shared::constants::PASSTHROUGH_PIPELINE_ID;
use crate::shared::engine_config::EngineConfig;
use crate::shared::engine_error::EngineError;
use crate::shared::pipeline_settings::PipelineSettings;

/// Requests accepted from a user interface.
///
/// A pipeline of `None` (or the id `"none"`) runs without inference.
#[derive(Clone, Debug)]
pub enum EngineCommand {
    Start {
        source: SourceSpec,
        pipeline: Option<String>,
        settings: PipelineSettings,
    },
    Stop,
    SwapPipeline {
        pipeline: Option<String>,
        settings: PipelineSettings,
    },
    SaveFrame(PathBuf),
    SaveResults(PathBuf),
    StartRecording(PathBuf),
    StopRecording,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CommandOutcome {
    Done,
    RecordingStarted(RecordingInfo),
    RecordingStopped { frames: usize },
}

pub type CommandReply = Result<CommandOutcome, EngineError>;

type SourceFactory = Box<dyn Fn(&SourceSpec) -> Box<dyn FrameSource> + Send>;
type Envelope = (EngineCommand, Sender<CommandReply>);

/// Owns the engine components on a dedicated thread and executes commands
/// in arrival order.
pub struct CommandWorker {
    orchestrator: Arc<FrameOrchestrator>,
    exports: ExportController,
    registry: PipelineRegistry,
    source_factory: SourceFactory,
}

/// Caller side of a running [`CommandWorker`].
///
/// `submit` only enqueues; read-only queries go straight to the
/// orchestrator and never wait on the worker.
pub struct EngineHandle {
    tx: Option<Sender<Envelope>>,
    orchestrator: Arc<FrameOrchestrator>,
    thread: Option<JoinHandle<()>>,
}

impl CommandWorker {
    /// Worker with ffmpeg-backed sources and the default exporters.
    pub fn new(config: &EngineConfig, registry: PipelineRegistry) -> Self {
        Self::with_parts(
            Arc::new(FrameOrchestrator::new(config)),
            ExportController::new(config),
            registry,
            Box::new(|spec: &SourceSpec| -> Box<dyn FrameSource> {
                Box::new(FfmpegSource::new(spec.clone()))
            }),
        )
    }

    pub fn with_parts(
        orchestrator: Arc<FrameOrchestrator>,
        exports: ExportController,
        registry: PipelineRegistry,
        source_factory: SourceFactory,
    ) -> Self {
        Self {
            orchestrator,
            exports,
            registry,
            source_factory,
        }
    }

    pub fn spawn(self) -> EngineHandle {
        let (tx, rx) = crossbeam_channel::unbounded::<Envelope>();
        let orchestrator = Arc::clone(&self.orchestrator);
        let thread = std::thread::spawn(move || self.run(rx));
        EngineHandle {
            tx: Some(tx),
            orchestrator,
            thread: Some(thread),
        }
    }

    fn run(self, rx: Receiver<Envelope>) {
        for (command, reply) in rx {
            log::debug!("Executing {command:?}");
            let outcome = self.execute(command);
            if let Err(e) = &outcome {
                log::warn!("Command failed: {e}");
            }
            // The caller may have stopped waiting.
            let _ = reply.send(outcome);
        }
        log::debug!("Command channel closed; shutting engine down");
        self.orchestrator.stop();
        self.orchestrator
            .recording_slot()
            .finalize("engine shut down");
    }

    fn execute(&self, command: EngineCommand) -> CommandReply {
        match command {
            EngineCommand::Start {
                source,
                pipeline,
                settings,
            } => {
                let handle = self.build_pipeline(pipeline.as_deref(), &settings)?;
                let source = (self.source_factory)(&source);
                self.orchestrator.start(source, handle)?;
                Ok(CommandOutcome::Done)
            }
            EngineCommand::Stop => {
                self.orchestrator.stop();
                Ok(CommandOutcome::Done)
            }
            EngineCommand::SwapPipeline { pipeline, settings } => {
                let handle = self.build_pipeline(pipeline.as_deref(), &settings)?;
                self.orchestrator.set_active_pipeline(handle);
                Ok(CommandOutcome::Done)
            }
            EngineCommand::SaveFrame(path) => {
                self.exports.save_frame(&self.orchestrator, &path)?;
                Ok(CommandOutcome::Done)
            }
            EngineCommand::SaveResults(path) => {
                self.exports.save_results(&self.orchestrator, &path)?;
                Ok(CommandOutcome::Done)
            }
            EngineCommand::StartRecording(path) => self
                .exports
                .start_recording(&self.orchestrator, &path)
                .map(CommandOutcome::RecordingStarted),
            EngineCommand::StopRecording => self
                .exports
                .stop_recording(&self.orchestrator)
                .map(|frames| CommandOutcome::RecordingStopped { frames }),
        }
    }

    fn build_pipeline(
        &self,
        id: Option<&str>,
        settings: &PipelineSettings,
    ) -> Result<Option<PipelineHandle>, EngineError> {
        match id {
            None | Some(PASSTHROUGH_PIPELINE_ID) => Ok(None),
            Some(id) => self.registry.create(id, settings).map(Some),
        }
    }
}

impl EngineHandle {
    /// Enqueues `command` and returns where its reply will arrive.
    pub fn submit(&self, command: EngineCommand) -> Receiver<CommandReply> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        let sent = match &self.tx {
            Some(tx) => tx.send((command, reply_tx)).map_err(|e| (e.0).1),
            None => Err(reply_tx),
        };
        if let Err(reply_tx) = sent {
            let _ = reply_tx.send(Err(EngineError::EngineShutDown));
        }
        reply_rx
    }

    /// Submits `command` and waits for its reply.
    pub fn execute(&self, command: EngineCommand) -> CommandReply {
        self.submit(command)
            .recv()
            .unwrap_or(Err(EngineError::EngineShutDown))
    }

    pub fn orchestrator(&self) -> &FrameOrchestrator {
        &self.orchestrator
    }

    /// Stops the run, closes any recording and waits for the worker to exit.
    /// Later submissions fail with `EngineShutDown`.
    pub fn shutdown(&mut self) {
        self.tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Command worker panicked");
            }
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
