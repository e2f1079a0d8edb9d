use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Instant;

use arc_swap::ArcSwapOption;
use crossbeam_channel::{Receiver, Sender};

use crate::capture::domain::frame_source::{FrameSource, SourceError};
use crate::export::recording_session::RecordingSlot;
use crate::metrics::metrics_aggregator::{MetricsAggregator, MetricsSnapshot};
use crate::orchestration::run_status::RunStatus;
use crate::orchestration::snapshot_channel::{SnapshotChannel, SnapshotReceiver};
use crate::pipeline::domain::pipeline_handle::PipelineHandle;
use crate::shared::constants::PASSTHROUGH_PIPELINE_ID;
use crate::shared::engine_config::EngineConfig;
use crate::shared::engine_error::EngineError;
use crate::shared::frame::Frame;
use crate::shared::inference_result::InferenceResult;
use crate::shared::snapshot::Snapshot;
use crate::shared::video_metadata::VideoMetadata;

/// State shared between the capture thread and callers.
struct Shared {
    current: ArcSwapOption<Snapshot>,
    active: ArcSwapOption<PipelineHandle>,
    source_metadata: ArcSwapOption<VideoMetadata>,
    metrics: MetricsAggregator,
    recording: RecordingSlot,
    snapshots: SnapshotChannel,
    status: Mutex<RunStatus>,
    status_listeners: Mutex<Vec<Sender<RunStatus>>>,
}

struct RunHandle {
    cancel: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Drives one capture/process/publish loop on a dedicated thread.
///
/// Readers never block the loop: the current snapshot and the active
/// pipeline live in atomic pointer cells, and subscribers get an
/// overwrite-latest channel.
pub struct FrameOrchestrator {
    shared: Arc<Shared>,
    run: Mutex<Option<RunHandle>>,
}

impl FrameOrchestrator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                current: ArcSwapOption::empty(),
                active: ArcSwapOption::empty(),
                source_metadata: ArcSwapOption::empty(),
                metrics: MetricsAggregator::new(config.metrics_window),
                recording: RecordingSlot::new(),
                snapshots: SnapshotChannel::new(),
                status: Mutex::new(RunStatus::Idle),
                status_listeners: Mutex::new(Vec::new()),
            }),
            run: Mutex::new(None),
        }
    }

    /// Opens `source` and starts the loop with `pipeline` active (or none,
    /// in which case raw frames are published with empty results).
    ///
    /// Fails with `AlreadyRunning` while a previous loop is still live and
    /// with `SourceUnavailable` when the source cannot be opened.
    pub fn start(
        &self,
        mut source: Box<dyn FrameSource>,
        pipeline: Option<PipelineHandle>,
    ) -> Result<(), EngineError> {
        let mut run = lock(&self.run);
        if let Some(previous) = run.as_ref() {
            if !previous.thread.is_finished() {
                return Err(EngineError::AlreadyRunning);
            }
        }
        if let Some(previous) = run.take() {
            self.join(previous);
        }

        let metadata = source.open().map_err(|e| {
            source.close();
            match e {
                SourceError::Unavailable(msg) => EngineError::SourceUnavailable(msg),
                other => EngineError::SourceUnavailable(other.to_string()),
            }
        })?;
        log::info!(
            "Opened {}: {}x{} @ {:.2} fps ({})",
            source.describe(),
            metadata.width,
            metadata.height,
            metadata.fps,
            metadata.codec
        );

        let shared = &self.shared;
        shared.metrics.reset();
        shared.current.store(None);
        shared.source_metadata.store(Some(Arc::new(metadata)));
        if let Some(old) = shared.active.swap(pipeline.map(Arc::new)) {
            old.close();
        }
        shared.set_status(RunStatus::Running);

        let cancel = Arc::new(AtomicBool::new(false));
        let thread = {
            let shared = Arc::clone(&self.shared);
            let cancel = Arc::clone(&cancel);
            std::thread::spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    run_loop(&shared, source.as_mut(), &cancel)
                }));
                source.close();
                let status = outcome.unwrap_or_else(|_| {
                    log::error!("Capture loop panicked");
                    RunStatus::Errored("capture loop panicked".to_string())
                });
                shared.finish_run(status);
            })
        };
        *run = Some(RunHandle { cancel, thread });
        Ok(())
    }

    /// Ends the loop after its current frame and waits for it to exit.
    /// Releases the source and pipeline and closes any open recording,
    /// including one opened after the run had already ended.
    ///
    /// The run lock is held until the loop has finished, so a concurrent
    /// `start` waits instead of racing the old run's teardown.
    pub fn stop(&self) {
        let mut run = lock(&self.run);
        if let Some(handle) = run.take() {
            handle.cancel.store(true, Ordering::Release);
            self.join(handle);
        }
        self.shared.recording.finalize("engine stopped");
    }

    /// Replaces the pipeline used for subsequent frames. A frame already in
    /// `process` finishes against the previous handle, which closes once
    /// that frame releases it.
    pub fn set_active_pipeline(&self, pipeline: Option<PipelineHandle>) {
        let id = pipeline
            .as_ref()
            .map_or(PASSTHROUGH_PIPELINE_ID, |p| p.id())
            .to_string();
        self.shared.active.store(pipeline.map(Arc::new));
        log::info!("Active pipeline set to '{id}'");
    }

    pub fn active_pipeline_id(&self) -> Option<String> {
        self.shared
            .active
            .load_full()
            .map(|p| p.id().to_string())
    }

    /// Most recently published snapshot of the current run.
    pub fn latest_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.shared.current.load_full()
    }

    pub fn subscribe(&self) -> SnapshotReceiver {
        self.shared.snapshots.subscribe()
    }

    /// Receives every status transition from now on.
    pub fn status_events(&self) -> Receiver<RunStatus> {
        let (tx, rx) = crossbeam_channel::unbounded();
        lock(&self.shared.status_listeners).push(tx);
        rx
    }

    pub fn status(&self) -> RunStatus {
        lock(&self.shared.status).clone()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    pub fn source_metadata(&self) -> Option<Arc<VideoMetadata>> {
        self.shared.source_metadata.load_full()
    }

    pub fn recording_slot(&self) -> RecordingSlot {
        self.shared.recording.clone()
    }

    fn join(&self, handle: RunHandle) {
        if handle.thread.join().is_err() {
            // The loop thread only panics outside its own guard; clean up here.
            self.shared
                .finish_run(RunStatus::Errored("capture thread panicked".to_string()));
        }
    }
}

impl Drop for FrameOrchestrator {
    fn drop(&mut self) {
        self.stop();
        if let Some(active) = self.shared.active.swap(None) {
            active.close();
        }
    }
}

impl Shared {
    fn set_status(&self, status: RunStatus) {
        // Listeners are notified before readers of `status` see the change.
        let mut current = lock(&self.status);
        lock(&self.status_listeners).retain(|tx| tx.send(status.clone()).is_ok());
        *current = status;
    }

    /// Metrics and the recording see a frame before readers do, so a visible
    /// snapshot is always already counted and recorded.
    fn publish(&self, snapshot: Snapshot) {
        self.metrics.record(snapshot.latency());
        self.recording.append(snapshot.frame());
        let snapshot = Arc::new(snapshot);
        self.current.store(Some(Arc::clone(&snapshot)));
        self.snapshots.publish(&snapshot);
    }

    /// Releases the pipeline, closes any recording and reports `status`.
    fn finish_run(&self, status: RunStatus) {
        if let Some(active) = self.active.swap(None) {
            active.close();
        }
        self.recording.finalize(&format!("run {status}"));
        if let Some(summary) = self.metrics.summary_string() {
            log::info!("{summary}");
        }
        log::info!("Run ended: {status}");
        self.set_status(status);
    }
}

fn run_loop(shared: &Shared, source: &mut dyn FrameSource, cancel: &AtomicBool) -> RunStatus {
    loop {
        if cancel.load(Ordering::Acquire) {
            return RunStatus::Stopped;
        }

        let cycle_start = Instant::now();
        let frame = match source.read_frame() {
            Ok(frame) => frame,
            Err(SourceError::EndOfStream) => {
                log::info!("End of stream reached");
                return RunStatus::Finished;
            }
            Err(e) => {
                log::error!("Capture failed on {}: {e}", source.describe());
                return RunStatus::Errored(e.to_string());
            }
        };

        let (annotated, result) = process_frame(shared, frame);
        shared.publish(Snapshot::new(annotated, result, cycle_start.elapsed()));
    }
}

/// Runs the active pipeline on `frame`. Any failure publishes the raw frame
/// with an empty result instead.
fn process_frame(shared: &Shared, frame: Frame) -> (Frame, InferenceResult) {
    let timestamp_s = frame.timestamp_s();
    // Hold our own reference so a concurrent swap cannot close it mid-frame.
    let Some(pipeline) = shared.active.load_full() else {
        return (frame, InferenceResult::empty(PASSTHROUGH_PIPELINE_ID, timestamp_s));
    };

    match pipeline.process(&frame, timestamp_s) {
        Ok((annotated, result)) if annotated.sequence() == frame.sequence() => {
            (annotated, result)
        }
        Ok((annotated, _)) => {
            log::warn!(
                "Pipeline '{}' returned frame {} for frame {}; publishing raw frame",
                pipeline.id(),
                annotated.sequence(),
                frame.sequence()
            );
            (frame, InferenceResult::empty(pipeline.id(), timestamp_s))
        }
        Err(e) => {
            log::warn!(
                "Pipeline '{}' failed on frame {}: {e}",
                pipeline.id(),
                frame.sequence()
            );
            (frame, InferenceResult::empty(pipeline.id(), timestamp_s))
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::time::Duration;

    /// Polls until the run reaches a terminal status or `timeout` expires.
    pub fn wait_for_end(orchestrator: &FrameOrchestrator, timeout: Duration) -> RunStatus {
        let deadline = Instant::now() + timeout;
        loop {
            let status = orchestrator.status();
            if status.is_terminal() || Instant::now() >= deadline {
                return status;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    /// Polls until a snapshot with at least `sequence` is current.
    pub fn wait_for_sequence(
        orchestrator: &FrameOrchestrator,
        sequence: u64,
        timeout: Duration,
    ) -> Option<Arc<Snapshot>> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Some(snapshot) = orchestrator.latest_snapshot() {
                if snapshot.sequence() >= sequence {
                    return Some(snapshot);
                }
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        None
    }
}
