use std::path::{Path, PathBuf};

use crate::export::domain::image_writer::ImageWriter;
use crate::export::domain::result_writer::ResultWriter;
use crate::export::domain::video_writer::VideoWriter;
use crate::export::infrastructure::ffmpeg_writer::FfmpegWriter;
use crate::export::infrastructure::image_file_writer::ImageFileWriter;
use crate::export::infrastructure::json_result_writer::JsonResultWriter;
use crate::export::recording_session::RecordingSession;
use crate::orchestration::frame_orchestrator::FrameOrchestrator;
use crate::shared::engine_config::EngineConfig;
use crate::shared::engine_error::EngineError;
use crate::shared::video_metadata::VideoMetadata;

type VideoWriterFactory = Box<dyn Fn() -> Box<dyn VideoWriter> + Send + Sync>;

const RECORDING_CODEC: &str = "mpeg4";

/// Parameters a recording was opened with.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordingInfo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// Serves save and record requests against a running orchestrator.
///
/// Saves read the published snapshot and never touch the loop. Recording
/// installs a session in the orchestrator's slot, which the loop appends to.
pub struct ExportController {
    image_writer: Box<dyn ImageWriter>,
    result_writer: Box<dyn ResultWriter>,
    video_writer_factory: VideoWriterFactory,
    fallback_fps: f64,
}

impl ExportController {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_writers(
            Box::new(ImageFileWriter::new()),
            Box::new(JsonResultWriter::new()),
            Box::new(|| -> Box<dyn VideoWriter> { Box::new(FfmpegWriter::new()) }),
            config.fallback_fps,
        )
    }

    pub fn with_writers(
        image_writer: Box<dyn ImageWriter>,
        result_writer: Box<dyn ResultWriter>,
        video_writer_factory: VideoWriterFactory,
        fallback_fps: f64,
    ) -> Self {
        Self {
            image_writer,
            result_writer,
            video_writer_factory,
            fallback_fps,
        }
    }

    /// Writes the latest annotated frame to `path` as an image.
    pub fn save_frame(
        &self,
        orchestrator: &FrameOrchestrator,
        path: &Path,
    ) -> Result<(), EngineError> {
        let snapshot = orchestrator
            .latest_snapshot()
            .ok_or(EngineError::NoFrameAvailable)?;
        self.image_writer
            .write(path, snapshot.frame())
            .map_err(|e| export_error(path, e))?;
        log::info!("Saved frame {} to {}", snapshot.sequence(), path.display());
        Ok(())
    }

    /// Writes the latest result to `path` as JSON.
    pub fn save_results(
        &self,
        orchestrator: &FrameOrchestrator,
        path: &Path,
    ) -> Result<(), EngineError> {
        let snapshot = orchestrator
            .latest_snapshot()
            .ok_or(EngineError::NoFrameAvailable)?;
        self.result_writer
            .write(path, snapshot.result())
            .map_err(|e| export_error(path, e))?;
        log::info!(
            "Saved results of frame {} to {}",
            snapshot.sequence(),
            path.display()
        );
        Ok(())
    }

    /// Opens a recording at `path`.
    ///
    /// The frame size is that of the latest snapshot, or the source's when
    /// nothing has been published yet. The rate is the measured rolling
    /// average, falling back to the source rate and then the configured
    /// default.
    pub fn start_recording(
        &self,
        orchestrator: &FrameOrchestrator,
        path: &Path,
    ) -> Result<RecordingInfo, EngineError> {
        let slot = orchestrator.recording_slot();
        if slot.is_recording() {
            return Err(EngineError::AlreadyRecording);
        }

        let source = orchestrator.source_metadata();
        let (width, height) = match (orchestrator.latest_snapshot(), source.as_deref()) {
            (Some(snapshot), _) => snapshot.frame().dimensions(),
            (None, Some(meta)) => (meta.width, meta.height),
            (None, None) => return Err(EngineError::NoFrameAvailable),
        };

        let measured = orchestrator.metrics().average_fps;
        let fps = if measured.is_finite() && measured > 0.0 {
            measured
        } else {
            source
                .as_deref()
                .map_or(self.fallback_fps, |meta| meta.fps_or(self.fallback_fps))
        };

        let metadata = VideoMetadata {
            width,
            height,
            fps,
            total_frames: 0,
            codec: RECORDING_CODEC.to_string(),
            source_path: None,
        };
        let mut writer = (self.video_writer_factory)();
        writer
            .open(path, &metadata)
            .map_err(|e| export_error(path, e))?;

        let session = RecordingSession::new(path.to_path_buf(), writer, fps);
        if let Err(rejected) = slot.open(session) {
            // Another request won the race; discard our container.
            if let Err(e) = rejected.close() {
                log::warn!("Failed to discard recording {}: {e}", path.display());
            }
            return Err(EngineError::AlreadyRecording);
        }

        log::info!(
            "Recording to {} ({width}x{height} @ {fps:.2} fps)",
            path.display()
        );
        Ok(RecordingInfo {
            path: path.to_path_buf(),
            width,
            height,
            fps,
        })
    }

    /// Finalizes the open recording and returns the number of frames written.
    ///
    /// Waits for an append in progress, so the container is never closed
    /// mid-frame.
    pub fn stop_recording(&self, orchestrator: &FrameOrchestrator) -> Result<usize, EngineError> {
        let session = orchestrator
            .recording_slot()
            .take()
            .ok_or(EngineError::NotRecording)?;
        let path = session.path().to_path_buf();
        let frames = session.close().map_err(|e| export_error(&path, e))?;
        log::info!("Recording saved: {} ({frames} frames)", path.display());
        Ok(frames)
    }
}

/// Classifies a writer failure as I/O or encoding.
fn export_error(path: &Path, err: Box<dyn std::error::Error>) -> EngineError {
    let err = match err.downcast::<std::io::Error>() {
        Ok(io) => {
            return EngineError::Io {
                path: path.to_path_buf(),
                source: *io,
            }
        }
        Err(other) => other,
    };
    match err.downcast::<image::ImageError>() {
        Ok(image_err) => match *image_err {
            image::ImageError::IoError(io) => EngineError::Io {
                path: path.to_path_buf(),
                source: io,
            },
            other => EngineError::Encode {
                path: path.to_path_buf(),
                reason: other.to_string(),
            },
        },
        Err(other) => EngineError::Encode {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    }
}
