use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::export::domain::video_writer::VideoWriter;
use crate::shared::frame::Frame;

/// An open video export. Dropping the value without `close` abandons the
/// container, so every path that ends a session goes through `close`.
pub struct RecordingSession {
    path: PathBuf,
    writer: Box<dyn VideoWriter>,
    frames_written: usize,
    fps: f64,
}

impl RecordingSession {
    /// Wraps a writer that has already been opened for `path`.
    pub fn new(path: PathBuf, writer: Box<dyn VideoWriter>, fps: f64) -> Self {
        Self {
            path,
            writer,
            frames_written: 0,
            fps,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> usize {
        self.frames_written
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Appends one frame. A failed append leaves the session open.
    pub fn append(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        self.writer.write(frame)?;
        self.frames_written += 1;
        Ok(())
    }

    /// Finalizes the container and returns the number of frames written.
    pub fn close(mut self) -> Result<usize, Box<dyn std::error::Error>> {
        self.writer.close()?;
        Ok(self.frames_written)
    }
}

/// Slot shared by the frame loop (appends) and the export controller
/// (open/close). Holding the lock across an append makes close wait for it.
#[derive(Clone, Default)]
pub struct RecordingSlot {
    inner: Arc<Mutex<Option<RecordingSession>>>,
}

impl RecordingSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_recording(&self) -> bool {
        self.lock().is_some()
    }

    /// Installs `session` unless one is already open, in which case it is
    /// handed back.
    pub fn open(&self, session: RecordingSession) -> Result<(), RecordingSession> {
        let mut guard = self.lock();
        if guard.is_some() {
            return Err(session);
        }
        *guard = Some(session);
        Ok(())
    }

    /// Appends to the open session, if any. Failures are logged; the session
    /// stays open.
    pub fn append(&self, frame: &Frame) {
        let mut guard = self.lock();
        if let Some(session) = guard.as_mut() {
            if let Err(e) = session.append(frame) {
                log::warn!(
                    "Recording append failed for frame {} ({}): {e}",
                    frame.sequence(),
                    session.path().display()
                );
            }
        }
    }

    /// Removes the open session. The caller is responsible for closing it.
    pub fn take(&self) -> Option<RecordingSession> {
        self.lock().take()
    }

    /// Closes the open session, if any, logging the outcome.
    pub fn finalize(&self, reason: &str) {
        if let Some(session) = self.take() {
            let path = session.path().to_path_buf();
            match session.close() {
                Ok(frames) => log::info!(
                    "Recording saved ({reason}): {} ({frames} frames)",
                    path.display()
                ),
                Err(e) => log::error!("Failed to finalize recording {}: {e}", path.display()),
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<RecordingSession>> {
        // A panic while holding the lock cannot leave the Option half-written.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
