//! Screencast recording pipeline.
//!
//! Streams frames from every attached page session into an in-memory
//! buffer and assembles them into a video on stop. Each received frame
//! must be acknowledged before the browser sends the next one, so frame
//! handling acks as part of processing rather than fire-and-forget.
//!
//! Recording is best-effort end to end: a failed start on one session
//! leaves the others streaming, and video assembly failures resolve to
//! "no video" instead of an error.

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use parking_lot::Mutex;
use serde_json::Value;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::config::ScreencastOptions;
use crate::error::Result;
use crate::identifiers::SessionId;
use crate::protocol::PageCommand;
use crate::transport::{CommandTransport, DEFAULT_COMMAND_TIMEOUT};

use super::video::VideoEncoder;

// ============================================================================
// Frame Buffer
// ============================================================================

/// One buffered screencast frame.
#[derive(Debug, Clone)]
pub struct ScreencastFrame {
    /// Base64-encoded image payload.
    pub data: String,
    /// Frame metadata from the browser (timestamps, device dimensions).
    pub metadata: Value,
    /// Session the frame arrived on.
    pub session_id: SessionId,
    /// Wall-clock receive time.
    pub captured_at: SystemTime,
}

/// Result of a completed recording.
#[derive(Debug, Clone)]
pub struct VideoArtifact {
    /// Path of the assembled video file.
    pub path: PathBuf,
    /// Number of frames encoded.
    pub frame_count: usize,
}

#[derive(Default)]
struct ScreencastState {
    recording: bool,
    frames: Vec<ScreencastFrame>,
    start_command: Option<PageCommand>,
    temp_dir: Option<TempDir>,
}

/// Decodes frames into `frame_%06d.png` files under `dir`.
///
/// Output numbering stays contiguous: undecodable frames are skipped
/// without consuming an index, since the encoder's image sequence input
/// stops at the first numbering gap. Returns the number of files written.
async fn write_frames(frames: &[ScreencastFrame], dir: &Path) -> Result<usize> {
    let mut written = 0usize;

    for (index, frame) in frames.iter().enumerate() {
        let bytes = match BASE64.decode(&frame.data) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(index, error = %e, "Skipping undecodable frame");
                continue;
            }
        };
        let path = dir.join(format!("frame_{written:06}.png"));
        tokio::fs::write(&path, bytes).await?;
        written += 1;
    }

    Ok(written)
}

// ============================================================================
// ScreencastPipeline
// ============================================================================

/// Buffers screencast frames across sessions and assembles video on stop.
pub struct ScreencastPipeline {
    transport: Arc<dyn CommandTransport>,
    options: ScreencastOptions,
    state: Mutex<ScreencastState>,
}

impl ScreencastPipeline {
    /// Creates a pipeline over the given transport.
    #[must_use]
    pub fn new(transport: Arc<dyn CommandTransport>, options: ScreencastOptions) -> Self {
        Self {
            transport,
            options,
            state: Mutex::new(ScreencastState::default()),
        }
    }

    /// Returns `true` while a recording is in progress.
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.state.lock().recording
    }

    /// Number of frames buffered so far.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.state.lock().frames.len()
    }

    /// Starts streaming on every given session.
    ///
    /// The frame size is capped to the current visual viewport when layout
    /// metrics are available; otherwise the browser picks its default.
    /// Any previously buffered frames are discarded.
    pub async fn start(&self, sessions: &[SessionId]) -> Result<()> {
        let (max_width, max_height) = self.viewport_bounds(sessions.first()).await;

        let command = PageCommand::StartScreencast {
            format: self.options.format.clone(),
            quality: self.options.quality,
            every_nth_frame: self.options.every_nth_frame,
            max_width,
            max_height,
        };

        {
            let mut state = self.state.lock();
            state.frames.clear();
            state.start_command = Some(command.clone());
            state.recording = true;
        }

        for session in sessions {
            if let Err(e) = self
                .transport
                .post(command.clone().into(), Some(session))
                .await
            {
                warn!(session = %session, error = %e, "Failed to start screencast on session");
            }
        }

        info!(sessions = sessions.len(), "Screencast recording started");
        Ok(())
    }

    /// Starts streaming on a session attached mid-recording.
    ///
    /// No-op unless a recording is in progress.
    pub async fn start_session(&self, session: &SessionId) -> Result<()> {
        let command = {
            let state = self.state.lock();
            if !state.recording {
                return Ok(());
            }
            state.start_command.clone()
        };

        if let Some(command) = command {
            self.transport.post(command.into(), Some(session)).await?;
            debug!(session = %session, "Screencast extended to new session");
        }
        Ok(())
    }

    /// Buffers one frame and acknowledges it.
    ///
    /// Frames arriving outside a recording window are dropped without an
    /// ack; the stream they belong to is already being torn down.
    pub async fn handle_frame(
        &self,
        data: String,
        metadata: Value,
        ack_id: u64,
        session_id: SessionId,
    ) -> Result<()> {
        {
            let mut state = self.state.lock();
            if !state.recording {
                return Ok(());
            }
            state.frames.push(ScreencastFrame {
                data,
                metadata,
                session_id: session_id.clone(),
                captured_at: SystemTime::now(),
            });
        }

        self.transport
            .post(
                PageCommand::ScreencastFrameAck { session_id: ack_id }.into(),
                Some(&session_id),
            )
            .await
    }

    /// Stops streaming and assembles the buffered frames into a video.
    ///
    /// Returns `None` when no frames were buffered or video assembly
    /// failed; the failure is logged, not surfaced.
    pub async fn stop(&self, sessions: &[SessionId]) -> Option<VideoArtifact> {
        for session in sessions {
            if let Err(e) = self
                .transport
                .post(PageCommand::StopScreencast.into(), Some(session))
                .await
            {
                warn!(session = %session, error = %e, "Failed to stop screencast on session");
            }
        }

        let frames = {
            let mut state = self.state.lock();
            state.recording = false;
            state.start_command = None;
            std::mem::take(&mut state.frames)
        };

        if frames.is_empty() {
            info!("Screencast stopped with no frames buffered");
            return None;
        }

        match self.assemble(frames).await {
            Ok(artifact) => {
                info!(
                    path = %artifact.path.display(),
                    frames = artifact.frame_count,
                    "Screencast video assembled"
                );
                Some(artifact)
            }
            Err(e) => {
                warn!(error = %e, "Video assembly failed; recording discarded");
                None
            }
        }
    }

    /// Removes the frame staging directory, if one was created.
    pub fn cleanup(&self) {
        self.state.lock().temp_dir.take();
    }

    async fn assemble(&self, frames: Vec<ScreencastFrame>) -> Result<VideoArtifact> {
        let encoder = VideoEncoder::new(&self.options.encoder_binary, self.options.frame_rate);
        if !encoder.is_available().await {
            return Err(crate::error::Error::encoder_unavailable(
                self.options.encoder_binary.display().to_string(),
            ));
        }

        let dir = TempDir::new()?;
        let frame_count = write_frames(&frames, dir.path()).await?;
        if frame_count == 0 {
            return Err(crate::error::Error::encoder("no decodable frames"));
        }

        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let output = std::env::temp_dir().join(format!("screencast_{epoch}.mp4"));

        encoder.encode(dir.path(), &output).await?;

        // Keep the staging directory alive until cleanup() so a caller can
        // inspect frames after a failed run.
        self.state.lock().temp_dir = Some(dir);

        Ok(VideoArtifact {
            path: output,
            frame_count,
        })
    }

    async fn viewport_bounds(&self, session: Option<&SessionId>) -> (Option<u32>, Option<u32>) {
        let Some(session) = session else {
            return (None, None);
        };

        match self
            .transport
            .send(
                PageCommand::GetLayoutMetrics.into(),
                Some(session),
                DEFAULT_COMMAND_TIMEOUT,
            )
            .await
        {
            Ok(metrics) => {
                let viewport = &metrics["cssVisualViewport"];
                let width = viewport["clientWidth"].as_f64().map(|w| w.round() as u32);
                let height = viewport["clientHeight"].as_f64().map(|h| h.round() as u32);
                (width, height)
            }
            Err(e) => {
                debug!(error = %e, "Layout metrics unavailable; using default frame size");
                (None, None)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
