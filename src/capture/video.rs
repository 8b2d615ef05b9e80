//! Video assembly from captured screencast frames.
//!
//! Shells out to an external encoder (ffmpeg by default) to turn a
//! directory of numbered PNG frames into an MP4. Encoder availability
//! is probed once per recording; a missing binary downgrades recording
//! to a no-video result rather than an error at the public surface.

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command as ProcessCommand;
use tracing::{debug, warn};

use crate::error::{Error, Result};

// ============================================================================
// VideoEncoder
// ============================================================================

/// Wraps the external encoder binary used for video assembly.
pub struct VideoEncoder {
    binary: PathBuf,
    frame_rate: u32,
}

impl VideoEncoder {
    /// Creates an encoder wrapper for the given binary and frame rate.
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>, frame_rate: u32) -> Self {
        Self {
            binary: binary.into(),
            frame_rate,
        }
    }

    /// Probes whether the encoder binary can be executed.
    pub async fn is_available(&self) -> bool {
        let probe = ProcessCommand::new(&self.binary)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match probe {
            Ok(status) => status.success(),
            Err(e) => {
                warn!(
                    binary = %self.binary.display(),
                    error = %e,
                    "Video encoder probe failed"
                );
                false
            }
        }
    }

    /// Assembles `frame_%06d.png` files in `frames_dir` into `output`.
    ///
    /// Frames are encoded as H.264 in an MP4 container with the moov atom
    /// up front so the result streams without seeking.
    pub async fn encode(&self, frames_dir: &Path, output: &Path) -> Result<()> {
        let pattern = frames_dir.join("frame_%06d.png");

        let result = ProcessCommand::new(&self.binary)
            .arg("-y")
            .arg("-framerate")
            .arg(self.frame_rate.to_string())
            .arg("-i")
            .arg(&pattern)
            .arg("-c:v")
            .arg("libx264")
            .arg("-preset")
            .arg("medium")
            .arg("-crf")
            .arg("23")
            .arg("-pix_fmt")
            .arg("yuv420p")
            .arg("-movflags")
            .arg("+faststart")
            .arg(output)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await;

        let output_result = match result {
            Ok(out) => out,
            Err(e) => {
                return Err(Error::encoder_unavailable(format!(
                    "{}: {e}",
                    self.binary.display()
                )));
            }
        };

        if !output_result.status.success() {
            let stderr = String::from_utf8_lossy(&output_result.stderr);
            // Keep only the tail of stderr; ffmpeg front-loads banner noise.
            let tail_start = stderr.len().saturating_sub(500);
            let excerpt = stderr
                .get(tail_start..)
                .unwrap_or(&stderr)
                .trim()
                .to_string();
            return Err(Error::encoder(format!(
                "exit {}: {excerpt}",
                output_result.status
            )));
        }

        debug!(output = %output.display(), "Video assembled");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let encoder = VideoEncoder::new("/nonexistent/encoder-binary", 15);
        assert!(!encoder.is_available().await);
    }

    #[tokio::test]
    async fn test_encode_with_missing_binary_errors() {
        let encoder = VideoEncoder::new("/nonexistent/encoder-binary", 15);
        let dir = tempfile::tempdir().expect("tempdir");

        let err = encoder
            .encode(dir.path(), &dir.path().join("out.mp4"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::EncoderUnavailable { .. }));
    }
}
