//! ffmpeg media converter adapter

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::application::ports::{MediaConverter, MediaError, PreparedAudio};

/// Long recordings get a lower bitrate to stay under recognizer size limits
const LONG_AUDIO_SECS: f64 = 1800.0;
const BITRATE_NORMAL: &str = "64k";
const BITRATE_LONG: &str = "32k";

/// Converts incoming media to mono 16 kHz mp3 via ffmpeg
#[derive(Default)]
pub struct FfmpegConverter;

impl FfmpegConverter {
    pub fn new() -> Self {
        Self
    }

    /// Probe the media duration in seconds with ffprobe
    async fn probe_duration(&self, input: &Path) -> Result<f64, MediaError> {
        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(input)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|e| MediaError::Tool(format!("ffprobe: {e}")))?;

        if !output.status.success() {
            return Err(MediaError::UnsupportedFormat(format!(
                "ffprobe could not read {}",
                input.display()
            )));
        }

        String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse::<f64>()
            .map_err(|e| MediaError::Tool(format!("ffprobe output: {e}")))
    }
}

#[async_trait]
impl MediaConverter for FfmpegConverter {
    async fn prepare_for_asr(&self, input: &Path) -> Result<PreparedAudio, MediaError> {
        let duration_secs = self.probe_duration(input).await?;
        let bitrate = if duration_secs > LONG_AUDIO_SECS {
            BITRATE_LONG
        } else {
            BITRATE_NORMAL
        };

        let output_path = input.with_extension("mp3");
        debug!(input = %input.display(), bitrate, duration_secs, "converting");

        let status = Command::new("ffmpeg")
            .arg("-y")
            .arg("-i")
            .arg(input)
            .args(["-vn", "-ac", "1", "-ar", "16000", "-b:a", bitrate])
            .arg(&output_path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| MediaError::Tool(format!("ffmpeg: {e}")))?;

        if !status.success() {
            return Err(MediaError::ConversionFailed(format!(
                "ffmpeg exited with {status}"
            )));
        }

        Ok(PreparedAudio {
            path: output_path,
            duration_secs,
        })
    }
}
