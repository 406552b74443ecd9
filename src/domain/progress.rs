//! Processing stages and progress/ETA state for a running job

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Minimum pause between two edits of a status message
pub const MIN_SEND_INTERVAL: Duration = Duration::from_secs(3);
/// After this long without an edit the next update goes out regardless
pub const FORCE_SEND_INTERVAL: Duration = Duration::from_secs(10);

/// Pipeline stage a job moves through, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    Queued,
    Downloading,
    Converting,
    Transcribing,
    Formatting,
    Sending,
    Completed,
}

impl ProcessingStage {
    /// Relative weight of the stage; all weights sum to 100
    pub fn weight(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Downloading => 5,
            Self::Converting => 15,
            Self::Transcribing => 60,
            Self::Formatting => 15,
            Self::Sending => 5,
            Self::Completed => 0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Converting => "converting",
            Self::Transcribing => "transcribing",
            Self::Formatting => "formatting",
            Self::Sending => "sending",
            Self::Completed => "done",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Position in the pipeline order
    fn ordinal(self) -> usize {
        match self {
            Self::Queued => 0,
            Self::Downloading => 1,
            Self::Converting => 2,
            Self::Transcribing => 3,
            Self::Formatting => 4,
            Self::Sending => 5,
            Self::Completed => 6,
        }
    }

    /// Sum of weights of all stages strictly before this one
    fn weight_before(self) -> u8 {
        const ORDER: [ProcessingStage; 7] = [
            ProcessingStage::Queued,
            ProcessingStage::Downloading,
            ProcessingStage::Converting,
            ProcessingStage::Transcribing,
            ProcessingStage::Formatting,
            ProcessingStage::Sending,
            ProcessingStage::Completed,
        ];
        ORDER
            .iter()
            .take(self.ordinal())
            .map(|s| s.weight())
            .sum()
    }
}

/// Which engine runs the transcription stage, used to pick an ETA profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscribeBackend {
    CloudApi,
    Gpu,
}

impl TranscribeBackend {
    /// Fixed overhead plus per-audio-second cost, in seconds
    fn eta_profile(self) -> (f64, f64) {
        match self {
            Self::CloudApi => (8.0, 0.3),
            Self::Gpu => (15.0, 1.8),
        }
    }
}

/// Progress of a single job: current stage with sub-progress, elapsed time
/// and an ETA.
///
/// Percent only reaches 100 at [`ProcessingStage::Completed`]; everything
/// else is capped at 99 no matter what the weights add up to.
#[derive(Debug)]
pub struct ProgressState {
    stage: ProcessingStage,
    /// Fraction of the current stage done, in [0, 1]
    fraction: f64,
    backend: TranscribeBackend,
    audio_secs: f64,
    started_at: Instant,
    last_sent_at: Option<Instant>,
    last_sent_text: Option<String>,
}

impl ProgressState {
    pub fn new(backend: TranscribeBackend, audio_secs: f64) -> Self {
        Self {
            stage: ProcessingStage::Queued,
            fraction: 0.0,
            backend,
            audio_secs,
            started_at: Instant::now(),
            last_sent_at: None,
            last_sent_text: None,
        }
    }

    pub fn stage(&self) -> ProcessingStage {
        self.stage
    }

    /// Move to `stage`, resetting sub-progress. Stages earlier than the
    /// current one are ignored so a late caller cannot roll progress back.
    pub fn advance(&mut self, stage: ProcessingStage) {
        if stage.ordinal() < self.stage.ordinal() {
            return;
        }
        self.stage = stage;
        self.fraction = if stage.is_terminal() { 1.0 } else { 0.0 };
    }

    /// Report sub-progress within the current stage
    pub fn set_fraction(&mut self, fraction: f64) {
        self.fraction = self.fraction.max(fraction.clamp(0.0, 1.0));
    }

    /// Completed stage weights plus the weighted fraction of the current
    /// stage, capped at 99 until the job is done
    pub fn percent(&self) -> u8 {
        if self.stage.is_terminal() {
            return 100;
        }
        let raw =
            f64::from(self.stage.weight_before()) + f64::from(self.stage.weight()) * self.fraction;
        (raw.round() as u8).min(99)
    }

    /// Seconds remaining according to the backend's cost profile, never
    /// negative
    pub fn eta_secs(&self, now: Instant) -> u64 {
        let (base, per_sec) = self.backend.eta_profile();
        let total = base + per_sec * self.audio_secs;
        let elapsed = now.duration_since(self.started_at).as_secs_f64();
        (total - elapsed).max(0.0).round() as u64
    }

    /// Throttle decision for a candidate status text.
    ///
    /// Identical text is never re-sent, not even when forced. The first
    /// update, forced updates and terminal updates always go out; anything
    /// else waits for [`MIN_SEND_INTERVAL`] since the last send, with
    /// [`FORCE_SEND_INTERVAL`] as the outer bound.
    pub fn should_send(&self, text: &str, now: Instant, forced: bool) -> bool {
        if self.last_sent_text.as_deref() == Some(text) {
            return false;
        }
        if forced {
            return true;
        }
        let Some(last) = self.last_sent_at else {
            return true;
        };
        if self.stage.is_terminal() {
            return true;
        }
        let since = now.duration_since(last);
        if since >= FORCE_SEND_INTERVAL {
            return true;
        }
        since >= MIN_SEND_INTERVAL
    }

    /// Record that `text` went out at `now`
    pub fn record_sent(&mut self, text: &str, now: Instant) {
        self.last_sent_at = Some(now);
        self.last_sent_text = Some(text.to_string());
    }

    /// Render the status line with a ten-segment bar and the ETA
    pub fn render(&self, now: Instant) -> String {
        let percent = self.percent();
        let filled = (percent as usize) / 10;
        let mut bar = String::with_capacity(10 * 3);
        for i in 0..10 {
            bar.push(if i < filled { '▓' } else { '░' });
        }
        if self.stage.is_terminal() {
            format!("{bar} 100% {}", self.stage.label())
        } else {
            format!(
                "{bar} {percent}% {} ~{}s left",
                self.stage.label(),
                self.eta_secs(now)
            )
        }
    }
}
