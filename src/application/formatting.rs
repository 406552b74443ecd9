//! Formatting chain: LLM cleanup of raw transcripts with fallback

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::application::ports::{FormatBackend, FormatBackendError, MetricsSink};
use crate::domain::text;
use crate::domain::UserSettings;

/// Transcripts shorter than this many words skip formatting entirely
pub const MIN_WORDS_TO_FORMAT: usize = 10;

/// Cleaned output shorter than this is treated as a failed attempt
const MIN_ACCEPTABLE_CHARS: usize = 5;

/// The closed set of formatting backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatBackendKind {
    #[default]
    Qwen,
    Gateway,
}

impl FormatBackendKind {
    /// The backend tried after this one fails
    pub fn fallback(self) -> Self {
        match self {
            Self::Qwen => Self::Gateway,
            Self::Gateway => Self::Qwen,
        }
    }
}

impl FromStr for FormatBackendKind {
    type Err = std::convert::Infallible;

    /// Unknown names resolve to the default backend rather than failing
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "gateway" | "gemini" => Self::Gateway,
            _ => Self::Qwen,
        })
    }
}

impl fmt::Display for FormatBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Qwen => write!(f, "qwen"),
            Self::Gateway => write!(f, "gateway"),
        }
    }
}

/// Per-request formatting options, derived from user settings
#[derive(Debug, Clone, Copy)]
pub struct FormatOptions {
    /// Wrap the result in `<code>` tags
    pub code_tags: bool,
    /// Keep ё as written instead of folding it to е
    pub keep_yo: bool,
    /// Ask for paragraph breaks on topic changes
    pub chunked: bool,
    /// Ask for speaker labels when the audio sounds like a dialogue
    pub dialogue: bool,
    /// Start the chain from this backend instead of the configured default
    pub backend: Option<FormatBackendKind>,
}

impl FormatOptions {
    pub fn from_settings(settings: &UserSettings) -> Self {
        Self {
            code_tags: settings.use_code_tags,
            keep_yo: settings.use_yo,
            chunked: true,
            dialogue: false,
            backend: None,
        }
    }
}

/// Runs the formatting fallback chain.
///
/// The chain never fails: every exit path returns usable text, falling back
/// to the raw transcript when no backend produces an acceptable result.
pub struct FormattingChain {
    qwen: Arc<dyn FormatBackend>,
    gateway: Arc<dyn FormatBackend>,
    default_backend: FormatBackendKind,
    metrics: Arc<dyn MetricsSink>,
}

impl FormattingChain {
    pub fn new(
        qwen: Arc<dyn FormatBackend>,
        gateway: Arc<dyn FormatBackend>,
        default_backend: FormatBackendKind,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            qwen,
            gateway,
            default_backend,
            metrics,
        }
    }

    fn backend_for(&self, kind: FormatBackendKind) -> &Arc<dyn FormatBackend> {
        match kind {
            FormatBackendKind::Qwen => &self.qwen,
            FormatBackendKind::Gateway => &self.gateway,
        }
    }

    /// Format a raw transcript, returning it unchanged when formatting is
    /// not worth it or nothing in the chain succeeds.
    pub async fn format(&self, raw: &str, options: FormatOptions) -> String {
        if text::word_count(raw) < MIN_WORDS_TO_FORMAT {
            debug!("transcript too short to format");
            return raw.to_string();
        }

        let prompt = build_prompt(raw, options);

        let first = options.backend.unwrap_or(self.default_backend);
        for kind in [first, first.fallback()] {
            let backend = self.backend_for(kind);
            let started = Instant::now();
            let result = backend.complete(&prompt).await;
            let latency = started.elapsed();

            match result {
                Ok(outcome) => {
                    self.metrics.record_api_call(backend.key(), latency, true);

                    if outcome.truncated {
                        // A truncated completion ate part of the transcript;
                        // another backend would too, so stop here
                        warn!(backend = backend.key(), "completion truncated, keeping raw text");
                        return raw.to_string();
                    }

                    match self.clean(&outcome.text, options) {
                        Some(cleaned) => {
                            info!(backend = backend.key(), "transcript formatted");
                            return cleaned;
                        }
                        None => {
                            warn!(backend = backend.key(), "output failed quality check");
                        }
                    }
                }
                Err(FormatBackendError::MissingCredentials) => {
                    // Skipped silently; there was no API attempt to measure
                    debug!(backend = backend.key(), "backend has no credentials");
                }
                Err(e) => {
                    self.metrics.record_api_call(backend.key(), latency, false);
                    warn!(backend = backend.key(), error = %e, "formatting attempt failed");
                }
            }
        }

        info!("all formatting backends exhausted, keeping raw text");
        raw.to_string()
    }

    /// Strip model artifacts and apply user preferences. `None` when the
    /// cleaned text is too short to trust.
    fn clean(&self, output: &str, options: FormatOptions) -> Option<String> {
        let mut cleaned = text::strip_think_blocks(output);
        if !options.code_tags {
            cleaned = text::strip_code_tags(&cleaned);
        }
        if cleaned.chars().count() < MIN_ACCEPTABLE_CHARS {
            return None;
        }
        if !options.keep_yo {
            cleaned = text::fold_yo(&cleaned);
        }
        Some(cleaned)
    }
}

/// Build the formatting prompt for one transcript
fn build_prompt(raw: &str, options: FormatOptions) -> String {
    let mut instructions = String::from(
        "Fix punctuation and capitalization in this transcript. \
         Correct obvious recognition errors. Do not add, remove or \
         paraphrase content.",
    );
    if options.chunked {
        instructions.push_str(" Split the text into paragraphs where the topic changes.");
    }
    if options.dialogue {
        instructions.push_str(" If several speakers are talking, label their lines.");
    }
    if options.code_tags {
        instructions.push_str(" Wrap the final text in <code> tags.");
    } else {
        instructions.push_str(" Return plain text without any markup.");
    }
    format!("{instructions}\n\nTranscript:\n{raw}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_backend_names_resolve_to_qwen() {
        assert_eq!("qwen".parse(), Ok(FormatBackendKind::Qwen));
        assert_eq!("gateway".parse(), Ok(FormatBackendKind::Gateway));
        assert_eq!("gemini".parse(), Ok(FormatBackendKind::Gateway));
        assert_eq!("mystery".parse(), Ok(FormatBackendKind::Qwen));
    }

    #[test]
    fn each_kind_falls_back_to_the_other() {
        assert_eq!(FormatBackendKind::Qwen.fallback(), FormatBackendKind::Gateway);
        assert_eq!(FormatBackendKind::Gateway.fallback(), FormatBackendKind::Qwen);
    }

    #[test]
    fn prompt_reflects_options() {
        let base = FormatOptions {
            code_tags: false,
            keep_yo: true,
            chunked: false,
            dialogue: false,
            backend: None,
        };
        let plain = build_prompt("hello", base);
        assert!(plain.contains("plain text"));
        assert!(plain.ends_with("hello"));

        let tagged = build_prompt(
            "hello",
            FormatOptions {
                code_tags: true,
                ..base
            },
        );
        assert!(tagged.contains("<code>"));
    }
}
