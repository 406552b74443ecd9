//! Queue worker: drives admitted jobs through the pipeline stages

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::application::context::ServiceContext;
use crate::application::formatting::FormatOptions;
use crate::application::ports::QueueMessage;
use crate::application::progress::ProgressNotifier;
use crate::domain::text;
use crate::domain::{FailureKind, Job, JobResult, JobStatus, ProcessingStage, UserSettings};

/// How one received message was handled
enum Handled {
    /// Acknowledged: completed, failed terminally, or stale
    Ack,
    /// Left on the queue for redelivery
    Abandon,
}

/// Pulls jobs off the queue and processes them until shutdown.
///
/// The shutdown flag is checked before taking a job and again before the
/// transcription stage; a preempted job is abandoned without acknowledgement
/// so another worker picks it up.
pub struct JobWorker {
    ctx: Arc<ServiceContext>,
    shutdown: Arc<AtomicBool>,
}

impl JobWorker {
    pub fn new(ctx: Arc<ServiceContext>, shutdown: Arc<AtomicBool>) -> Self {
        Self { ctx, shutdown }
    }

    /// Receive-and-process loop; returns when the shutdown flag is set
    pub async fn run(&self, worker_id: usize) {
        info!(worker_id, "worker started");
        let wait = self.ctx.queue_wait;

        while !self.shutdown.load(Ordering::SeqCst) {
            let message = match self.ctx.queue.receive(wait).await {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(e) => {
                    error!(worker_id, error = %e, "queue receive failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            let handled = self.handle(&message).await;
            match handled {
                Handled::Ack => {
                    if let Err(e) = self.ctx.queue.delete(&message.receipt).await {
                        error!(worker_id, error = %e, "could not acknowledge message");
                    }
                }
                Handled::Abandon => {
                    info!(worker_id, job_id = %message.job.job_id, "job abandoned for redelivery");
                }
            }
        }
        info!(worker_id, "worker stopped");
    }

    async fn handle(&self, message: &QueueMessage) -> Handled {
        if self.shutdown.load(Ordering::SeqCst) {
            return Handled::Abandon;
        }

        let job = &message.job;

        // A redelivered message for a settled job is acknowledged and dropped
        match self.ctx.jobs.get_job(&job.job_id).await {
            Ok(Some(stored)) if stored.status.is_terminal() => {
                info!(job_id = %job.job_id, "skipping redelivered terminal job");
                return Handled::Ack;
            }
            Ok(_) => {}
            Err(e) => {
                error!(job_id = %job.job_id, error = %e, "could not check job status");
                return Handled::Abandon;
            }
        }

        match self.process(job).await {
            Outcome::Completed => Handled::Ack,
            Outcome::Failed(kind) => {
                if let Err(e) = self
                    .ctx
                    .settlement
                    .settle_failure(job, kind.user_message())
                    .await
                {
                    error!(job_id = %job.job_id, error = %e, "failure settlement failed");
                }
                self.notify(job, kind.user_message()).await;
                Handled::Ack
            }
            Outcome::Abandoned => Handled::Abandon,
        }
    }

    /// Run the stage pipeline for one job
    async fn process(&self, job: &Job) -> Outcome {
        if let Err(e) = self
            .ctx
            .jobs
            .set_status(&job.job_id, JobStatus::Processing)
            .await
        {
            warn!(job_id = %job.job_id, error = %e, "could not mark job processing");
        }

        let settings = self.user_settings(job.user_id).await;
        let mut progress = ProgressNotifier::new(
            self.ctx.chat.clone(),
            job.chat_id,
            job.status_message_id,
            self.ctx.speech.backend(),
            f64::from(job.duration_secs),
        );

        let workdir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                error!(job_id = %job.job_id, error = %e, "could not create work directory");
                return Outcome::Failed(FailureKind::Internal);
            }
        };

        progress.advance(ProcessingStage::Downloading).await;
        let input_path = workdir.path().join("input");
        if let Err(e) = self.ctx.chat.download_file(&job.file_id, &input_path).await {
            warn!(job_id = %job.job_id, error = %e, "download failed");
            return Outcome::Failed(FailureKind::Download);
        }

        progress.advance(ProcessingStage::Converting).await;
        let prepared = match self.ctx.media.prepare_for_asr(&input_path).await {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(job_id = %job.job_id, error = %e, "conversion failed");
                return Outcome::Failed(FailureKind::Convert);
            }
        };

        // Preemption point: transcription is the expensive stage
        if self.shutdown.load(Ordering::SeqCst) {
            return Outcome::Abandoned;
        }

        // Forced: this is the long stage and its edit carries the ETA, so it
        // must not be lost to the send throttle
        progress.advance_forced(ProcessingStage::Transcribing).await;
        let raw_text = match self.ctx.speech.transcribe(&prepared.path).await {
            Ok(text) => text,
            Err(crate::application::ports::SpeechError::NoSpeech) => {
                return Outcome::Failed(FailureKind::NoSpeech);
            }
            Err(e) => {
                warn!(job_id = %job.job_id, error = %e, "transcription failed");
                return Outcome::Failed(FailureKind::Transcribe);
            }
        };

        progress.advance(ProcessingStage::Formatting).await;
        let formatted = self
            .ctx
            .formatting
            .format(&raw_text, FormatOptions::from_settings(&settings))
            .await;

        progress.advance(ProcessingStage::Sending).await;
        let result = JobResult {
            char_count: formatted.chars().count(),
            raw_text,
            formatted_text: formatted,
        };
        let consumed_status = match self.deliver(job, &result, workdir.path()).await {
            Ok(consumed) => consumed,
            Err(kind) => return Outcome::Failed(kind),
        };

        match self.ctx.settlement.settle_success(job, &result).await {
            Ok(_) => {
                // When the transcript replaced the status message, a final
                // progress edit would clobber it
                if !consumed_status {
                    progress.advance(ProcessingStage::Completed).await;
                }
                Outcome::Completed
            }
            Err(e) => {
                error!(job_id = %job.job_id, error = %e, "settlement failed");
                Outcome::Failed(FailureKind::Internal)
            }
        }
    }

    /// Send the transcript to the chat, as a message or as a document when
    /// it would not fit. Returns whether the status message now holds the
    /// transcript.
    async fn deliver(
        &self,
        job: &Job,
        result: &JobResult,
        workdir: &std::path::Path,
    ) -> Result<bool, FailureKind> {
        let text_out = &result.formatted_text;

        if text_out.chars().count() <= self.ctx.max_message_length {
            let sent = match job.status_message_id {
                Some(message_id) => {
                    self.ctx
                        .chat
                        .edit_message(job.chat_id, message_id, text_out)
                        .await
                }
                None => self.ctx.chat.send_message(job.chat_id, text_out, None).await,
            };
            return match sent {
                Ok(_) => Ok(job.status_message_id.is_some()),
                Err(e) => {
                    warn!(job_id = %job.job_id, error = %e, "could not deliver transcript");
                    Err(FailureKind::Internal)
                }
            };
        }

        // Long transcripts go out as a document with the opening sentence
        // as caption
        let doc_path = workdir.join("transcript.txt");
        if let Err(e) = tokio::fs::write(&doc_path, text_out).await {
            error!(job_id = %job.job_id, error = %e, "could not write transcript file");
            return Err(FailureKind::Internal);
        }
        let caption = text::first_sentence(text_out);
        match self
            .ctx
            .chat
            .send_document(job.chat_id, &doc_path, caption)
            .await
        {
            Ok(_) => {
                // The progress message is stale once the document is out
                if let Some(message_id) = job.status_message_id {
                    if let Err(e) = self.ctx.chat.delete_message(job.chat_id, message_id).await {
                        warn!(job_id = %job.job_id, error = %e, "could not delete status message");
                    }
                }
                Ok(job.status_message_id.is_some())
            }
            Err(e) => {
                warn!(job_id = %job.job_id, error = %e, "could not send transcript document");
                Err(FailureKind::Internal)
            }
        }
    }

    async fn user_settings(&self, user_id: i64) -> UserSettings {
        match self.ctx.users.get_user(user_id).await {
            Ok(Some(user)) => user.settings,
            _ => UserSettings::default(),
        }
    }

    async fn notify(&self, job: &Job, message: &str) {
        let delivered = match job.status_message_id {
            Some(message_id) => {
                self.ctx
                    .chat
                    .edit_message(job.chat_id, message_id, message)
                    .await
            }
            None => self.ctx.chat.send_message(job.chat_id, message, None).await,
        };
        if let Err(e) = delivered {
            warn!(job_id = %job.job_id, error = %e, "could not deliver failure notice");
        }
    }
}

enum Outcome {
    Completed,
    Failed(FailureKind),
    Abandoned,
}
