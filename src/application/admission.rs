//! Job admission: size and balance checks, job creation and dispatch

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::application::aggregator::BatchDispatch;
use crate::application::ledger::BalanceLedger;
use crate::application::ports::{ChatClient, JobQueue, JobStore, MessageId, UserStore};
use crate::domain::{IncomingFile, Job, JobStatus, User};

/// Admits submitted files into the pipeline.
///
/// A submission is one ungrouped file or one flushed batch. Admission checks
/// size and balance, posts a single status message, then creates and
/// publishes one job per file. Only the last job of a batch carries the
/// status message handle, so exactly one job edits it later.
pub struct AdmissionService {
    users: Arc<dyn UserStore>,
    jobs: Arc<dyn JobStore>,
    queue: Arc<dyn JobQueue>,
    chat: Arc<dyn ChatClient>,
    max_file_size: u64,
    default_estimate_minutes: f64,
}

impl AdmissionService {
    pub fn new(
        users: Arc<dyn UserStore>,
        jobs: Arc<dyn JobStore>,
        queue: Arc<dyn JobQueue>,
        chat: Arc<dyn ChatClient>,
        max_file_size: u64,
        default_estimate_minutes: f64,
    ) -> Self {
        Self {
            users,
            jobs,
            queue,
            chat,
            max_file_size,
            default_estimate_minutes,
        }
    }

    /// Estimated minute cost of one file, never below the configured default
    /// since reported durations are unreliable until after conversion
    fn estimate_minutes(&self, file: &IncomingFile) -> i64 {
        BalanceLedger::required_minutes(file.duration_secs)
            .max(self.default_estimate_minutes.ceil() as i64)
    }

    /// Run admission for one submission.
    ///
    /// Returns the jobs that made it onto the queue.
    pub async fn admit(
        &self,
        user: &User,
        chat_id: i64,
        files: Vec<IncomingFile>,
        reply_to: Option<MessageId>,
    ) -> Vec<Job> {
        // Oversize files drop out before any balance math
        let mut accepted = Vec::with_capacity(files.len());
        for file in files {
            if file.file_size > self.max_file_size {
                warn!(
                    user_id = user.user_id,
                    file_id = %file.file_id,
                    size = file.file_size,
                    "file exceeds size limit"
                );
                let limit_mb = self.max_file_size / (1024 * 1024);
                self.notify(
                    chat_id,
                    &format!("File is too large. The limit is {limit_mb} MB."),
                    reply_to,
                )
                .await;
                continue;
            }
            accepted.push(file);
        }
        if accepted.is_empty() {
            return Vec::new();
        }

        let required: i64 = accepted.iter().map(|f| self.estimate_minutes(f)).sum();
        let available = user.balance_minutes();
        if BalanceLedger::check_affordable(user, required).is_err() {
            info!(
                user_id = user.user_id,
                required, available, "submission rejected, balance too low"
            );
            self.notify(
                chat_id,
                &format!(
                    "Not enough minutes: this needs {required} min, you have {available:.0} min."
                ),
                reply_to,
            )
            .await;
            return Vec::new();
        }

        // One status message per submission, batch or not
        let status_text = if accepted.len() == 1 {
            "⏳ Processing your file…".to_string()
        } else {
            format!("⏳ Processing {} files…", accepted.len())
        };
        let status_message_id = match self
            .chat
            .send_message(chat_id, &status_text, reply_to)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "could not post status message");
                None
            }
        };

        let is_batch = accepted.len() > 1;
        let mut published = Vec::with_capacity(accepted.len());
        let last_index = accepted.len() - 1;
        for (index, file) in accepted.iter().enumerate() {
            let is_last = index == last_index;
            let job = Job::new(
                user.user_id,
                chat_id,
                user.first_name.clone(),
                file,
                if is_last { status_message_id } else { None },
                is_last && is_batch,
            );

            if let Err(e) = self.jobs.put_job(&job).await {
                error!(job_id = %job.job_id, error = %e, "could not persist job");
                self.notify(chat_id, "Something went wrong. Please try again later.", None)
                    .await;
                continue;
            }

            match self.queue.publish(&job).await {
                Ok(()) => {
                    info!(job_id = %job.job_id, user_id = user.user_id, "job queued");
                    published.push(job);
                }
                Err(e) => {
                    // Remaining files still get their chance
                    error!(job_id = %job.job_id, error = %e, "could not publish job");
                    let mut failed = job.clone();
                    failed.status = JobStatus::Failed;
                    failed.error = Some(e.to_string());
                    if let Err(e) = self.jobs.put_job(&failed).await {
                        error!(job_id = %job.job_id, error = %e, "could not mark job failed");
                    }
                    self.notify(
                        chat_id,
                        "Could not queue one of your files. Please try again later.",
                        None,
                    )
                    .await;
                }
            }
        }

        published
    }

    async fn notify(&self, chat_id: i64, text: &str, reply_to: Option<MessageId>) {
        if let Err(e) = self.chat.send_message(chat_id, text, reply_to).await {
            warn!(error = %e, "could not deliver notice");
        }
    }
}

#[async_trait]
impl BatchDispatch for AdmissionService {
    async fn dispatch_batch(&self, user_id: i64, chat_id: i64, files: Vec<IncomingFile>) {
        let user = match self.users.get_user(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!(user_id, "batch flushed for unknown user");
                return;
            }
            Err(e) => {
                error!(user_id, error = %e, "could not load user for batch");
                return;
            }
        };
        self.admit(&user, chat_id, files, None).await;
    }
}
