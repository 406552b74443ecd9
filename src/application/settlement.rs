//! Job settlement: terminal status, usage log and balance debit

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use crate::application::ledger::{BalanceLedger, LedgerError};
use crate::application::ports::{JobStore, StoreError, UsageLog, UsageRecord};
use crate::domain::{Job, JobResult, JobStatus};

/// Errors from settlement
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Ledger conflict during settlement: {0}")]
    LedgerConflict(LedgerError),
}

/// How a settlement call ended
#[derive(Debug, PartialEq, Eq)]
pub enum SettleOutcome {
    Settled,
    /// The job was already in a terminal state; nothing was charged twice
    AlreadySettled,
}

/// Finalizes jobs exactly once.
///
/// Success settles in a fixed order: job record first, usage log second,
/// balance debit last. Repeating a settlement is a no-op because the job's
/// terminal status is checked first.
pub struct SettlementService {
    jobs: Arc<dyn JobStore>,
    usage: Arc<dyn UsageLog>,
    ledger: Arc<BalanceLedger>,
}

impl SettlementService {
    pub fn new(jobs: Arc<dyn JobStore>, usage: Arc<dyn UsageLog>, ledger: Arc<BalanceLedger>) -> Self {
        Self { jobs, usage, ledger }
    }

    /// Settle a successfully transcribed job
    pub async fn settle_success(
        &self,
        job: &Job,
        result: &JobResult,
    ) -> Result<SettleOutcome, SettlementError> {
        if self.already_terminal(&job.job_id).await? {
            info!(job_id = %job.job_id, "job already settled");
            return Ok(SettleOutcome::AlreadySettled);
        }

        let minutes = BalanceLedger::required_minutes(job.duration_secs);

        let mut completed = job.clone();
        completed.status = JobStatus::Completed;
        completed.result = Some(result.clone());
        self.jobs.put_job(&completed).await?;

        self.usage
            .append(&UsageRecord {
                job_id: job.job_id.clone(),
                user_id: job.user_id,
                minutes_charged: minutes,
                duration_secs: job.duration_secs,
                char_count: result.char_count,
                recorded_at: Utc::now(),
            })
            .await?;

        // The ledger clamps at zero, so a debit can conflict but never bounce
        match self.ledger.debit(job.user_id, minutes).await {
            Ok(remaining) => {
                info!(job_id = %job.job_id, minutes, remaining, "job settled");
                Ok(SettleOutcome::Settled)
            }
            Err(LedgerError::Store(e)) => Err(e.into()),
            Err(e) => Err(SettlementError::LedgerConflict(e)),
        }
    }

    /// Settle a failed job: terminal status only, no charge
    pub async fn settle_failure(
        &self,
        job: &Job,
        error: &str,
    ) -> Result<SettleOutcome, SettlementError> {
        if self.already_terminal(&job.job_id).await? {
            info!(job_id = %job.job_id, "job already settled");
            return Ok(SettleOutcome::AlreadySettled);
        }

        let mut failed = job.clone();
        failed.status = JobStatus::Failed;
        failed.error = Some(error.to_string());
        self.jobs.put_job(&failed).await?;

        info!(job_id = %job.job_id, error, "job failed, nothing charged");
        Ok(SettleOutcome::Settled)
    }

    async fn already_terminal(&self, job_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .jobs
            .get_job(job_id)
            .await?
            .map(|j| j.status.is_terminal())
            .unwrap_or(false))
    }
}
