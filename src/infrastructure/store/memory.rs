//! In-memory store adapter for users, jobs and the usage log

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::application::ports::{
    JobStore, StoreError, UsageLog, UsageRecord, UserStore,
};
use crate::domain::{Job, JobStatus, StoredMinutes, User};

/// Process-local store, used for local runs and tests.
///
/// The conditional balance update compares raw stored representations the
/// same way the hosted table service does, so CAS behavior matches
/// production.
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<i64, User>>,
    jobs: Mutex<HashMap<String, Job>>,
    usage: Mutex<Vec<UsageRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the usage log, for tests and diagnostics
    pub fn usage_records(&self) -> Vec<UsageRecord> {
        self.usage
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Snapshot of all stored jobs, for tests and diagnostics
    pub fn jobs(&self) -> Vec<Job> {
        self.jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_user(&self, user_id: i64) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        Ok(users.get(&user_id).cloned())
    }

    async fn put_user(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn update_balance_if(
        &self,
        user_id: i64,
        expected: &StoredMinutes,
        new_minutes: f64,
    ) -> Result<(), StoreError> {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        let user = users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;

        // Raw representation compare: Int(7) does not match Text("7")
        if &user.balance != expected {
            return Err(StoreError::ConditionFailed { user_id });
        }

        user.balance = StoredMinutes::Int(new_minutes.round() as i64);
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn put_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        Ok(jobs.get(job_id).cloned())
    }

    async fn set_status(&self, job_id: &str, status: JobStatus) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(format!("job {job_id}")))?;
        job.status = status;
        Ok(())
    }
}

#[async_trait]
impl UsageLog for MemoryStore {
    async fn append(&self, record: &UsageRecord) -> Result<(), StoreError> {
        let mut usage = self.usage.lock().unwrap_or_else(|e| e.into_inner());
        usage.push(record.clone());
        Ok(())
    }
}
