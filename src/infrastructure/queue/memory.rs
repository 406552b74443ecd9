//! In-memory job queue adapter with visibility timeouts

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use uuid::Uuid;

use crate::application::ports::{JobQueue, QueueError, QueueMessage};
use crate::domain::Job;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default time a received message stays invisible before redelivery
const DEFAULT_VISIBILITY: Duration = Duration::from_secs(300);

struct InFlight {
    receipt: String,
    job: Job,
    invisible_until: Instant,
}

/// Process-local queue with at-least-once delivery.
///
/// Received messages move to an in-flight list and come back when their
/// visibility timeout lapses without a delete.
#[derive(Default)]
pub struct MemoryQueue {
    ready: Mutex<VecDeque<Job>>,
    in_flight: Mutex<Vec<InFlight>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of received but unacknowledged messages, for tests and
    /// diagnostics
    pub fn in_flight_len(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Move expired in-flight messages back to the ready queue
    fn reap_expired(&self, now: Instant) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        let mut ready = self.ready.lock().unwrap_or_else(|e| e.into_inner());
        let mut index = 0;
        while index < in_flight.len() {
            if in_flight[index].invisible_until <= now {
                let expired = in_flight.swap_remove(index);
                ready.push_back(expired.job);
            } else {
                index += 1;
            }
        }
    }

    fn try_receive(&self) -> Option<QueueMessage> {
        self.reap_expired(Instant::now());

        let job = {
            let mut ready = self.ready.lock().unwrap_or_else(|e| e.into_inner());
            ready.pop_front()?
        };

        let receipt = Uuid::new_v4().to_string();
        let message = QueueMessage {
            receipt: receipt.clone(),
            job: job.clone(),
        };
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.push(InFlight {
            receipt,
            job,
            invisible_until: Instant::now() + DEFAULT_VISIBILITY,
        });
        Some(message)
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn publish(&self, job: &Job) -> Result<(), QueueError> {
        let mut ready = self.ready.lock().unwrap_or_else(|e| e.into_inner());
        ready.push_back(job.clone());
        Ok(())
    }

    async fn receive(&self, wait: Duration) -> Result<Option<QueueMessage>, QueueError> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(message) = self.try_receive() {
                return Ok(Some(message));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn delete(&self, receipt: &str) -> Result<(), QueueError> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        let before = in_flight.len();
        in_flight.retain(|m| m.receipt != receipt);
        if in_flight.len() == before {
            return Err(QueueError::UnknownReceipt(receipt.to_string()));
        }
        Ok(())
    }

    async fn change_visibility(&self, receipt: &str, timeout: Duration) -> Result<(), QueueError> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        let message = in_flight
            .iter_mut()
            .find(|m| m.receipt == receipt)
            .ok_or_else(|| QueueError::UnknownReceipt(receipt.to_string()))?;
        message.invisible_until = Instant::now() + timeout;
        Ok(())
    }
}
