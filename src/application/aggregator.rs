//! Batch aggregator: collects grouped files during a short window

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::{Batch, IncomingFile};

/// Receiver of a completed batch; implemented by the admission service
#[async_trait]
pub trait BatchDispatch: Send + Sync {
    async fn dispatch_batch(&self, user_id: i64, chat_id: i64, files: Vec<IncomingFile>);
}

struct Slot {
    chat_id: i64,
    batch: Batch,
    /// Generation counter; a timer only flushes the batch it was armed for
    generation: u64,
}

/// Collects files that arrive with a group id.
///
/// The first file of a group opens a batch and arms a timer for the
/// aggregation window; files of the same group that arrive in time join it.
/// A file from a different group flushes the open batch first, then starts
/// its own. Ungrouped files bypass the aggregator entirely.
pub struct BatchAggregator {
    window: Duration,
    dispatch: Arc<dyn BatchDispatch>,
    slots: Arc<Mutex<HashMap<i64, Slot>>>,
    next_generation: AtomicU64,
}

impl BatchAggregator {
    pub fn new(window: Duration, dispatch: Arc<dyn BatchDispatch>) -> Self {
        Self {
            window,
            dispatch,
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Feed one grouped file into the aggregator.
    ///
    /// `file.group_id` must be set; ungrouped files are the caller's problem.
    pub async fn submit(self: &Arc<Self>, user_id: i64, chat_id: i64, file: IncomingFile) {
        let Some(group_id) = file.group_id.clone() else {
            // Ungrouped submissions never reach the aggregator
            self.dispatch.dispatch_batch(user_id, chat_id, vec![file]).await;
            return;
        };

        let flushed = {
            let mut slots = self.slots.lock().await;
            match slots.get_mut(&user_id) {
                Some(slot) if slot.batch.batch_id == group_id => {
                    slot.batch.push(file);
                    debug!(user_id, group = %group_id, size = slot.batch.len(), "batch grew");
                    return;
                }
                Some(_) => {
                    // Different group: flush the open batch, then start fresh
                    let old = slots.remove(&user_id);
                    self.arm(&mut slots, user_id, chat_id, group_id, file);
                    old
                }
                None => {
                    self.arm(&mut slots, user_id, chat_id, group_id, file);
                    None
                }
            }
        };

        if let Some(slot) = flushed {
            self.dispatch
                .dispatch_batch(user_id, slot.chat_id, slot.batch.files)
                .await;
        }
    }

    /// Open a slot for a new batch and spawn its window timer
    fn arm(
        self: &Arc<Self>,
        slots: &mut HashMap<i64, Slot>,
        user_id: i64,
        chat_id: i64,
        group_id: String,
        first: IncomingFile,
    ) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        slots.insert(
            user_id,
            Slot {
                chat_id,
                batch: Batch::new(group_id, first),
                generation,
            },
        );

        let aggregator = Arc::clone(self);
        let window = self.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            aggregator.flush_if_current(user_id, generation).await;
        });
    }

    /// Flush the user's batch when the slot still belongs to the timer's
    /// generation
    async fn flush_if_current(&self, user_id: i64, generation: u64) {
        let slot = {
            let mut slots = self.slots.lock().await;
            match slots.get(&user_id) {
                Some(s) if s.generation == generation => slots.remove(&user_id),
                _ => None,
            }
        };

        if let Some(slot) = slot {
            debug!(user_id, size = slot.batch.len(), "batch window closed");
            self.dispatch
                .dispatch_batch(user_id, slot.chat_id, slot.batch.files)
                .await;
        }
    }
}
