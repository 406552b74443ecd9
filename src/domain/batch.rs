//! Batch of grouped files collected during the aggregation window

use crate::domain::job::IncomingFile;

/// Files arriving with the same group id inside the aggregation window.
///
/// A batch only grows while it is collecting; the aggregator removes it from
/// its per-user slot when it dispatches, so a dispatched batch is never
/// appended to.
#[derive(Debug, Clone)]
pub struct Batch {
    pub batch_id: String,
    pub files: Vec<IncomingFile>,
}

impl Batch {
    /// Start a batch from the first file of a group
    pub fn new(batch_id: impl Into<String>, first: IncomingFile) -> Self {
        Self {
            batch_id: batch_id.into(),
            files: vec![first],
        }
    }

    /// Append a subsequent file of the same group
    pub fn push(&mut self, file: IncomingFile) {
        debug_assert_eq!(file.group_id.as_deref(), Some(self.batch_id.as_str()));
        self.files.push(file);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
