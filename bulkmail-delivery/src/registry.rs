//! Batches currently being dispatched, and their cancellation tokens.

use std::sync::Arc;

use bulkmail_common::{BatchId, UserId, internal};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// A snapshot of one running batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InFlight {
    pub batch_id: BatchId,
    pub user_id: UserId,
    pub recipients: usize,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Entry {
    info: InFlight,
    token: CancellationToken,
}

/// Every batch token is a child of one root token, so [`Self::cancel_all`]
/// reaches batches registered at any time.
#[derive(Debug, Clone, Default)]
pub struct BatchRegistry {
    root: CancellationToken,
    batches: Arc<DashMap<BatchId, Entry>>,
}

/// Removes its batch from the registry when dropped.
#[derive(Debug)]
pub struct Registration {
    batch_id: BatchId,
    token: CancellationToken,
    batches: Arc<DashMap<BatchId, Entry>>,
}

impl Registration {
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.batches.remove(&self.batch_id);
    }
}

impl BatchRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a batch until the returned guard is dropped.
    #[must_use]
    pub fn register(&self, info: InFlight) -> Registration {
        let token = self.root.child_token();
        let batch_id = info.batch_id;

        self.batches.insert(
            batch_id,
            Entry {
                info,
                token: token.clone(),
            },
        );

        Registration {
            batch_id,
            token,
            batches: Arc::clone(&self.batches),
        }
    }

    /// Cancel `batch_id` if it is running and belongs to `user_id`.
    ///
    /// Returns `false` when there is nothing of that user's to cancel.
    pub fn cancel(&self, user_id: &UserId, batch_id: BatchId) -> bool {
        let Some(entry) = self.batches.get(&batch_id) else {
            return false;
        };

        if &entry.info.user_id != user_id {
            return false;
        }

        internal!(level = INFO, "Cancelling batch {batch_id}");
        entry.token.cancel();
        true
    }

    /// Cancel every running batch, and any registered afterwards.
    pub fn cancel_all(&self) {
        internal!(
            level = INFO,
            "Cancelling {} in-flight batches",
            self.batches.len()
        );
        self.root.cancel();
    }

    /// `true` once [`Self::cancel_all`] has been called.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.root.is_cancelled()
    }

    #[must_use]
    pub fn is_in_flight(&self, batch_id: BatchId) -> bool {
        self.batches.contains_key(&batch_id)
    }

    #[must_use]
    pub fn get(&self, batch_id: BatchId) -> Option<InFlight> {
        self.batches.get(&batch_id).map(|entry| entry.info.clone())
    }

    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.batches.len()
    }

    /// Ids of every batch still running.
    #[must_use]
    pub fn batch_ids(&self) -> Vec<BatchId> {
        self.batches.iter().map(|entry| *entry.key()).collect()
    }
}
