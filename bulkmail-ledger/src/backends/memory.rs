use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use bulkmail_common::{AttemptId, BatchId, SendAttempt, UserId};

use crate::{LedgerError, error::Result, store::LogStore};

/// In-memory log, keyed by attempt id.
///
/// Intended for tests and development. An optional capacity makes inserts
/// fail once reached instead of growing without bound.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogStore {
    pub(crate) attempts: Arc<RwLock<BTreeMap<AttemptId, SendAttempt>>>,
    capacity: Option<usize>,
}

impl MemoryLogStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            attempts: Arc::default(),
            capacity: Some(capacity),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.attempts
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    fn filtered(&self, keep: impl Fn(&SendAttempt) -> bool) -> Result<Vec<SendAttempt>> {
        Ok(self
            .attempts
            .read()?
            .values()
            .filter(|&attempt| keep(attempt))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn insert(&self, attempt: &SendAttempt) -> Result<()> {
        let mut attempts = self.attempts.write()?;

        if attempts.contains_key(&attempt.id) {
            return Err(LedgerError::AlreadyExists(attempt.id));
        }

        if let Some(capacity) = self.capacity
            && attempts.len() >= capacity
        {
            return Err(LedgerError::CapacityExceeded {
                used: attempts.len(),
                capacity,
            });
        }

        attempts.insert(attempt.id, attempt.clone());
        Ok(())
    }

    async fn update(&self, attempt: &SendAttempt) -> Result<()> {
        let mut attempts = self.attempts.write()?;

        let stored = attempts
            .get_mut(&attempt.id)
            .ok_or(LedgerError::NotFound(attempt.id))?;

        if stored.is_terminal() {
            return Err(LedgerError::TerminalOverwrite(attempt.id));
        }

        *stored = attempt.clone();
        Ok(())
    }

    async fn get(&self, id: &AttemptId) -> Result<SendAttempt> {
        self.attempts
            .read()?
            .get(id)
            .cloned()
            .ok_or(LedgerError::NotFound(*id))
    }

    async fn attempts_for_user(&self, user_id: &UserId) -> Result<Vec<SendAttempt>> {
        self.filtered(|attempt| &attempt.user_id == user_id)
    }

    async fn attempts_for_batch(&self, batch_id: BatchId) -> Result<Vec<SendAttempt>> {
        self.filtered(|attempt| attempt.batch_id == batch_id)
    }
}
