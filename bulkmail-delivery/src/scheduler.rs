//! The batch dispatcher.
//!
//! A batch is sent sequentially, one provider call per recipient, with an
//! optional pause between consecutive calls. The loop is a small state
//! machine so that cancellation is only ever observed at two points: before
//! a recipient is started, and during a pause.
//!
//! ```text
//! Next(i) ──(i == len)──────────────▶ Finished
//!    │ ──(cancelled)─────────────────▶ Cancelled(i)
//!    ▼ send recipient i
//! Pause(i + 1) ──(cancelled)─────────▶ Cancelled(i + 1)
//!    ▼ delay elapsed
//! Next(i + 1)
//! ```
//!
//! A recipient in flight is always finished: its row becomes terminal before
//! cancellation is looked at again.

use std::{sync::Arc, time::Instant};

use bulkmail_common::{
    Batch, BatchId, BatchResult, EmailComposition, PersistenceFailure, PersistenceStage, UserId,
    ValidationError, ValidationReport, Validator, audit, internal,
};
use bulkmail_tracing::traced;
use bulkmail_vault::{CredentialResolver, Credentials};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    clock::{Clock, SystemClock, Throttle, TokioThrottle},
    error::DispatchError,
    recorder::OutcomeRecorder,
    registry::{BatchRegistry, InFlight},
    render::MessageTemplate,
    transport::{Transport, TransportOutcome},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Next(usize),
    Pause(usize),
    Cancelled(usize),
    Finished,
}

/// A batch as seen by its owner while or after it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchStatus {
    pub in_flight: bool,
    #[serde(flatten)]
    pub result: BatchResult,
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    validator: Arc<Validator>,
    credentials: Arc<dyn CredentialResolver>,
    transport: Arc<dyn Transport>,
    recorder: OutcomeRecorder,
    clock: Arc<dyn Clock>,
    throttle: Arc<dyn Throttle>,
    registry: BatchRegistry,
}

impl Dispatcher {
    /// A dispatcher on the system clock, pausing with the tokio timer.
    #[must_use]
    pub fn new(
        validator: Validator,
        credentials: Arc<dyn CredentialResolver>,
        transport: Arc<dyn Transport>,
        store: Arc<dyn bulkmail_ledger::LogStore>,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        Self {
            validator: Arc::new(validator),
            credentials,
            transport,
            recorder: OutcomeRecorder::new(store, Arc::clone(&clock)),
            clock,
            throttle: Arc::new(TokioThrottle),
            registry: BatchRegistry::new(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.recorder = OutcomeRecorder::new(Arc::clone(self.recorder.store()), Arc::clone(&clock));
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_throttle(mut self, throttle: Arc<dyn Throttle>) -> Self {
        self.throttle = throttle;
        self
    }

    #[must_use]
    pub const fn recorder(&self) -> &OutcomeRecorder {
        &self.recorder
    }

    #[must_use]
    pub const fn registry(&self) -> &BatchRegistry {
        &self.registry
    }

    #[must_use]
    pub fn validate(&self, composition: &EmailComposition) -> ValidationReport {
        self.validator.validate(composition)
    }

    /// # Errors
    ///
    /// Every validation problem with `composition`.
    pub fn prepare(
        &self,
        user_id: UserId,
        composition: EmailComposition,
    ) -> Result<Batch, ValidationError> {
        self.validator.prepare(user_id, composition)
    }

    /// Validate, resolve credentials, then send the whole batch before
    /// returning its result.
    ///
    /// The batch runs on its own task; dropping the returned future stops
    /// the wait, not the batch, so every started recipient still reaches a
    /// terminal row.
    ///
    /// # Errors
    ///
    /// Only before the first recipient: validation, credentials, or the
    /// dispatcher shutting down. [`DispatchError::Interrupted`] if the batch
    /// task itself died.
    pub async fn submit(
        &self,
        user_id: UserId,
        composition: EmailComposition,
    ) -> Result<BatchResult, DispatchError> {
        let (batch, credentials) = self.admit(user_id, composition).await?;
        let batch_id = batch.id();

        self.spawn(batch, credentials).await.map_err(|e| {
            internal!(level = ERROR, "Batch {batch_id} task failed: {e}");
            DispatchError::Interrupted(batch_id)
        })
    }

    /// Like [`Self::submit`], but only the batch id is returned.
    ///
    /// # Errors
    ///
    /// The same pre-dispatch errors as [`Self::submit`].
    pub async fn submit_background(
        &self,
        user_id: UserId,
        composition: EmailComposition,
    ) -> Result<BatchId, DispatchError> {
        let (batch, credentials) = self.admit(user_id, composition).await?;
        let batch_id = batch.id();

        drop(self.spawn(batch, credentials));

        Ok(batch_id)
    }

    /// Register `batch` and run it on a detached task.
    fn spawn(&self, batch: Batch, credentials: Credentials) -> JoinHandle<BatchResult> {
        let registration = self.registry.register(self.in_flight(&batch));
        let dispatcher = self.clone();

        tokio::spawn(async move {
            let result = dispatcher
                .dispatch(&batch, &credentials, registration.token())
                .await;
            internal!(
                level = DEBUG,
                "Batch {} finished: {} sent, {} failed",
                result.batch_id,
                result.sent,
                result.failed
            );
            drop(registration);
            result
        })
    }

    async fn admit(
        &self,
        user_id: UserId,
        composition: EmailComposition,
    ) -> Result<(Batch, Credentials), DispatchError> {
        if self.registry.is_shutting_down() {
            return Err(DispatchError::ShuttingDown);
        }

        let batch = self.validator.prepare(user_id, composition)?;
        let credentials = self.credentials.resolve(batch.user_id()).await?;

        audit::log_batch_submitted(
            batch.id(),
            batch.user_id(),
            batch.recipients().len(),
            batch.attachments().len(),
        );

        Ok((batch, credentials))
    }

    fn in_flight(&self, batch: &Batch) -> InFlight {
        InFlight {
            batch_id: batch.id(),
            user_id: batch.user_id().clone(),
            recipients: batch.recipients().len(),
            started_at: self.clock.now(),
        }
    }

    /// Send `batch` to every recipient in order.
    ///
    /// Never fails: transport errors become `FAILED` rows and log write
    /// failures are reported in [`BatchResult::persistence_errors`].
    #[traced(instrument(level = tracing::Level::INFO, skip_all, fields(batch = %batch.id())), timing(precision = "ms"))]
    pub async fn dispatch(
        &self,
        batch: &Batch,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> BatchResult {
        let started = Instant::now();
        let template = MessageTemplate::new(batch, credentials);
        let recipients = batch.recipients();
        let mut result = BatchResult::new(batch.id());
        let mut step = Step::Next(0);

        loop {
            step = match step {
                Step::Next(index) if index >= recipients.len() => Step::Finished,
                Step::Next(index) if cancel.is_cancelled() => Step::Cancelled(index),
                Step::Next(index) => {
                    self.attempt(batch, &template, credentials, &recipients[index], &mut result)
                        .await;

                    let next = index + 1;
                    if next < recipients.len() && !batch.delay().is_zero() {
                        Step::Pause(next)
                    } else {
                        Step::Next(next)
                    }
                }
                Step::Pause(next) => {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => Step::Cancelled(next),
                        () = self.throttle.pause(batch.delay()) => Step::Next(next),
                    }
                }
                Step::Cancelled(next) => {
                    internal!(
                        level = INFO,
                        "Batch {} cancelled with {} recipients remaining",
                        batch.id(),
                        recipients.len() - next
                    );
                    result.cancelled = true;
                    result.skipped = recipients.len() - next;
                    break;
                }
                Step::Finished => break,
            };
        }

        audit::log_batch_completed(&result, started.elapsed().as_millis());
        result
    }

    /// One recipient: queue the row, call the provider, record the outcome.
    async fn attempt(
        &self,
        batch: &Batch,
        template: &MessageTemplate,
        credentials: &Credentials,
        recipient: &str,
        result: &mut BatchResult,
    ) {
        let attempt = match self.recorder.open(batch, recipient).await {
            Ok(attempt) => attempt,
            Err(e) => {
                let failure = PersistenceFailure {
                    recipient: recipient.to_string(),
                    stage: PersistenceStage::Queue,
                    delivered: None,
                    error: e.to_string(),
                };
                audit::log_attempt_unrecorded(batch.id(), &failure);

                result.record_failed(recipient, format!("Could not record send attempt: {e}"));
                result.record_persistence_failure(failure);
                return;
            }
        };

        let outcome = self
            .transport
            .send(credentials, &template.for_recipient(recipient))
            .await;

        match &outcome {
            TransportOutcome::Sent { .. } => result.record_sent(),
            TransportOutcome::Failed { error } => result.record_failed(recipient, error.as_str()),
        }

        if let Err(e) = self.recorder.close(attempt, &outcome).await {
            let failure = PersistenceFailure {
                recipient: recipient.to_string(),
                stage: PersistenceStage::Finalize,
                delivered: Some(outcome.is_sent()),
                error: e.to_string(),
            };
            audit::log_attempt_unrecorded(batch.id(), &failure);
            result.record_persistence_failure(failure);
        }
    }

    /// Send the provider's connection test message with `credentials`.
    pub async fn test_connection(&self, credentials: &Credentials) -> TransportOutcome {
        self.transport.test_connection(credentials).await
    }

    /// The current state of one of `user_id`'s batches.
    ///
    /// # Errors
    ///
    /// [`DispatchError::NotFound`] when the batch does not exist or belongs
    /// to someone else.
    pub async fn batch_status(
        &self,
        user_id: &UserId,
        batch_id: BatchId,
    ) -> Result<BatchStatus, DispatchError> {
        let in_flight = self
            .registry
            .get(batch_id)
            .filter(|info| &info.user_id == user_id);

        match self.recorder.reconstruct(batch_id).await? {
            Some((owner, result)) if &owner == user_id => Ok(BatchStatus {
                in_flight: in_flight.is_some(),
                result,
            }),
            Some(_) => Err(DispatchError::NotFound(batch_id)),
            None => in_flight
                .map(|_| BatchStatus {
                    in_flight: true,
                    result: BatchResult::new(batch_id),
                })
                .ok_or(DispatchError::NotFound(batch_id)),
        }
    }

    /// Stop one of `user_id`'s running batches after its current recipient.
    pub fn cancel(&self, user_id: &UserId, batch_id: BatchId) -> bool {
        self.registry.cancel(user_id, batch_id)
    }

    /// Cancel everything running and refuse new batches.
    pub fn shutdown(&self) {
        self.registry.cancel_all();
    }

    /// Close the `QUEUED` rows of every batch still running as failed with
    /// `reason`, for when the process will not wait for them any longer.
    /// Returns how many rows were closed.
    pub async fn interrupt_in_flight(&self, reason: &str) -> usize {
        let mut closed = 0;

        for batch_id in self.registry.batch_ids() {
            match self.recorder.fail_queued(batch_id, reason).await {
                Ok(count) => closed += count,
                Err(e) => {
                    internal!(level = ERROR, "Failed to close open rows of batch {batch_id}: {e}");
                }
            }
        }

        closed
    }
}
