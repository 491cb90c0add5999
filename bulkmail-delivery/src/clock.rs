//! Time sources injected into the dispatcher.

use std::{fmt::Debug, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Wall-clock timestamps for `queued_at` and `sent_at`.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// The pause between two consecutive provider calls.
///
/// Must be cancel safe: the dispatcher drops the future when the batch is
/// cancelled mid-pause.
#[async_trait]
pub trait Throttle: Send + Sync + Debug {
    async fn pause(&self, duration: Duration);
}

/// Sleeps on the tokio timer, so paused-time tests still observe the delay.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioThrottle;

#[async_trait]
impl Throttle for TokioThrottle {
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Returns immediately, remembering each requested pause.
#[derive(Debug, Clone, Default)]
pub struct RecordingThrottle {
    pauses: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingThrottle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.lock().clone()
    }
}

#[async_trait]
impl Throttle for RecordingThrottle {
    async fn pause(&self, duration: Duration) {
        self.pauses.lock().push(duration);
    }
}
