use std::{sync::Arc, time::Duration};

use bulkmail_common::ValidationLimits;
use serde::Deserialize;

use crate::{
    error::TransportError,
    transport::{DryRunTransport, ResendConfig, ResendTransport, Transport},
};

/// ```ron
/// delivery: (
///     transport: (type: "Resend", timeout_secs: 30),
///     limits: (max_recipients: 100),
/// ),
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub limits: ValidationLimits,
}

/// Which provider messages go to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum TransportConfig {
    Resend(ResendConfig),
    /// Log messages instead of sending them
    DryRun,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Resend(ResendConfig::default())
    }
}

impl TransportConfig {
    /// # Errors
    ///
    /// If the HTTP client for the provider cannot be built.
    pub fn build(&self) -> Result<Arc<dyn Transport>, TransportError> {
        match self {
            Self::Resend(config) => Ok(Arc::new(ResendTransport::new(config)?)),
            Self::DryRun => Ok(Arc::new(DryRunTransport)),
        }
    }

    /// Longest a single provider call may take before the transport gives up.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        match self {
            Self::Resend(config) => Duration::from_secs(config.timeout_secs),
            Self::DryRun => Duration::ZERO,
        }
    }
}
