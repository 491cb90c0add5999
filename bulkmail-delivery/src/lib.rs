//! Batch dispatch: rendering, the provider transport, per-recipient outcome
//! recording and the throttled, cancellable dispatch loop.

pub mod clock;
pub mod config;
pub mod error;
pub mod recorder;
pub mod registry;
pub mod render;
pub mod scheduler;
pub mod transport;

pub use clock::{Clock, RecordingThrottle, SystemClock, Throttle, TokioThrottle};
pub use config::{DeliveryConfig, TransportConfig};
pub use error::{DispatchError, RecordError, TransportError};
pub use recorder::OutcomeRecorder;
pub use registry::{BatchRegistry, InFlight, Registration};
pub use render::{MessageTemplate, text_to_html};
pub use scheduler::{BatchStatus, Dispatcher};
pub use tokio_util::sync::CancellationToken;
pub use transport::{
    DryRunTransport, MockCall, MockTransport, OutboundAttachment, OutboundMessage, ResendConfig,
    ResendTransport, Transport, TransportOutcome,
};
