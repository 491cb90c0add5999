//! HTTP API for bulkmail
//!
//! Every `/api` route identifies the caller by a header set by the
//! authentication proxy in front of the service (`x-user-id` by default);
//! requests without it get `401`.
//!
//! # Endpoints
//!
//! - **`POST /api/emails/send`** - Send a batch and wait for the result; the
//!   batch finishes even if the client goes away
//! - **`POST /api/emails/batches`** - Start a batch in the background (`202`)
//! - **`GET /api/emails/batches/{id}`** - Result so far, rebuilt from the log
//! - **`DELETE /api/emails/batches/{id}`** - Cancel a running batch
//! - **`GET /api/emails/logs`** - Paginated send history
//! - **`GET /api/emails/stats`** - Send totals
//! - **`GET|PUT /api/settings`** - Sender settings and API key, kept in
//!   `vault.settings_path` when configured
//! - **`POST /api/settings/test-connection`** - Check an API key
//! - **`POST /api/recipients/parse`** - Split pasted CSV into recipients
//! - **`GET /health/live`** - Liveness check

mod config;
mod error;
mod handlers;
mod payload;
mod server;
mod state;

use axum::http::HeaderName;
use bulkmail_delivery::Dispatcher;
use bulkmail_vault::SettingsStore;

pub use config::ApiConfig;
pub use error::{ApiError, ServerError};
pub use payload::{
    AcceptedResponse, AttachmentPayload, LogRow, SendRequest, SendResponse,
    TestConnectionRequest, TestConnectionResponse,
};
pub use server::{ApiServer, router};
pub use state::{AppState, Caller};

impl AppState {
    /// # Errors
    ///
    /// If `user_header` is not a valid header name.
    pub fn new(
        dispatcher: Dispatcher,
        settings: SettingsStore,
        user_header: &str,
    ) -> Result<Self, ServerError> {
        let user_header = HeaderName::try_from(user_header)
            .map_err(|_| ServerError::InvalidHeader(user_header.to_string()))?;

        Ok(Self {
            dispatcher,
            settings,
            user_header,
        })
    }
}
