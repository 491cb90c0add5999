//! API HTTP server

use std::{net::SocketAddr, time::Duration};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use bulkmail_common::Signal;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::{ApiConfig, AppState, ServerError, handlers};

/// Build the full route table.
///
/// `/api/emails/send` holds the connection for the whole batch, so it is the
/// one route outside the request timeout.
pub fn router(state: AppState, config: &ApiConfig) -> Router {
    let bounded = Router::new()
        .route("/api/emails/batches", post(handlers::submit))
        .route(
            "/api/emails/batches/{id}",
            get(handlers::batch_status).delete(handlers::cancel),
        )
        .route("/api/emails/logs", get(handlers::logs))
        .route("/api/emails/stats", get(handlers::stats))
        .route(
            "/api/settings",
            get(handlers::settings).put(handlers::update_settings),
        )
        .route("/api/settings/test-connection", post(handlers::test_connection))
        .route("/api/recipients/parse", post(handlers::parse_recipients))
        .route("/health/live", get(handlers::live))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )));

    Router::new()
        .route("/api/emails/send", post(handlers::send))
        .merge(bounded)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// API HTTP server
pub struct ApiServer {
    listener: TcpListener,
    router: Router,
}

impl ApiServer {
    /// Bind the listener and build the routes.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the configured address fails.
    pub async fn new(config: &ApiConfig, state: AppState) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.listen_address)
            .await
            .map_err(|e| ServerError::Bind {
                address: config.listen_address.clone(),
                source: e,
            })?;

        tracing::info!(
            address = %config.listen_address,
            "API server bound successfully"
        );

        Ok(Self {
            listener,
            router: router(state, config),
        })
    }

    /// # Errors
    ///
    /// If the bound socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Server(e.to_string()))
    }

    /// Run the server until a shutdown signal is received
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a runtime error.
    pub async fn serve(
        self,
        mut shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<(), ServerError> {
        tracing::info!("API server starting");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("API server received shutdown signal");
            })
            .await
            .map_err(|e| ServerError::Server(e.to_string()))?;

        tracing::info!("API server stopped");
        Ok(())
    }
}
