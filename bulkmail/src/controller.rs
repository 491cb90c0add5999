use std::{sync::LazyLock, time::Duration};

use bulkmail_api::{ApiConfig, ApiServer, AppState};
use bulkmail_common::{Signal, Validator, audit, audit::AuditConfig, internal, logging};
use bulkmail_delivery::{DeliveryConfig, Dispatcher};
use bulkmail_ledger::LedgerConfig;
use bulkmail_tracing::traced;
use bulkmail_vault::{SeedUser, SettingsStore, Vault, VaultConfig};
use serde::Deserialize;
use tokio::sync::broadcast;

/// Added on top of the provider call timeout when waiting for batches to
/// finish their current recipient at shutdown.
const DRAIN_MARGIN: Duration = Duration::from_secs(5);

/// Error recorded on rows still open when shutdown stops waiting.
pub const INTERRUPTED_BY_SHUTDOWN: &str = "Interrupted by shutdown";

/// The whole service, as read from `bulkmail.config.ron`.
///
/// ```ron
/// Bulkmail(
///     ledger: (type: "File", path: "/var/lib/bulkmail/ledger"),
///     delivery: (transport: (type: "Resend")),
///     api: (listen_address: "[::]:3000"),
///     users: [(id: "alice", sender_email: Some("news@example.com"))],
/// )
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct Bulkmail {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(alias = "user", default)]
    pub users: Vec<SeedUser>,
}

/// A wired dispatcher and a bound, not yet serving, API server.
pub struct Service {
    pub dispatcher: Dispatcher,
    pub server: ApiServer,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

#[traced(instrument(level = tracing::Level::TRACE))]
async fn shutdown_requested() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, shutting down");
        }
    };

    Ok(())
}

/// Wait up to `timeout` for running batches to stop, then close whatever
/// rows they left `QUEUED` as failed. Returns how many rows were closed.
pub async fn drain(dispatcher: &Dispatcher, timeout: Duration) -> usize {
    let registry = dispatcher.registry();
    let drained = tokio::time::timeout(timeout, async {
        while registry.in_flight_count() > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;

    if drained.is_ok() {
        return 0;
    }

    internal!(
        level = WARN,
        "{} batch(es) still running after {}s, abandoning them",
        registry.in_flight_count(),
        timeout.as_secs()
    );

    let closed = dispatcher.interrupt_in_flight(INTERRUPTED_BY_SHUTDOWN).await;
    if closed > 0 {
        internal!(level = WARN, "Closed {closed} unfinished send attempt(s) as failed");
    }

    closed
}

impl Bulkmail {
    /// How long shutdown waits for running batches: one provider call plus
    /// a margin for recording its outcome.
    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        self.delivery.transport.call_timeout() + DRAIN_MARGIN
    }

    /// Build the store, transport, dispatcher and API server around `vault`.
    ///
    /// # Errors
    ///
    /// If the ledger or settings file cannot be opened, the transport cannot
    /// be built, or the API listener cannot bind.
    #[traced(instrument(level = tracing::Level::DEBUG, skip_all, err), timing(precision = "ms"))]
    pub async fn assemble(self, vault: Vault) -> anyhow::Result<Service> {
        let store = self.ledger.into_store()?;
        let transport = self.delivery.transport.build()?;
        let mut settings = SettingsStore::new(vault).with_users(self.users);
        if let Some(path) = &self.vault.settings_path {
            settings = settings.with_file(path)?;
        }

        let dispatcher = Dispatcher::new(
            Validator::new(self.delivery.limits),
            std::sync::Arc::new(settings.clone()),
            transport,
            store,
        );

        let state = AppState::new(dispatcher.clone(), settings, &self.api.user_header)?;
        let server = ApiServer::new(&self.api, state).await?;

        Ok(Service { dispatcher, server })
    }

    /// Run the service until CTRL+C or SIGTERM.
    ///
    /// On shutdown, running batches are cancelled between recipients, the
    /// API server finishes open requests, and running batches get one provider
    /// timeout to finish their current recipient before their open rows are
    /// closed as failed.
    ///
    /// # Errors
    ///
    /// This function will return an error if any part of the service fails
    /// to initialise, or the API server stops on its own.
    #[traced(instrument(level = tracing::Level::TRACE, skip_all, err), timing(precision = "s"))]
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();
        audit::init(self.audit.clone());

        let vault = self.vault.open()?;
        let drain_timeout = self.drain_timeout();
        let Service { dispatcher, server } = self.assemble(vault).await?;

        internal!(level = INFO, "Controller running");

        let mut server = tokio::spawn(server.serve(SHUTDOWN_BROADCAST.subscribe()));

        tokio::select! {
            r = &mut server => {
                internal!(level = ERROR, "API server stopped unexpectedly");
                dispatcher.shutdown();
                r??;
                return Ok(());
            }
            r = shutdown_requested() => r?,
        }

        internal!(level = INFO, "Shutting down...");

        dispatcher.shutdown();
        SHUTDOWN_BROADCAST
            .send(Signal::Shutdown)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

        tokio::select! {
            r = &mut server => r??,
            _ = tokio::signal::ctrl_c() => {
                internal!(level = WARN, "Forced shutdown");
                return Ok(());
            }
        }

        drain(&dispatcher, drain_timeout).await;

        internal!(level = INFO, "Shutdown complete");
        Ok(())
    }
}
