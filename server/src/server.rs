//! Daemon setup and lifecycle.
//!
//! `Server::new` does everything that must happen before traffic is
//! accepted: directories, ledger, startup recovery, policy.  A ledger that
//! fails verification stops the daemon here.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};

use warden_audit::FileLedger;
use warden_contracts::{WardenError, WardenResult};
use warden_core::traits::{AdmissionPolicy, AuditLedger};
use warden_core::{run_startup_recovery, Governor, RecoveryReport};
use warden_policy::RulePolicy;

use crate::config::WardenConfig;
use crate::routes::build_router;
use crate::state::AppState;

pub struct Server {
    config: WardenConfig,
    state: AppState,
    recovery: RecoveryReport,
}

impl Server {
    pub fn new(config: WardenConfig) -> WardenResult<Self> {
        let config = config.absolutize()?;
        config.validate()?;

        let layout = config.layout();
        layout.ensure().map_err(|e| WardenError::ConfigError {
            reason: format!("cannot create processing directories: {e}"),
        })?;
        for dir in [config.inbox(), config.review()] {
            create_dir(&dir)?;
        }

        let ledger: Arc<dyn AuditLedger> = Arc::new(FileLedger::open(config.ledger())?);
        let mode = config.mode();

        let recovery = run_startup_recovery(ledger.as_ref(), &layout, mode).map_err(|e| {
            error!(ledger = %config.ledger().display(), error = %e, "startup recovery failed");
            e
        })?;
        if !recovery.is_clean() {
            warn!(
                quarantined = recovery.quarantined.len(),
                recovered = recovery.recovered_executions.len(),
                "previous run ended with work in flight"
            );
        }

        let policy: Arc<dyn AdmissionPolicy> = Arc::new(RulePolicy::new(config.policy.clone())?);
        let governor = Arc::new(Governor::new(config.governor_config(), policy, ledger));
        let state = AppState::new(governor, config.inbox(), config.review());

        Ok(Self {
            config,
            state,
            recovery,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }

    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Serve until Ctrl+C or SIGTERM.
    pub async fn run(self) -> WardenResult<()> {
        let addr = self.config.listen;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| WardenError::ConfigError {
                reason: format!("cannot listen on {addr}: {e}"),
            })?;

        info!(
            %addr,
            mode = %self.config.mode(),
            ledger = %self.config.ledger().display(),
            "wardend listening"
        );

        let app = self.router();
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| WardenError::InternalFailure {
                reason: format!("server error: {e}"),
            })?;

        info!("wardend shutting down");
        Ok(())
    }
}

fn create_dir(dir: &Path) -> WardenResult<()> {
    fs::create_dir_all(dir).map_err(|e| WardenError::ConfigError {
        reason: format!("cannot create '{}': {}", dir.display(), e),
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received terminate signal, shutting down"),
    }
}
