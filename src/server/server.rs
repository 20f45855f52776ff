//! Bridge server — binds the listener and runs until shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::router::{AppState, create_router};
use crate::config::Config;
use crate::lti::{CallbackMessage, LaunchService};
use crate::moodle::MoodleClient;
use crate::{Error, Result};

/// The LTI bridge server.
pub struct Bridge {
    config: Config,
    launch: Arc<LaunchService>,
}

impl Bridge {
    /// Create a bridge from validated configuration.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the platform registration is incomplete. This is
    /// a single fatal error at boot, not rediscovered per request.
    pub fn new(config: Config) -> Result<Self> {
        config.platform.validate()?;

        let launch = Arc::new(LaunchService::new(
            config.platform.clone(),
            config.store.pending_ttl,
        ));

        Ok(Self { config, launch })
    }

    /// The launch service, for embedding callers (the interactive CLI).
    #[must_use]
    pub fn launch_service(&self) -> Arc<LaunchService> {
        Arc::clone(&self.launch)
    }

    /// Run the server until ctrl-c / SIGTERM.
    pub async fn run(self) -> Result<()> {
        self.run_with_relay(None).await
    }

    /// Run the server, optionally forwarding callback posts to a relay.
    pub async fn run_with_relay(
        self,
        relay_tx: Option<mpsc::Sender<CallbackMessage>>,
    ) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let moodle = if self.config.moodle.is_configured() {
            Some(MoodleClient::from_config(&self.config.moodle)?)
        } else {
            warn!("Moodle credentials not configured; /api/courses is disabled");
            None
        };

        let state = Arc::new(AppState {
            launch: Arc::clone(&self.launch),
            moodle,
            relay_tx,
        });

        let app = create_router(state);
        let listener = TcpListener::bind(addr).await?;

        info!(
            version = env!("CARGO_PKG_VERSION"),
            host = %self.config.server.host,
            port = self.config.server.port,
            issuer = %self.config.platform.issuer,
            "LTI bridge listening"
        );
        info!(redirect_uri = %self.config.platform.redirect_uri(), "Register this redirect URI with the platform");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        info!("Bridge shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
