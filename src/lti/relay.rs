//! Launch relay — drives one launch attempt from initiation to a verified
//! session.
//!
//! The relay is the orchestrator that sits between the caller and the
//! platform's authorization UI. It owns a single typed message channel: the
//! launch callback endpoint forwards `{id_token, state}` into it when the
//! platform's form post arrives. Waiting is purely event-driven (message,
//! window close, or timeout). The window's internal state is never polled;
//! the authorization page is cross-origin, and polling could not tell user
//! cancellation apart from a slow platform anyway.
//!
//! State machine per attempt:
//!
//! ```text
//! Idle -> Initiating -> AwaitingPlatform -> Validating -> Launched
//!              |                |                |
//!              +----------------+----------------+--> Failed
//! ```

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::LaunchService;
use super::claims::LaunchSession;
use crate::Error;

/// Phases of one launch attempt. `Launched` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayPhase {
    /// Nothing started yet
    Idle,
    /// Building the authorization request
    Initiating,
    /// Authorization UI open, waiting for the platform's form post
    AwaitingPlatform,
    /// Token received, verification in progress
    Validating,
    /// Verified session available
    Launched,
    /// Attempt ended without a session
    Failed,
}

/// The message the callback page relays from the platform's form post.
#[derive(Debug, Clone)]
pub struct CallbackMessage {
    /// The signed ID token
    pub id_token: String,
    /// The `state` echoed back by the platform
    pub state: String,
}

/// Why a launch attempt failed.
///
/// Every variant leaves the caller with an actionable next step: retry, or
/// open the tool URL directly without a verified session (degraded mode).
#[derive(Debug, Error)]
pub enum RelayError {
    /// The browser refused to open the authorization window.
    #[error("authorization window was blocked by the browser")]
    PopupBlocked,
    /// No response from the platform within the configured window.
    #[error("timed out waiting for the platform response")]
    Timeout,
    /// The user closed the authorization window before the platform answered.
    #[error("authorization window was closed before the launch completed")]
    UserCancelled,
    /// Initiation or validation failed server-side.
    #[error(transparent)]
    Launch(#[from] Error),
}

/// A handle to the spawned authorization window.
#[async_trait]
pub trait PlatformWindow: Send {
    /// Resolves when the user closes the window. For backends that cannot
    /// observe the window (a detached browser tab), this never resolves and
    /// the timeout bounds the wait instead.
    async fn closed(&mut self);

    /// Close the window if it is still open. Idempotent.
    fn close(&mut self);
}

/// Opens the platform's authorization UI.
#[async_trait]
pub trait WindowOpener: Send + Sync {
    /// Open `url`; `None` means the popup was blocked.
    async fn open(&self, url: &str) -> Option<Box<dyn PlatformWindow>>;
}

/// Opens the system browser. Cannot observe or close the spawned tab, so
/// [`PlatformWindow::closed`] never resolves for this backend.
pub struct SystemBrowserOpener;

struct SystemBrowserWindow;

#[async_trait]
impl PlatformWindow for SystemBrowserWindow {
    async fn closed(&mut self) {
        std::future::pending::<()>().await;
    }

    fn close(&mut self) {}
}

#[async_trait]
impl WindowOpener for SystemBrowserOpener {
    async fn open(&self, url: &str) -> Option<Box<dyn PlatformWindow>> {
        match open::that(url) {
            Ok(()) => Some(Box::new(SystemBrowserWindow)),
            Err(e) => {
                warn!(error = %e, "Failed to open system browser");
                None
            }
        }
    }
}

/// The result of a finished launch attempt.
pub struct LaunchOutcome {
    /// Terminal phase (`Launched` or `Failed`)
    pub phase: RelayPhase,
    /// The verified session, or why there is none
    pub result: Result<CompletedLaunch, RelayError>,
    /// Where the caller should send the user in degraded mode
    pub fallback_url: String,
}

/// A successful launch, ready for the caller to open the tool.
pub struct CompletedLaunch {
    /// The validated session
    pub session: LaunchSession,
    /// Configured tool launch URL
    pub launch_url: String,
    /// Final destination inside the tool, when the platform sent one
    pub target_link_uri: Option<String>,
}

/// Drives a single launch attempt. One relay per attempt; the receiver it is
/// given is the attempt's only message listener and is dropped on every
/// terminal transition, so stale handlers can never leak into a retry.
pub struct LaunchRelay<'a> {
    service: &'a LaunchService,
    opener: &'a dyn WindowOpener,
    timeout: Duration,
    phase: RelayPhase,
}

impl<'a> LaunchRelay<'a> {
    /// Create a relay for one attempt.
    #[must_use]
    pub fn new(service: &'a LaunchService, opener: &'a dyn WindowOpener, timeout: Duration) -> Self {
        Self {
            service,
            opener,
            timeout,
            phase: RelayPhase::Idle,
        }
    }

    /// Run the attempt to completion.
    ///
    /// `request` carries the target sub-resource and login hint; `messages`
    /// receives the callback page's relayed form post.
    pub async fn run(
        mut self,
        request: super::login::LoginRequest,
        mut messages: mpsc::Receiver<CallbackMessage>,
    ) -> LaunchOutcome {
        let fallback_url = request
            .target_url
            .clone()
            .unwrap_or_else(|| self.service.config().launch_url.clone());

        self.phase = RelayPhase::Initiating;
        let login = match self.service.begin_login(&request) {
            Ok(login) => login,
            Err(e) => return self.fail(fallback_url, e.into()),
        };

        let Some(mut window) = self.opener.open(&login.auth_url).await else {
            return self.fail(fallback_url, RelayError::PopupBlocked);
        };

        self.phase = RelayPhase::AwaitingPlatform;
        debug!(timeout = ?self.timeout, "Waiting for platform form post");

        let message = tokio::select! {
            message = messages.recv() => match message {
                Some(message) => message,
                // The callback channel is gone; nothing can arrive anymore.
                None => {
                    window.close();
                    return self.fail(fallback_url, RelayError::UserCancelled);
                }
            },
            () = window.closed() => {
                return self.fail(fallback_url, RelayError::UserCancelled);
            }
            () = sleep(self.timeout) => {
                window.close();
                return self.fail(fallback_url, RelayError::Timeout);
            }
        };

        // Terminal transitions follow; detach the listener now so a second
        // message cannot reach a finished attempt.
        drop(messages);

        self.phase = RelayPhase::Validating;
        match self
            .service
            .validate_launch(&message.id_token, &message.state)
            .await
        {
            Ok(session) => {
                window.close();
                self.phase = RelayPhase::Launched;
                info!("LTI launch completed");
                LaunchOutcome {
                    phase: self.phase,
                    fallback_url,
                    result: Ok(CompletedLaunch {
                        launch_url: session.launch_url.clone(),
                        target_link_uri: session.target_link_uri.clone(),
                        session,
                    }),
                }
            }
            Err(e) => {
                window.close();
                self.fail(fallback_url, e.into())
            }
        }
    }

    fn fail(mut self, fallback_url: String, error: RelayError) -> LaunchOutcome {
        warn!(error = %error, "LTI launch attempt failed");
        self.phase = RelayPhase::Failed;
        LaunchOutcome {
            phase: self.phase,
            fallback_url,
            result: Err(error),
        }
    }
}
