//! LTI 1.3 launch protocol — the trust core of the bridge.
//!
//! Two-phase launch: a third-party-initiated OIDC login ([`login`]) followed
//! by verification of the platform's signed ID token ([`validate`]). The
//! platform and tool never share a password; every launch stands on its own
//! `state`/`nonce` pair ([`store`]) and the platform's published signing keys
//! ([`jwks`]). The [`relay`] drives a whole attempt end to end.

pub mod claims;
pub mod jwks;
pub mod login;
pub mod relay;
pub mod store;
pub mod validate;

use std::sync::Arc;
use std::time::Duration;

pub use claims::{LaunchClaims, LaunchSession};
pub use jwks::{KeyCache, SigningKey};
pub use login::{LoginInitiator, LoginRequest, LoginResponse};
pub use relay::{
    CallbackMessage, CompletedLaunch, LaunchOutcome, LaunchRelay, RelayError, RelayPhase,
    SystemBrowserOpener,
};
pub use store::{PendingLaunch, PendingLaunchStore};
pub use validate::LaunchValidator;

use crate::Result;
use crate::config::PlatformConfig;

/// The launch service — everything a launch needs, wired together.
///
/// Holds the shared platform registration, pending-launch store, and JWKS
/// cache, and exposes the two operations the HTTP handlers and the relay
/// call: [`begin_login`](Self::begin_login) and
/// [`validate_launch`](Self::validate_launch).
pub struct LaunchService {
    config: Arc<PlatformConfig>,
    store: Arc<PendingLaunchStore>,
    initiator: LoginInitiator,
    validator: LaunchValidator,
}

impl LaunchService {
    /// Wire up the service from the platform registration.
    #[must_use]
    pub fn new(platform: PlatformConfig, pending_ttl: Duration) -> Self {
        let keys = Arc::new(KeyCache::new(
            platform.jwks_url.clone(),
            reqwest::Client::new(),
        ));
        let config = Arc::new(platform);
        let store = Arc::new(PendingLaunchStore::new(pending_ttl));

        Self {
            initiator: LoginInitiator::new(Arc::clone(&config), Arc::clone(&store)),
            validator: LaunchValidator::new(Arc::clone(&config), keys, Arc::clone(&store)),
            config,
            store,
        }
    }

    /// Start a launch: mint `state`/`nonce`, record the pending launch, and
    /// build the platform authorization URL.
    pub fn begin_login(&self, request: &LoginRequest) -> Result<LoginResponse> {
        self.initiator.begin(request)
    }

    /// Verify a returned ID token against the pending launch for `state`.
    pub async fn validate_launch(&self, id_token: &str, state: &str) -> Result<LaunchSession> {
        self.validator.validate(id_token, state).await
    }

    /// The platform registration this service was built with.
    #[must_use]
    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    /// The pending-launch store (the health endpoint reports its size).
    #[must_use]
    pub fn store(&self) -> &PendingLaunchStore {
        &self.store
    }
}
