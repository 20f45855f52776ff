//! Login initiator — builds the OIDC third-party-initiated login request.
//!
//! Each call mints a fresh `state`/`nonce` pair (256 bits of entropy each,
//! URL-safe base64), records a pending launch, and returns the platform
//! authorization URL the browser must open. The platform answers with a
//! `form_post` of the signed ID token to the fixed `redirect_uri`.

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngExt;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::store::PendingLaunchStore;
use crate::config::PlatformConfig;
use crate::{Error, Result};

/// Caller request to start a launch.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Sub-resource inside the tool to ultimately open
    #[serde(default)]
    pub target_url: Option<String>,
    /// Platform login hint, forwarded verbatim
    #[serde(default)]
    pub login_hint: Option<String>,
}

/// Everything the browser side needs to open the platform's authorization UI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Fully built authorization URL
    pub auth_url: String,
    /// Freshly minted `state`
    pub state: String,
    /// Freshly minted `nonce`
    pub nonce: String,
    /// The tool's fixed launch-callback address
    pub redirect_uri: String,
}

/// Builds authorization requests and records pending launches.
pub struct LoginInitiator {
    config: Arc<PlatformConfig>,
    store: Arc<PendingLaunchStore>,
}

impl LoginInitiator {
    /// Create an initiator over the shared platform config and store.
    #[must_use]
    pub fn new(config: Arc<PlatformConfig>, store: Arc<PendingLaunchStore>) -> Self {
        Self { config, store }
    }

    /// Start a launch attempt.
    ///
    /// Side effect: exactly one new pending launch in the store.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the platform registration is incomplete.
    pub fn begin(&self, request: &LoginRequest) -> Result<LoginResponse> {
        self.config.validate()?;

        let state = generate_token();
        let nonce = generate_token();
        let redirect_uri = self.config.redirect_uri();

        self.store
            .create(state.clone(), nonce.clone(), request.target_url.clone());

        let mut auth_url = Url::parse(&self.config.auth_endpoint)
            .map_err(|e| Error::Config(format!("invalid auth endpoint: {e}")))?;

        {
            let mut params = auth_url.query_pairs_mut();
            params.append_pair("client_id", &self.config.client_id);
            params.append_pair("redirect_uri", &redirect_uri);
            params.append_pair("response_type", "id_token");
            params.append_pair("response_mode", "form_post");
            params.append_pair("scope", "openid");
            params.append_pair("prompt", "none");
            params.append_pair("state", &state);
            params.append_pair("nonce", &nonce);
            params.append_pair(
                "login_hint",
                request.login_hint.as_deref().unwrap_or("auto"),
            );

            if let Some(ref target_url) = request.target_url {
                params.append_pair("lti_message_hint", target_url);
            }
        }

        debug!(redirect_uri = %redirect_uri, "Initiated LTI login");

        Ok(LoginResponse {
            auth_url: auth_url.into(),
            state,
            nonce,
            redirect_uri,
        })
    }
}

/// 32 random bytes as URL-safe base64 (43 chars, 256 bits of entropy).
fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(bytes)
}
