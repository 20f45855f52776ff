//! Launch validator — signature and claims verification for incoming launches.
//!
//! # Verification flow
//!
//! 1. Structural check: the token must be a three-segment compact JWT.
//! 2. Decode the header, resolve the signing key by `kid` from the JWKS
//!    cache, and verify the signature. The header algorithm must equal the
//!    algorithm bound to the key in the JWKS; a token cannot pick its own.
//! 3. Decode the payload into [`LaunchClaims`] (still untrusted).
//! 4. Atomically consume the pending launch for `state`. A missing, expired,
//!    or already-consumed record ends the attempt; a concurrent duplicate
//!    with the same `state` cannot also succeed.
//! 5. Check registered claims (`iss`, `aud`, `azp`, `exp`, `iat`, `nonce`)
//!    and the LTI deployment claim, collecting every mismatch.
//! 6. Only then build the trusted [`LaunchSession`].
//!
//! Claims are never trusted before the signature verifies; an earlier
//! revision of this flow decoded the payload without verification and that
//! must not come back.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::Utc;
use jsonwebtoken::{Validation, decode, decode_header};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use super::claims::{LaunchClaims, LaunchSession};
use super::jwks::KeyCache;
use super::store::{PendingLaunch, PendingLaunchStore};
use crate::config::PlatformConfig;
use crate::error::AuthError;
use crate::Result;

/// Clock-skew allowance for `exp` and `iat` (seconds).
const CLOCK_SKEW_SECS: u64 = 300;

/// Verifies incoming ID tokens against the platform registration.
pub struct LaunchValidator {
    config: Arc<PlatformConfig>,
    keys: Arc<KeyCache>,
    store: Arc<PendingLaunchStore>,
}

impl LaunchValidator {
    /// Create a validator over the shared config, key cache, and store.
    #[must_use]
    pub fn new(
        config: Arc<PlatformConfig>,
        keys: Arc<KeyCache>,
        store: Arc<PendingLaunchStore>,
    ) -> Self {
        Self {
            config,
            keys,
            store,
        }
    }

    /// Validate a launch and return the trusted session.
    ///
    /// # Errors
    ///
    /// [`AuthError`] variants for rejected tokens, [`Error::KeyFetch`] /
    /// [`Error::UnknownKey`] when the signing key cannot be resolved.
    pub async fn validate(&self, id_token: &str, state: &str) -> Result<LaunchSession> {
        // 1. Structure
        if id_token.split('.').count() != 3 {
            return Err(AuthError::Format("token is not a compact JWT".to_string()).into());
        }

        // 2. Header, key resolution, signature
        let header = decode_header(id_token)
            .map_err(|e| AuthError::Format(format!("invalid JWT header: {e}")))?;
        let kid = header
            .kid
            .as_deref()
            .ok_or_else(|| AuthError::Format("JWT header has no 'kid'".to_string()))?;

        let key = self.keys.resolve(kid).await?;

        if header.alg != key.algorithm {
            warn!(kid = %kid, "Token algorithm does not match JWKS entry");
            return Err(AuthError::Signature(
                "token algorithm does not match the platform's key".to_string(),
            )
            .into());
        }

        let mut validation = Validation::new(key.algorithm);
        // All claim checks are done manually below, against the pending
        // launch and with a 5-minute skew window.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims::<&str>(&[]);

        // 3. Signature verified; payload decoded but still untrusted
        let claims = decode::<LaunchClaims>(id_token, &key.key, &validation)
            .map_err(|e| AuthError::Signature(e.to_string()))?
            .claims;

        // 4. Single-use state consumption (the replay gate)
        let pending = self
            .store
            .consume_if_valid(state)
            .ok_or(AuthError::ReplayOrExpired)?;

        // 5 & 6. Claims against registration and pending launch
        let details = self.check_claims(&claims, &pending);
        if !details.is_empty() {
            warn!(mismatches = details.len(), "Launch claim validation failed");
            return Err(AuthError::Claims { details }.into());
        }

        debug!(sub = ?claims.sub, "LTI launch validated");

        // 7. Trusted session
        Ok(LaunchSession {
            issuer: claims.iss.unwrap_or_default(),
            deployment_id: claims.deployment_id.unwrap_or_default(),
            subject: claims.sub.unwrap_or_default(),
            context_id: claims.context.as_ref().map(|c| c.id.clone()),
            context_title: claims.context.and_then(|c| c.title),
            resource_link_id: claims.resource_link.as_ref().map(|r| r.id.clone()),
            resource_link_title: claims.resource_link.and_then(|r| r.title),
            roles: claims.roles,
            validated_at: Utc::now(),
            launch_url: self.config.launch_url.clone(),
            target_link_uri: claims.target_link_uri,
        })
    }

    /// Collect every claim mismatch. An empty result means the token is good.
    fn check_claims(&self, claims: &LaunchClaims, pending: &PendingLaunch) -> Vec<String> {
        let mut details = Vec::new();
        let now = unix_now();

        match claims.iss.as_deref() {
            Some(iss) if iss == self.config.issuer => {}
            Some(iss) => details.push(format!(
                "Invalid issuer: expected {}, got {iss}",
                self.config.issuer
            )),
            None => details.push("Missing issuer claim".to_string()),
        }

        if !claims.aud_contains(&self.config.client_id) {
            details.push(format!(
                "Invalid audience: {} not in aud",
                self.config.client_id
            ));
        }

        if let Some(ref azp) = claims.azp {
            if azp != &self.config.client_id {
                details.push(format!(
                    "Invalid azp: expected {}, got {azp}",
                    self.config.client_id
                ));
            }
        }

        match claims.exp {
            Some(exp) if exp + CLOCK_SKEW_SECS < now => {
                details.push(format!("Token expired: exp {exp}, now {now}"));
            }
            Some(_) => {}
            None => details.push("Missing exp claim".to_string()),
        }

        match claims.iat {
            Some(iat) if iat > now + CLOCK_SKEW_SECS => {
                details.push(format!("Token issued in the future: iat {iat}, now {now}"));
            }
            Some(_) => {}
            None => details.push("Missing iat claim".to_string()),
        }

        // The stored nonce is the only acceptable one; a caller-supplied
        // value is never consulted.
        let nonce_ok = claims.nonce.as_ref().is_some_and(|nonce| {
            nonce.as_bytes().ct_eq(pending.nonce.as_bytes()).into()
        });
        if !nonce_ok {
            details.push("Nonce mismatch".to_string());
        }

        match claims.deployment_id.as_deref() {
            Some(dep) if dep == self.config.deployment_id => {}
            Some(dep) => details.push(format!(
                "Invalid deployment_id: expected {}, got {dep}",
                self.config.deployment_id
            )),
            None => details.push("Missing deployment_id claim".to_string()),
        }

        details
    }
}

/// Current Unix time in seconds.
fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}
