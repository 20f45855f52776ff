//! JWKS key cache — the platform's public signing keys, resolved by `kid`.
//!
//! # Resolution flow
//!
//! 1. Look the `kid` up in the cached key set.
//! 2. On a miss, fetch the JWKS endpoint, replace the cache **wholesale**,
//!    and retry the lookup once.
//! 3. Still absent: [`Error::UnknownKey`]. A fetch failure (network,
//!    non-2xx, malformed JSON) becomes [`Error::KeyFetch`] after one
//!    automatic retry; validation never proceeds against a stale or empty
//!    set.
//!
//! # Security properties
//!
//! - Only asymmetric keys (RSA, EC) are ever loaded; symmetric JWKS entries
//!   are skipped, so an `HS*` token can never verify.
//! - The algorithm bound to each key comes from the JWKS entry itself, not
//!   from the token header.

use std::collections::HashMap;

use jsonwebtoken::{
    Algorithm, DecodingKey,
    jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm},
};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::{Error, Result};

/// A signing key resolved from the platform's JWKS.
#[derive(Clone)]
pub struct SigningKey {
    /// Key id
    pub kid: String,
    /// Algorithm this key verifies; the token header must declare the same
    pub algorithm: Algorithm,
    /// Prepared verification key
    pub key: DecodingKey,
}

/// Cache of the platform's signing keys, refreshed wholesale on miss.
pub struct KeyCache {
    jwks_url: String,
    http: reqwest::Client,
    keys: RwLock<HashMap<String, SigningKey>>,
    /// Serializes refreshes; duplicate fetches are harmless (idempotent GET)
    /// but there is no reason to hammer the platform under a thundering herd.
    refresh_lock: tokio::sync::Mutex<()>,
}

impl KeyCache {
    /// Create a cache for one platform's JWKS endpoint.
    #[must_use]
    pub fn new(jwks_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            jwks_url: jwks_url.into(),
            http,
            keys: RwLock::new(HashMap::new()),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// For tests: a cache pre-seeded with a known key and no live endpoint.
    #[must_use]
    pub fn with_static_key(key: SigningKey) -> Self {
        let cache = Self::new(String::new(), reqwest::Client::new());
        cache.keys.write().insert(key.kid.clone(), key);
        cache
    }

    /// Resolve a key by id, refreshing the set once if it is not cached.
    ///
    /// # Errors
    ///
    /// [`Error::KeyFetch`] if the JWKS endpoint cannot be read,
    /// [`Error::UnknownKey`] if the id is absent even after a refresh.
    pub async fn resolve(&self, kid: &str) -> Result<SigningKey> {
        if let Some(key) = self.keys.read().get(kid) {
            return Ok(key.clone());
        }

        let _flight = self.refresh_lock.lock().await;

        // Another validation may have refreshed while we waited
        if let Some(key) = self.keys.read().get(kid) {
            return Ok(key.clone());
        }

        debug!(kid = %kid, "Key not in cached JWKS, refreshing");
        self.refresh().await?;

        self.keys
            .read()
            .get(kid)
            .cloned()
            .ok_or_else(|| Error::UnknownKey(kid.to_string()))
    }

    /// Fetch the JWKS and replace the cached set wholesale.
    ///
    /// The fetch is retried once on failure; a second failure surfaces as
    /// [`Error::KeyFetch`] and the previous cache contents are kept (they
    /// were already insufficient for the current lookup, but remain valid
    /// for tokens signed with known keys).
    async fn refresh(&self) -> Result<()> {
        let jwks = match self.fetch().await {
            Ok(jwks) => jwks,
            Err(e) => {
                warn!(error = %e, "JWKS fetch failed, retrying once");
                self.fetch().await?
            }
        };

        let mut keys = HashMap::new();
        for jwk in &jwks.keys {
            if let Some(key) = signing_key_from_jwk(jwk) {
                keys.insert(key.kid.clone(), key);
            }
        }

        debug!(count = keys.len(), "Replaced cached JWKS");
        *self.keys.write() = keys;
        Ok(())
    }

    async fn fetch(&self) -> Result<JwkSet> {
        let response = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| Error::KeyFetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::KeyFetch(format!(
                "JWKS endpoint returned HTTP {}",
                response.status()
            )));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| Error::KeyFetch(format!("invalid JWKS document: {e}")))
    }
}

/// Convert a JWK into a [`SigningKey`], skipping entries we cannot use.
///
/// Symmetric keys are skipped deliberately: accepting them would let a token
/// downgrade to an HMAC over the public key material.
fn signing_key_from_jwk(jwk: &Jwk) -> Option<SigningKey> {
    let kid = jwk.common.key_id.clone()?;

    let (key, family_default) = match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => (
            DecodingKey::from_rsa_components(&rsa.n, &rsa.e).ok()?,
            Algorithm::RS256,
        ),
        AlgorithmParameters::EllipticCurve(ec) => (
            DecodingKey::from_ec_components(&ec.x, &ec.y).ok()?,
            Algorithm::ES256,
        ),
        AlgorithmParameters::OctetKey(_) | AlgorithmParameters::OctetKeyPair(_) => return None,
    };

    let algorithm = match jwk.common.key_algorithm {
        Some(KeyAlgorithm::RS256) => Algorithm::RS256,
        Some(KeyAlgorithm::RS384) => Algorithm::RS384,
        Some(KeyAlgorithm::RS512) => Algorithm::RS512,
        Some(KeyAlgorithm::ES256) => Algorithm::ES256,
        Some(KeyAlgorithm::ES384) => Algorithm::ES384,
        Some(other) => {
            warn!(kid = %kid, alg = %other, "Skipping JWKS entry with unsupported algorithm");
            return None;
        }
        None => family_default,
    };

    Some(SigningKey {
        kid,
        algorithm,
        key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rsa_jwk(kid: &str, alg: Option<&str>) -> Jwk {
        // Any well-formed modulus works here; these tests never verify a
        // signature, only the JWK -> SigningKey conversion rules.
        let mut jwk = json!({
            "kty": "RSA",
            "kid": kid,
            "use": "sig",
            "n": "thmQwc2oL9_bO_LciW2adacZmORlvUOXCVA_N6WjRaXRlE3l_ioKLGxg7-HQmX7kWdkqBg6xjKWlzVeWb76GqQZm49CcgEjbId2LAmJ1GstSkUSeTNTGflpzXn0OIcs6d9fNpwdJK1e3k9nolGBXUQ_7Uomwqplpni83ZQRMlZnWAfxMqKUDOFGANPQUPhIUA1Nhlesa5fGLiC29bPormPV6QGaMGppQyGOg7xNsqkYoeYiLkVuDp1Iqk_YUs94WykAarAEqsp61SXWC968bP1Hwn7yMY_glrLBJumwa54wI1mzaysTvxTKpalJLZWLJP7XcA8D1nHMuyEWdsCF9Sw",
            "e": "AQAB"
        });
        if let Some(alg) = alg {
            jwk["alg"] = json!(alg);
        }
        serde_json::from_value(jwk).unwrap()
    }

    #[test]
    fn test_rsa_jwk_without_alg_defaults_to_rs256() {
        let key = signing_key_from_jwk(&rsa_jwk("k1", None)).unwrap();
        assert_eq!(key.kid, "k1");
        assert!(matches!(key.algorithm, Algorithm::RS256));
    }

    #[test]
    fn test_rsa_jwk_carries_declared_alg() {
        let key = signing_key_from_jwk(&rsa_jwk("k1", Some("RS512"))).unwrap();
        assert!(matches!(key.algorithm, Algorithm::RS512));
    }

    #[test]
    fn test_jwk_without_kid_is_skipped() {
        let jwk: Jwk = serde_json::from_value(json!({
            "kty": "RSA",
            "n": "thmQwc2oL9_bO_LciW2adacZmORlvUOXCVA_N6WjRaXRlE3l_ioKLGxg7-HQmX7kWdkqBg6xjKWlzVeWb76GqQZm49CcgEjbId2LAmJ1GstSkUSeTNTGflpzXn0OIcs6d9fNpwdJK1e3k9nolGBXUQ_7Uomwqplpni83ZQRMlZnWAfxMqKUDOFGANPQUPhIUA1Nhlesa5fGLiC29bPormPV6QGaMGppQyGOg7xNsqkYoeYiLkVuDp1Iqk_YUs94WykAarAEqsp61SXWC968bP1Hwn7yMY_glrLBJumwa54wI1mzaysTvxTKpalJLZWLJP7XcA8D1nHMuyEWdsCF9Sw",
            "e": "AQAB"
        }))
        .unwrap();
        assert!(signing_key_from_jwk(&jwk).is_none());
    }

    #[test]
    fn test_symmetric_jwk_is_never_loaded() {
        let jwk: Jwk = serde_json::from_value(json!({
            "kty": "oct",
            "kid": "hmac-key",
            "k": "c2VjcmV0LXNlY3JldC1zZWNyZXQ"
        }))
        .unwrap();
        assert!(signing_key_from_jwk(&jwk).is_none());
    }

    #[tokio::test]
    async fn test_static_cache_resolves_seeded_key() {
        let cache = KeyCache::with_static_key(SigningKey {
            kid: "seeded".to_string(),
            algorithm: Algorithm::RS256,
            key: DecodingKey::from_rsa_components(
                "thmQwc2oL9_bO_LciW2adacZmORlvUOXCVA_N6WjRaXRlE3l_ioKLGxg7-HQmX7kWdkqBg6xjKWlzVeWb76GqQZm49CcgEjbId2LAmJ1GstSkUSeTNTGflpzXn0OIcs6d9fNpwdJK1e3k9nolGBXUQ_7Uomwqplpni83ZQRMlZnWAfxMqKUDOFGANPQUPhIUA1Nhlesa5fGLiC29bPormPV6QGaMGppQyGOg7xNsqkYoeYiLkVuDp1Iqk_YUs94WykAarAEqsp61SXWC968bP1Hwn7yMY_glrLBJumwa54wI1mzaysTvxTKpalJLZWLJP7XcA8D1nHMuyEWdsCF9Sw",
                "AQAB",
            )
            .unwrap(),
        });

        assert!(cache.resolve("seeded").await.is_ok());
    }
}
