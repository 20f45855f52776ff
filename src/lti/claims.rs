//! Launch claim types — the untrusted decoded token and the trusted session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw claims decoded from an LTI resource-link ID token.
///
/// Everything here is **untrusted** until the launch validator has checked it
/// against the pending launch and the platform registration. LTI-specific
/// claims live under `purl.imsglobal.org` URIs per the IMS spec.
#[derive(Debug, Clone, Deserialize)]
pub struct LaunchClaims {
    /// Issuer
    #[serde(default)]
    pub iss: Option<String>,
    /// Audience (may be a single string or an array)
    #[serde(default)]
    pub aud: serde_json::Value,
    /// Authorized party
    #[serde(default)]
    pub azp: Option<String>,
    /// Expiry (Unix timestamp)
    #[serde(default)]
    pub exp: Option<u64>,
    /// Issued-at (Unix timestamp)
    #[serde(default)]
    pub iat: Option<u64>,
    /// Nonce from the authorization request
    #[serde(default)]
    pub nonce: Option<String>,
    /// Subject (opaque platform user id)
    #[serde(default)]
    pub sub: Option<String>,

    /// LTI deployment id claim
    #[serde(
        default,
        rename = "https://purl.imsglobal.org/spec/lti/claim/deployment_id"
    )]
    pub deployment_id: Option<String>,
    /// LTI context (course) claim
    #[serde(default, rename = "https://purl.imsglobal.org/spec/lti/claim/context")]
    pub context: Option<ContextClaim>,
    /// LTI resource link claim
    #[serde(
        default,
        rename = "https://purl.imsglobal.org/spec/lti/claim/resource_link"
    )]
    pub resource_link: Option<ResourceLinkClaim>,
    /// LTI role URIs for the launching user
    #[serde(default, rename = "https://purl.imsglobal.org/spec/lti/claim/roles")]
    pub roles: Vec<String>,
    /// Final destination URL inside the tool
    #[serde(
        default,
        rename = "https://purl.imsglobal.org/spec/lti/claim/target_link_uri"
    )]
    pub target_link_uri: Option<String>,
}

impl LaunchClaims {
    /// Whether the `aud` claim (string or array form) contains `client_id`.
    #[must_use]
    pub fn aud_contains(&self, client_id: &str) -> bool {
        match &self.aud {
            serde_json::Value::String(s) => s == client_id,
            serde_json::Value::Array(arr) => arr
                .iter()
                .any(|v| v.as_str().is_some_and(|s| s == client_id)),
            _ => false,
        }
    }
}

/// The `context` claim: which course the launch came from.
#[derive(Debug, Clone, Deserialize)]
pub struct ContextClaim {
    /// Opaque context id
    pub id: String,
    /// Human-readable title
    #[serde(default)]
    pub title: Option<String>,
}

/// The `resource_link` claim: which placement inside the course.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceLinkClaim {
    /// Opaque resource link id
    pub id: String,
    /// Human-readable title
    #[serde(default)]
    pub title: Option<String>,
}

/// A fully validated launch.
///
/// Built only by the launch validator after signature, state, and claim
/// checks all pass; immutable afterwards. Callers consume it immediately to
/// open the tool.
#[derive(Debug, Clone, Serialize)]
pub struct LaunchSession {
    /// Platform issuer
    pub issuer: String,
    /// Matched deployment id
    pub deployment_id: String,
    /// Platform user id
    pub subject: String,
    /// Course context id, if the platform sent one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    /// Course title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_title: Option<String>,
    /// Resource link id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_link_id: Option<String>,
    /// Resource link title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_link_title: Option<String>,
    /// LTI role URIs
    pub roles: Vec<String>,
    /// When validation completed
    pub validated_at: DateTime<Utc>,
    /// Configured tool launch URL
    pub launch_url: String,
    /// Final destination inside the tool, if the platform sent one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_link_uri: Option<String>,
}
