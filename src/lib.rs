//! LTI Bridge Library
//!
//! Lets a web tool act as an LTI 1.3 (Advantage) *tool* trusted by a
//! learning-management *platform* (Moodle). Trust is established per launch:
//! an OIDC third-party-initiated login mints a single-use `state`/`nonce`
//! pair, the platform answers with a signed ID token, and the launch
//! validator verifies the signature against the platform's JWKS before any
//! claim is believed.
//!
//! # Components
//!
//! - [`lti::LoginInitiator`] - builds the authorization request
//! - [`lti::KeyCache`] - the platform's public keys, refreshed on unknown kid
//! - [`lti::LaunchValidator`] - signature + claims verification
//! - [`lti::PendingLaunchStore`] - single-use state records
//! - [`lti::LaunchRelay`] - drives one attempt end to end
//! - [`moodle::MoodleClient`] - course catalogue pass-through
//! - [`server::Bridge`] - the HTTP surface

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod lti;
pub mod moodle;
pub mod server;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
