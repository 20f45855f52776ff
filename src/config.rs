//! Configuration management
//!
//! Configuration is layered the same way everywhere the bridge runs: an
//! optional YAML file, then `LTI_BRIDGE_` environment variables (nested keys
//! joined with `__`, e.g. `LTI_BRIDGE_PLATFORM__ISSUER`), then CLI overrides.
//! The platform registration is validated once at startup; every missing
//! field is reported in a single error.

use std::{path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Loaded in order, later files override earlier. Files that don't exist
    /// are silently skipped.
    pub env_files: Vec<String>,
    /// HTTP server configuration
    pub server: ServerConfig,
    /// LTI platform registration (Moodle)
    pub platform: PlatformConfig,
    /// Pending-launch store configuration
    pub store: StoreConfig,
    /// Launch relay configuration
    pub relay: RelayConfig,
    /// Moodle web-service proxy configuration
    pub moodle: MoodleConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Static registration of this tool with one LTI platform.
///
/// Loaded once at process start and shared read-only by every component.
/// All fields are required; [`PlatformConfig::validate`] reports the complete
/// list of missing ones so operators fix the registration in one pass.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PlatformConfig {
    /// Platform issuer URL (the `iss` claim Moodle sends)
    pub issuer: String,
    /// OAuth client id assigned to this tool by the platform
    pub client_id: String,
    /// Deployment id scoping the registration to one platform tenant
    pub deployment_id: String,
    /// Platform OIDC authorization endpoint
    pub auth_endpoint: String,
    /// Platform JWKS endpoint (public signing keys)
    pub jwks_url: String,
    /// Fixed tool launch URL returned to callers after validation
    pub launch_url: String,
    /// Externally reachable origin of this bridge, used for `redirect_uri`
    pub tool_origin: String,
}

impl PlatformConfig {
    /// Check that every required field is present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming *all* missing fields.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        for (name, value) in [
            ("platform.issuer", &self.issuer),
            ("platform.client_id", &self.client_id),
            ("platform.deployment_id", &self.deployment_id),
            ("platform.auth_endpoint", &self.auth_endpoint),
            ("platform.jwks_url", &self.jwks_url),
            ("platform.launch_url", &self.launch_url),
            ("platform.tool_origin", &self.tool_origin),
        ] {
            if value.is_empty() {
                missing.push(name);
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "LTI platform configuration incomplete, missing: {}",
                missing.join(", ")
            )))
        }
    }

    /// The fixed launch-callback address registered with the platform.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("{}/lti/callback", self.tool_origin.trim_end_matches('/'))
    }
}

/// Pending-launch store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How long a pending launch stays consumable. Long enough for the user
    /// to click through the platform UI, short enough to bound replay risk.
    #[serde(with = "humantime_serde")]
    pub pending_ttl: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            pending_ttl: Duration::from_secs(300),
        }
    }
}

/// Launch relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// How long to wait for the platform's form post before giving up
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
        }
    }
}

/// Moodle web-service credentials for the course proxy endpoints.
///
/// Optional: when unset the proxy endpoints return a configuration error but
/// the launch protocol is unaffected.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MoodleConfig {
    /// Moodle base URL (e.g. `https://moodle.example.edu`)
    pub url: String,
    /// Web-service token with `core_course_*` access
    pub token: String,
}

impl MoodleConfig {
    /// Whether credentials are present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty() && !self.token.is_empty()
    }
}

impl Config {
    /// Load configuration from an optional YAML file plus environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file is missing or does not parse.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        // Load from file if provided
        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (LTI_BRIDGE_ prefix)
        figment = figment.merge(Env::prefixed("LTI_BRIDGE_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Load env files into process environment, then re-extract so
        // variables from those files take effect.
        if config.load_env_files() {
            let mut figment = Figment::new();
            if let Some(p) = path {
                figment = figment.merge(Yaml::file(p));
            }
            return figment
                .merge(Env::prefixed("LTI_BRIDGE_").split("__"))
                .extract()
                .map_err(|e| Error::Config(e.to_string()));
        }

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Returns `true` if at least one file was loaded.
    fn load_env_files(&self) -> bool {
        let mut loaded = false;
        for path_str in &self.env_files {
            let path = Path::new(path_str);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {path_str}");
                        loaded = true;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {path_str}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {path_str}");
            }
        }
        loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn complete_platform() -> PlatformConfig {
        PlatformConfig {
            issuer: "https://platform.example".to_string(),
            client_id: "client-123".to_string(),
            deployment_id: "dep-1".to_string(),
            auth_endpoint: "https://platform.example/mod/lti/auth.php".to_string(),
            jwks_url: "https://platform.example/mod/lti/certs.php".to_string(),
            launch_url: "https://tool.example/app".to_string(),
            tool_origin: "https://bridge.example".to_string(),
        }
    }

    #[test]
    fn test_complete_platform_validates() {
        assert!(complete_platform().validate().is_ok());
    }

    #[test]
    fn test_validate_reports_all_missing_fields() {
        let mut platform = complete_platform();
        platform.issuer = String::new();
        platform.jwks_url = String::new();

        let err = platform.validate().unwrap_err().to_string();
        assert!(err.contains("platform.issuer"));
        assert!(err.contains("platform.jwks_url"));
        assert!(!err.contains("platform.client_id"));
    }

    #[test]
    fn test_redirect_uri_no_double_slash() {
        let mut platform = complete_platform();
        platform.tool_origin = "https://bridge.example/".to_string();
        assert_eq!(platform.redirect_uri(), "https://bridge.example/lti/callback");
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.store.pending_ttl, Duration::from_secs(300));
        assert_eq!(config.relay.timeout, Duration::from_secs(120));
        assert!(!config.moodle.is_configured());
    }

    #[test]
    fn test_load_from_yaml_file() {
        use std::io::Write;

        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            r#"
server:
  port: 9090
platform:
  issuer: "https://moodle.example.edu"
  client_id: "abc"
store:
  pending_ttl: 2m
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.platform.issuer, "https://moodle.example.edu");
        assert_eq!(config.store.pending_ttl, Duration::from_secs(120));
        // Incomplete platform still loads; validation is a separate step
        assert!(config.platform.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/bridge.yaml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
