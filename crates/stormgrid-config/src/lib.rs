//! Configuration loading for the Stormgrid control plane.
//!
//! Configuration merges, in priority order: built-in defaults, an optional
//! TOML file, and `STORMGRID_`-prefixed environment variables (`__` as the
//! section separator, e.g. `STORMGRID_AUTH__ISSUER`). Configuration is
//! immutable after process start; there is no hot reload.

use std::path::Path;

use serde::{Deserialize, Serialize};
use stormgrid_auth::config::AuthConfig;
use stormgrid_cluster::config::{AutoscalerConfig, RegistryConfig};

/// Error loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file or environment could not be read or parsed.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// The merged configuration is inconsistent.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Address the server binds to.
    pub bind_address: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Root configuration of the control-plane process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listener.
    pub server: HttpConfig,

    /// Auth core (issuer, signing, TTLs, seeded clients, rate limits).
    pub auth: AuthConfig,

    /// Node registry (TTL, sweep interval).
    pub registry: RegistryConfig,

    /// Autoscaler thresholds and cooldown.
    pub autoscaler: AutoscalerConfig,
}

impl ServerConfig {
    /// Loads configuration from defaults, an optional TOML file, and the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns `Load` for unreadable/unparseable sources and `Invalid`
    /// when the merged result fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("STORMGRID")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: Self = settings.try_deserialize()?;
        loaded.validate()?;
        if let Some(path) = path {
            tracing::info!(path = %path.display(), "Loaded configuration");
        }
        Ok(loaded)
    }

    /// Validates the merged configuration.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` describing the first inconsistency found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.bind_address.is_empty() {
            return Err(ConfigError::Invalid(
                "server.bind_address cannot be empty".to_string(),
            ));
        }
        self.auth
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.registry
            .validate()
            .map_err(ConfigError::Invalid)?;
        self.autoscaler
            .validate()
            .map_err(ConfigError::Invalid)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = ServerConfig::load(None).unwrap();
        assert_eq!(config.registry.node_ttl.as_secs(), 30);
        assert!(config.autoscaler.enabled);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        write!(
            file,
            r#"
            [server]
            bind_address = "127.0.0.1:9000"

            [auth]
            issuer = "https://control.test"

            [registry]
            node_ttl = "45s"

            [autoscaler]
            max_nodes = 20

            [[auth.clients]]
            client_id = "ops"
            secret = "s3cret"
            kind = "confidential"
            allowed_scopes = ["engine.*"]
            allowed_grants = ["client_credentials"]
            "#
        )
        .unwrap();

        let config = ServerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:9000");
        assert_eq!(config.auth.issuer, "https://control.test");
        assert_eq!(config.registry.node_ttl.as_secs(), 45);
        assert_eq!(config.autoscaler.max_nodes, 20);
        assert_eq!(config.auth.clients.len(), 1);
    }

    #[test]
    fn test_invalid_file_rejected() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        write!(
            file,
            r#"
            [autoscaler]
            scale_down_threshold = 0.9
            "#
        )
        .unwrap();

        let err = ServerConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
