//! Cluster configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Node registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// How long a node stays registered without a heartbeat.
    #[serde(with = "humantime_serde")]
    pub node_ttl: Duration,

    /// How often the liveness sweep runs.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            node_ttl: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(10),
        }
    }
}

impl RegistryConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a message when either duration is zero.
    pub fn validate(&self) -> Result<(), String> {
        if self.node_ttl.is_zero() {
            return Err("node_ttl must be > 0".to_string());
        }
        if self.sweep_interval.is_zero() {
            return Err("sweep_interval must be > 0".to_string());
        }
        Ok(())
    }
}

/// Autoscaler configuration.
///
/// The thresholds must satisfy
/// `0 < scale_down_threshold < target_saturation < scale_up_threshold < 1`;
/// the band between the two thresholds is the hysteresis dead zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoscalerConfig {
    /// Master switch; when off every recommendation is `NONE`.
    pub enabled: bool,

    /// Smallest fleet the autoscaler will recommend.
    pub min_nodes: u32,

    /// Largest fleet the autoscaler will recommend.
    pub max_nodes: u32,

    /// Saturation at or above which the fleet grows.
    pub scale_up_threshold: f64,

    /// Saturation at or below which the fleet may shrink.
    pub scale_down_threshold: f64,

    /// Saturation the fleet is sized towards.
    pub target_saturation: f64,

    /// Quiet period after a scaling action.
    #[serde(with = "humantime_serde")]
    pub cooldown: Duration,
}

impl Default for AutoscalerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_nodes: 1,
            max_nodes: 10,
            scale_up_threshold: 0.8,
            scale_down_threshold: 0.3,
            target_saturation: 0.6,
            cooldown: Duration::from_secs(300),
        }
    }
}

impl AutoscalerConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a message when the threshold ordering or node bounds are
    /// inconsistent.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_nodes == 0 {
            return Err("min_nodes must be > 0".to_string());
        }
        if self.max_nodes < self.min_nodes {
            return Err("max_nodes must be >= min_nodes".to_string());
        }
        let ordered = 0.0 < self.scale_down_threshold
            && self.scale_down_threshold < self.target_saturation
            && self.target_saturation < self.scale_up_threshold
            && self.scale_up_threshold < 1.0;
        if !ordered {
            return Err(
                "thresholds must satisfy 0 < scale_down < target < scale_up < 1".to_string(),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(RegistryConfig::default().validate().is_ok());
        assert!(AutoscalerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_threshold_ordering_enforced() {
        let mut config = AutoscalerConfig::default();
        config.scale_down_threshold = 0.7;
        assert!(config.validate().is_err());

        config.scale_down_threshold = 0.3;
        config.target_saturation = 0.9;
        assert!(config.validate().is_err());

        config.target_saturation = 0.6;
        config.scale_up_threshold = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_node_bounds() {
        let mut config = AutoscalerConfig::default();
        config.min_nodes = 0;
        assert!(config.validate().is_err());

        config.min_nodes = 5;
        config.max_nodes = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_parsing() {
        let toml_src = r#"
            node_ttl = "30s"
            sweep_interval = "10s"
        "#;
        let config: RegistryConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.node_ttl, Duration::from_secs(30));
    }
}
