//! Fleet domain types.

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::error::{ClusterError, ClusterResult};

/// Lifecycle state of an execution node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    /// Heartbeating within TTL; eligible for new matches.
    Healthy,
    /// Existing matches continue; no new matches are scheduled.
    Draining,
    /// Heartbeat older than TTL; eligible for eviction.
    Unhealthy,
}

/// Declared capacity of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCapacity {
    /// Maximum containers the node will host. Always positive.
    pub max_containers: u32,
}

impl NodeCapacity {
    /// Validates the capacity.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for a zero capacity.
    pub fn validate(&self) -> ClusterResult<()> {
        if self.max_containers == 0 {
            return Err(ClusterError::invalid_request(
                "max_containers must be positive",
            ));
        }
        Ok(())
    }
}

/// Utilization metrics a node reports with every heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetrics {
    /// Containers currently running.
    pub container_count: u32,

    /// Matches currently running.
    pub match_count: u32,

    /// CPU usage in `[0, 1]`.
    pub cpu_usage: f64,

    /// Memory in use, MiB.
    pub memory_used_mb: u64,

    /// Memory available, MiB.
    pub memory_max_mb: u64,
}

impl NodeMetrics {
    /// Validates the metrics.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` when `cpu_usage` is not a finite value in
    /// `[0, 1]`.
    pub fn validate(&self) -> ClusterResult<()> {
        if !self.cpu_usage.is_finite() || !(0.0..=1.0).contains(&self.cpu_usage) {
            return Err(ClusterError::invalid_request(
                "cpu_usage must be within [0, 1]",
            ));
        }
        Ok(())
    }
}

/// A registered execution node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Opaque id chosen by the node at registration.
    pub id: String,

    /// Endpoint the control plane reaches the node at.
    pub endpoint_url: String,

    /// Declared capacity.
    pub capacity: NodeCapacity,

    /// Last reported metrics.
    pub metrics: NodeMetrics,

    /// Lifecycle state.
    pub status: NodeStatus,

    /// When the node last heartbeated.
    #[serde(with = "time::serde::rfc3339")]
    pub last_heartbeat_at: OffsetDateTime,

    /// When the node first registered.
    #[serde(with = "time::serde::rfc3339")]
    pub registered_at: OffsetDateTime,
}

impl Node {
    /// Returns `true` if the node's heartbeat is older than `ttl` at `now`.
    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime, ttl: Duration) -> bool {
        self.last_heartbeat_at + ttl < now
    }

    /// The status accounting for TTL expiry: an expired node reads as
    /// [`NodeStatus::Unhealthy`] whatever its stored status says.
    #[must_use]
    pub fn effective_status(&self, now: OffsetDateTime, ttl: Duration) -> NodeStatus {
        if self.is_expired(now, ttl) {
            NodeStatus::Unhealthy
        } else {
            self.status
        }
    }

    /// Returns `true` if the node has a free container slot.
    #[must_use]
    pub fn has_capacity(&self) -> bool {
        self.metrics.container_count < self.capacity.max_containers
    }
}

/// What the autoscaler recommends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScalingAction {
    /// Leave the fleet as it is.
    None,
    /// Add nodes.
    ScaleUp,
    /// Remove nodes.
    ScaleDown,
}

/// A scale recommendation with the numbers behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingRecommendation {
    /// The recommended action.
    pub action: ScalingAction,

    /// Healthy nodes at decision time.
    pub current_nodes: u32,

    /// Target fleet size.
    pub recommended_nodes: u32,

    /// Saturation at decision time.
    pub current_saturation: f64,

    /// Saturation the configuration aims for.
    pub target_saturation: f64,

    /// Why this action was chosen.
    pub reason: String,
}

impl ScalingRecommendation {
    /// A no-op recommendation keeping the current fleet size.
    #[must_use]
    pub fn none(
        current_nodes: u32,
        current_saturation: f64,
        target_saturation: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            action: ScalingAction::None,
            current_nodes,
            recommended_nodes: current_nodes,
            current_saturation,
            target_saturation,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(status: NodeStatus, heartbeat: OffsetDateTime) -> Node {
        Node {
            id: "n1".to_string(),
            endpoint_url: "http://10.0.0.1:7700".to_string(),
            capacity: NodeCapacity { max_containers: 10 },
            metrics: NodeMetrics::default(),
            status,
            last_heartbeat_at: heartbeat,
            registered_at: heartbeat,
        }
    }

    #[test]
    fn test_capacity_validation() {
        assert!(NodeCapacity { max_containers: 1 }.validate().is_ok());
        assert!(NodeCapacity { max_containers: 0 }.validate().is_err());
    }

    #[test]
    fn test_metrics_validation() {
        let mut metrics = NodeMetrics::default();
        assert!(metrics.validate().is_ok());

        metrics.cpu_usage = 1.0;
        assert!(metrics.validate().is_ok());

        metrics.cpu_usage = 1.5;
        assert!(metrics.validate().is_err());

        metrics.cpu_usage = f64::NAN;
        assert!(metrics.validate().is_err());
    }

    #[test]
    fn test_effective_status_reflects_expiry() {
        let start = OffsetDateTime::UNIX_EPOCH;
        let ttl = Duration::seconds(30);
        let n = node(NodeStatus::Healthy, start);

        assert_eq!(
            n.effective_status(start + Duration::seconds(30), ttl),
            NodeStatus::Healthy
        );
        assert_eq!(
            n.effective_status(start + Duration::seconds(31), ttl),
            NodeStatus::Unhealthy
        );

        let draining = node(NodeStatus::Draining, start);
        assert_eq!(
            n.effective_status(start, ttl),
            NodeStatus::Healthy
        );
        assert_eq!(
            draining.effective_status(start + Duration::seconds(31), ttl),
            NodeStatus::Unhealthy
        );
    }

    #[test]
    fn test_has_capacity() {
        let mut n = node(NodeStatus::Healthy, OffsetDateTime::UNIX_EPOCH);
        assert!(n.has_capacity());
        n.metrics.container_count = 10;
        assert!(!n.has_capacity());
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&NodeStatus::Draining).unwrap(),
            r#""DRAINING""#
        );
        assert_eq!(
            serde_json::to_string(&ScalingAction::ScaleUp).unwrap(),
            r#""SCALE_UP""#
        );
    }
}
