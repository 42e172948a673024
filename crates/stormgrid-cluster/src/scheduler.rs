//! Least-loaded match placement.
//!
//! Placement works on one snapshot of the registry: healthy nodes with a
//! free container slot are scored by weighted load, and the lowest score
//! wins. Ties break on lexicographic node id so placement is deterministic.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::{ClusterError, ClusterResult};
use crate::registry::NodeRegistry;
use crate::types::{Node, NodeStatus};

/// Weight of container saturation in the load score.
const CONTAINER_WEIGHT: f64 = 0.7;
/// Weight of match saturation in the load score.
const MATCH_WEIGHT: f64 = 0.3;

/// Places match workloads onto registry nodes.
pub struct Scheduler {
    registry: Arc<NodeRegistry>,
}

impl Scheduler {
    /// Creates a scheduler over the registry.
    #[must_use]
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self { registry }
    }

    /// Selects the node a new match should run on.
    ///
    /// `required_modules` is reserved for module-aware placement and is a
    /// pass-through today. A surviving `preferred_node_id` wins regardless
    /// of score.
    ///
    /// # Errors
    ///
    /// - `NoAvailableNodes`: no healthy node exists
    /// - `NoCapableNodes`: healthy nodes exist but all are full
    pub async fn select_node(
        &self,
        _required_modules: &[String],
        preferred_node_id: Option<&str>,
    ) -> ClusterResult<Node> {
        let snapshot = self.registry.list().await;

        let healthy: Vec<&Node> = snapshot
            .iter()
            .filter(|node| node.status == NodeStatus::Healthy)
            .collect();
        if healthy.is_empty() {
            return Err(ClusterError::NoAvailableNodes);
        }

        let candidates: Vec<&Node> = healthy
            .iter()
            .copied()
            .filter(|node| node.has_capacity())
            .collect();
        if candidates.is_empty() {
            return Err(ClusterError::NoCapableNodes);
        }

        if let Some(preferred) = preferred_node_id
            && let Some(node) = candidates.iter().find(|n| n.id == preferred)
        {
            tracing::debug!(node_id = %preferred, "Placed match on preferred node");
            return Ok((*node).clone());
        }

        let chosen = candidates
            .into_iter()
            .min_by(|a, b| {
                load_score(a)
                    .partial_cmp(&load_score(b))
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.id.cmp(&b.id))
            })
            .expect("candidates is non-empty");

        tracing::debug!(
            node_id = %chosen.id,
            score = load_score(chosen),
            "Selected node for match"
        );
        Ok(chosen.clone())
    }

    /// Ratio of used container slots to total slots across healthy nodes;
    /// 0 when there are none.
    pub async fn cluster_saturation(&self) -> f64 {
        let snapshot = self.registry.list().await;
        saturation_of(
            snapshot
                .iter()
                .filter(|node| node.status == NodeStatus::Healthy),
        )
    }
}

/// Weighted load score; lower is less loaded.
fn load_score(node: &Node) -> f64 {
    let cap = f64::from(node.capacity.max_containers);
    f64::from(node.metrics.container_count) / cap * CONTAINER_WEIGHT
        + f64::from(node.metrics.match_count) / cap * MATCH_WEIGHT
}

/// Saturation over an iterator of nodes.
pub(crate) fn saturation_of<'a>(nodes: impl Iterator<Item = &'a Node>) -> f64 {
    let (used, total) = nodes.fold((0u64, 0u64), |(used, total), node| {
        (
            used + u64::from(node.metrics.container_count),
            total + u64::from(node.capacity.max_containers),
        )
    });
    if total == 0 {
        0.0
    } else {
        used as f64 / total as f64
    }
}
