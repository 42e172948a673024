//! Closed-loop scale recommendations.
//!
//! The autoscaler reads one consistent snapshot of the node list, computes
//! cluster saturation, and recommends growing or shrinking the fleet
//! towards the target saturation. Hysteresis comes from the dead zone
//! between the two thresholds; a cooldown after every acknowledged action
//! stops the loop from thrashing.

use std::sync::Arc;

use stormgrid_core::Clock;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::config::AutoscalerConfig;
use crate::registry::NodeRegistry;
use crate::scheduler::saturation_of;
use crate::types::{Node, NodeStatus, ScalingAction, ScalingRecommendation};

#[derive(Debug, Default)]
struct AutoscalerState {
    last_action_at: Option<OffsetDateTime>,
    last_recommendation: Option<ScalingRecommendation>,
}

/// Produces scale recommendations from registry state.
pub struct Autoscaler {
    registry: Arc<NodeRegistry>,
    config: AutoscalerConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<AutoscalerState>,
}

impl Autoscaler {
    /// Creates an autoscaler over the registry.
    #[must_use]
    pub fn new(
        registry: Arc<NodeRegistry>,
        config: AutoscalerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            config,
            clock,
            state: Mutex::new(AutoscalerState::default()),
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &AutoscalerConfig {
        &self.config
    }

    /// Returns `true` while the post-action cooldown is running.
    pub async fn in_cooldown(&self) -> bool {
        let state = self.state.lock().await;
        self.cooldown_active(&state)
    }

    fn cooldown_active(&self, state: &AutoscalerState) -> bool {
        let Some(last) = state.last_action_at else {
            return false;
        };
        let cooldown =
            time::Duration::try_from(self.config.cooldown).unwrap_or(time::Duration::ZERO);
        self.clock.now() < last + cooldown
    }

    /// Records that a scaling action was taken; starts the cooldown for
    /// every subsequent [`Autoscaler::get_recommendation`] call.
    pub async fn record_scaling_action(&self) {
        let mut state = self.state.lock().await;
        state.last_action_at = Some(self.clock.now());
        tracing::info!("Recorded scaling action, cooldown started");
    }

    /// The most recent recommendation, if one was computed.
    pub async fn get_last_recommendation(&self) -> Option<ScalingRecommendation> {
        self.state.lock().await.last_recommendation.clone()
    }

    /// Computes a scale recommendation from the current fleet state.
    pub async fn get_recommendation(&self) -> ScalingRecommendation {
        // One snapshot; the whole decision is made from it.
        let snapshot = self.registry.list().await;
        let mut state = self.state.lock().await;

        let recommendation = self.decide(&snapshot, &state);
        tracing::debug!(
            action = ?recommendation.action,
            current = recommendation.current_nodes,
            recommended = recommendation.recommended_nodes,
            saturation = recommendation.current_saturation,
            reason = %recommendation.reason,
            "Autoscaler recommendation"
        );
        state.last_recommendation = Some(recommendation.clone());
        recommendation
    }

    fn decide(&self, snapshot: &[Node], state: &AutoscalerState) -> ScalingRecommendation {
        let target = self.config.target_saturation;

        if !self.config.enabled {
            return ScalingRecommendation::none(0, 0.0, target, "disabled");
        }
        if self.cooldown_active(state) {
            return ScalingRecommendation::none(0, 0.0, target, "cooldown");
        }

        let healthy: Vec<&Node> = snapshot
            .iter()
            .filter(|node| node.status == NodeStatus::Healthy)
            .collect();
        let current_nodes = healthy.len() as u32;

        if current_nodes == 0 {
            return ScalingRecommendation {
                action: ScalingAction::ScaleUp,
                current_nodes: 0,
                recommended_nodes: self.config.min_nodes,
                current_saturation: 0.0,
                target_saturation: target,
                reason: "no healthy nodes".to_string(),
            };
        }

        let total_cap: u64 = healthy
            .iter()
            .map(|n| u64::from(n.capacity.max_containers))
            .sum();
        let total_used: u64 = healthy
            .iter()
            .map(|n| u64::from(n.metrics.container_count))
            .sum();
        let saturation = saturation_of(healthy.iter().copied());
        let avg_cap = total_cap as f64 / f64::from(current_nodes);

        if saturation >= self.config.scale_up_threshold {
            if current_nodes >= self.config.max_nodes {
                return ScalingRecommendation::none(current_nodes, saturation, target, "at max");
            }
            let target_cap = total_used as f64 / target;
            let target_nodes = ((target_cap / avg_cap).ceil() as u32)
                .clamp(current_nodes + 1, self.config.max_nodes);
            return ScalingRecommendation {
                action: ScalingAction::ScaleUp,
                current_nodes,
                recommended_nodes: target_nodes,
                current_saturation: saturation,
                target_saturation: target,
                reason: format!("saturation {saturation:.2} above scale-up threshold"),
            };
        }

        if saturation <= self.config.scale_down_threshold {
            if current_nodes <= self.config.min_nodes {
                return ScalingRecommendation::none(current_nodes, saturation, target, "at min");
            }
            let target_cap = total_used as f64 / target;
            let target_nodes = ((target_cap / avg_cap).ceil() as u32)
                .clamp(self.config.min_nodes, current_nodes - 1);

            // Simulate the smaller fleet; back off if it would overshoot.
            let estimated_saturation = total_used as f64 / (avg_cap * f64::from(target_nodes));
            if estimated_saturation > self.config.scale_up_threshold {
                return ScalingRecommendation::none(
                    current_nodes,
                    saturation,
                    target,
                    "would thrash",
                );
            }
            return ScalingRecommendation {
                action: ScalingAction::ScaleDown,
                current_nodes,
                recommended_nodes: target_nodes,
                current_saturation: saturation,
                target_saturation: target,
                reason: format!("saturation {saturation:.2} below scale-down threshold"),
            };
        }

        ScalingRecommendation::none(current_nodes, saturation, target, "within range")
    }
}
