//! TTL-backed node registry.
//!
//! Nodes register, heartbeat, and eventually either drain away or lapse.
//! A periodic sweep removes entries whose heartbeat is older than the TTL;
//! until the sweep catches them, expired entries read as `UNHEALTHY`.
//!
//! The sweep and every mutation share one write lock over the map; reads
//! take the read lock, so a heartbeat is visible to the next `list()`.

use std::collections::HashMap;
use std::sync::Arc;

use stormgrid_core::Clock;
use time::Duration;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;

use crate::config::RegistryConfig;
use crate::error::{ClusterError, ClusterResult};
use crate::types::{Node, NodeCapacity, NodeMetrics, NodeStatus};

/// Registration request a node sends on startup.
///
/// On re-registration, `endpoint_url` and `capacity` only overwrite the
/// stored values when supplied.
#[derive(Debug, Clone)]
pub struct NodeRegistration {
    /// Opaque id chosen by the node.
    pub node_id: String,
    /// Endpoint the control plane reaches the node at.
    pub endpoint_url: Option<String>,
    /// Declared capacity.
    pub capacity: Option<NodeCapacity>,
}

/// TTL registry of execution nodes.
pub struct NodeRegistry {
    nodes: RwLock<HashMap<String, Node>>,
    config: RegistryConfig,
    clock: Arc<dyn Clock>,
}

impl NodeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(config: RegistryConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            config,
            clock,
        }
    }

    /// The node TTL this registry evicts on.
    #[must_use]
    pub fn node_ttl(&self) -> Duration {
        Duration::try_from(self.config.node_ttl).unwrap_or_else(|_| Duration::seconds(30))
    }

    /// Registers a node, creating or replacing its entry.
    ///
    /// The entry comes back `HEALTHY` with a fresh heartbeat; a node that
    /// was `DRAINING` stays draining across re-registration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` when a new node omits endpoint or capacity,
    /// or when the capacity is invalid.
    pub async fn register(&self, registration: NodeRegistration) -> ClusterResult<Node> {
        if registration.node_id.is_empty() {
            return Err(ClusterError::invalid_request("node_id must not be empty"));
        }
        if let Some(capacity) = &registration.capacity {
            capacity.validate()?;
        }

        let now = self.clock.now();
        let mut nodes = self.nodes.write().await;

        let node = match nodes.get(&registration.node_id) {
            Some(existing) => {
                let mut node = existing.clone();
                if let Some(endpoint) = registration.endpoint_url {
                    node.endpoint_url = endpoint;
                }
                if let Some(capacity) = registration.capacity {
                    node.capacity = capacity;
                }
                node.status = match existing.status {
                    NodeStatus::Draining => NodeStatus::Draining,
                    _ => NodeStatus::Healthy,
                };
                node.last_heartbeat_at = now;
                node
            }
            None => {
                let Some(endpoint_url) = registration.endpoint_url else {
                    return Err(ClusterError::invalid_request(
                        "endpoint_url is required for a new node",
                    ));
                };
                let Some(capacity) = registration.capacity else {
                    return Err(ClusterError::invalid_request(
                        "capacity is required for a new node",
                    ));
                };
                Node {
                    id: registration.node_id.clone(),
                    endpoint_url,
                    capacity,
                    metrics: NodeMetrics::default(),
                    status: NodeStatus::Healthy,
                    last_heartbeat_at: now,
                    registered_at: now,
                }
            }
        };

        nodes.insert(node.id.clone(), node.clone());
        tracing::info!(node_id = %node.id, endpoint = %node.endpoint_url, "Registered node");
        Ok(node)
    }

    /// Records a heartbeat, refreshing liveness and overwriting metrics.
    ///
    /// An entry that expired but has not been swept yet is revived as
    /// `HEALTHY` (draining nodes stay draining).
    ///
    /// # Errors
    ///
    /// - `NodeNotFound`: the node never registered or was already swept
    /// - `InvalidRequest`: metrics out of range
    pub async fn heartbeat(&self, node_id: &str, metrics: NodeMetrics) -> ClusterResult<Node> {
        metrics.validate()?;
        let now = self.clock.now();
        let mut nodes = self.nodes.write().await;
        let Some(node) = nodes.get_mut(node_id) else {
            return Err(ClusterError::node_not_found(node_id));
        };

        node.metrics = metrics;
        node.last_heartbeat_at = now;
        if node.status == NodeStatus::Unhealthy {
            node.status = NodeStatus::Healthy;
        }
        Ok(node.clone())
    }

    /// Puts a node into `DRAINING`; it keeps its matches but receives no
    /// new ones, and stays registered until its TTL lapses or it
    /// deregisters.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` for an unknown node.
    pub async fn drain(&self, node_id: &str) -> ClusterResult<Node> {
        let mut nodes = self.nodes.write().await;
        let Some(node) = nodes.get_mut(node_id) else {
            return Err(ClusterError::node_not_found(node_id));
        };
        node.status = NodeStatus::Draining;
        tracing::info!(node_id = %node_id, "Node draining");
        Ok(node.clone())
    }

    /// Removes a node immediately. Returns `true` if one was removed.
    pub async fn deregister(&self, node_id: &str) -> bool {
        let removed = self.nodes.write().await.remove(node_id).is_some();
        if removed {
            tracing::info!(node_id = %node_id, "Deregistered node");
        }
        removed
    }

    /// Looks up one node. Expired entries read as `UNHEALTHY`.
    pub async fn find(&self, node_id: &str) -> Option<Node> {
        let now = self.clock.now();
        let ttl = self.node_ttl();
        self.nodes.read().await.get(node_id).map(|node| {
            let mut node = node.clone();
            node.status = node.effective_status(now, ttl);
            node
        })
    }

    /// Snapshots all nodes. Expired entries read as `UNHEALTHY` until the
    /// sweep removes them.
    pub async fn list(&self) -> Vec<Node> {
        let now = self.clock.now();
        let ttl = self.node_ttl();
        self.nodes
            .read()
            .await
            .values()
            .map(|node| {
                let mut node = node.clone();
                node.status = node.effective_status(now, ttl);
                node
            })
            .collect()
    }

    /// Removes every node whose heartbeat is older than the TTL. Returns
    /// the removed ids.
    pub async fn sweep(&self) -> Vec<String> {
        let now = self.clock.now();
        let ttl = self.node_ttl();
        let mut nodes = self.nodes.write().await;
        let expired: Vec<String> = nodes
            .values()
            .filter(|node| node.is_expired(now, ttl))
            .map(|node| node.id.clone())
            .collect();
        for id in &expired {
            nodes.remove(id);
            tracing::warn!(node_id = %id, "Evicted node after missed heartbeats");
        }
        expired
    }

    /// Spawns the periodic liveness sweep; it exits when `shutdown` flips.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let interval = registry.config.sweep_interval;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = tokio::time::sleep(interval) => {
                        registry.sweep().await;
                    }
                    _ = shutdown.changed() => break,
                }
            }
        })
    }
}
