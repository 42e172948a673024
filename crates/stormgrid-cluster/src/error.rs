//! Cluster error types.

/// Result alias used throughout the cluster crate.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors from the node registry, scheduler, and autoscaler.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// The request is malformed (bad capacity, bad metrics).
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// No node is registered under the given id.
    #[error("Node not found: {node_id}")]
    NodeNotFound {
        /// The unknown node id.
        node_id: String,
    },

    /// No healthy nodes exist at all.
    #[error("No available nodes")]
    NoAvailableNodes,

    /// Healthy nodes exist but none has free container capacity.
    #[error("No capable nodes")]
    NoCapableNodes,

    /// The autoscaler is disabled by configuration.
    #[error("Autoscaler disabled")]
    AutoscalerDisabled,
}

impl ClusterError {
    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `NodeNotFound` error.
    #[must_use]
    pub fn node_not_found(node_id: impl Into<String>) -> Self {
        Self::NodeNotFound {
            node_id: node_id.into(),
        }
    }

    /// Returns the stable error tag used in wire bodies and logs.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "INVALID_REQUEST",
            Self::NodeNotFound { .. } => "NODE_NOT_FOUND",
            Self::NoAvailableNodes => "NO_AVAILABLE_NODES",
            Self::NoCapableNodes => "NO_CAPABLE_NODES",
            Self::AutoscalerDisabled => "AUTOSCALER_DISABLED",
        }
    }

    /// Returns the HTTP status code the port layer should answer with.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest { .. } => 400,
            Self::NodeNotFound { .. } => 404,
            Self::NoAvailableNodes | Self::NoCapableNodes => 503,
            Self::AutoscalerDisabled => 409,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_tags() {
        let err = ClusterError::node_not_found("n1");
        assert_eq!(err.to_string(), "Node not found: n1");
        assert_eq!(err.tag(), "NODE_NOT_FOUND");
        assert_eq!(err.http_status(), 404);

        assert_eq!(ClusterError::NoAvailableNodes.tag(), "NO_AVAILABLE_NODES");
        assert_eq!(ClusterError::NoCapableNodes.http_status(), 503);
        assert_eq!(ClusterError::AutoscalerDisabled.http_status(), 409);
    }
}
