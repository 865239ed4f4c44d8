//! Maps an EC2 instance to its Kubernetes node and owning cluster.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::providers::{AwsError, InstanceDescriber};

/// Node and cluster backing one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterIdentity {
    /// EKS cluster name, from the ownership tag.
    pub cluster_name: String,
    /// Kubernetes node name, the instance's private DNS name.
    pub node_name: String,
}

/// Errors resolving a cluster identity.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// `DescribeInstances` failed.
    #[error("failed to describe instance {instance_id}: {source}")]
    Describe {
        instance_id: String,
        #[source]
        source: AwsError,
    },

    /// The describe call returned no instance.
    #[error("instance {0} not found")]
    InstanceNotFound(String),

    /// The instance has no private DNS name to use as node name.
    #[error("instance {0} has no private DNS name")]
    MissingPrivateDnsName(String),

    /// The instance is not tagged with its owning cluster.
    #[error("instance {instance_id} has no {tag} tag")]
    MissingOwnershipTag { instance_id: String, tag: String },
}

impl ResolveError {
    /// Whether processing must stop without touching the lifecycle hook.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::MissingOwnershipTag { .. })
    }
}

/// Cluster Resolver.
#[derive(Clone)]
pub struct ClusterResolver {
    ec2: Arc<dyn InstanceDescriber>,
    ownership_tag: String,
}

impl ClusterResolver {
    /// Create a resolver reading the given ownership tag.
    pub fn new(ec2: Arc<dyn InstanceDescriber>, ownership_tag: impl Into<String>) -> Self {
        Self {
            ec2,
            ownership_tag: ownership_tag.into(),
        }
    }

    /// Resolve the node and cluster for an instance.
    pub async fn resolve(&self, instance_id: &str) -> Result<ClusterIdentity, ResolveError> {
        let instance = self
            .ec2
            .describe_instance(instance_id)
            .await
            .map_err(|source| ResolveError::Describe {
                instance_id: instance_id.to_string(),
                source,
            })?
            .ok_or_else(|| ResolveError::InstanceNotFound(instance_id.to_string()))?;

        let node_name = instance
            .private_dns_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ResolveError::MissingPrivateDnsName(instance_id.to_string()))?
            .to_string();

        debug!(instance_id, node_name = %node_name, "Described instance");

        let cluster_name = instance
            .tag(&self.ownership_tag)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ResolveError::MissingOwnershipTag {
                instance_id: instance_id.to_string(),
                tag: self.ownership_tag.clone(),
            })?
            .to_string();

        info!(
            instance_id,
            node_name = %node_name,
            cluster_name = %cluster_name,
            "Resolved cluster identity"
        );

        Ok(ClusterIdentity {
            cluster_name,
            node_name,
        })
    }
}
