//! Connection Materializer.
//!
//! Builds the connection descriptor for an EKS cluster from its control-plane
//! description and renders it as a kubeconfig document. The document has one
//! cluster (named after the EKS cluster), one `aws` context bound to an `aws`
//! user, and that context selected. The user entry carries no credentials; a
//! fresh bearer token is attached in memory for every event.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::providers::{AwsError, ClusterDescriber};

/// Context and user name written into every kubeconfig.
pub const CONTEXT_NAME: &str = "aws";

const API_VERSION: &str = "v1";
const KIND: &str = "Config";

/// How to reach a cluster's API server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    /// API server URL.
    pub api_endpoint: String,
    /// Base64-encoded PEM CA bundle.
    pub ca_certificate: String,
}

/// Errors materializing a connection descriptor.
#[derive(Debug, Error)]
pub enum MaterializeError {
    /// `DescribeCluster` failed.
    #[error("failed to describe cluster {cluster_name}: {source}")]
    Describe {
        cluster_name: String,
        #[source]
        source: AwsError,
    },

    /// The cluster has no API endpoint yet.
    #[error("cluster {0} has no API endpoint")]
    MissingEndpoint(String),

    /// The cluster has no CA data.
    #[error("cluster {0} has no certificate authority data")]
    MissingCertificate(String),
}

/// Builds connection descriptors from the EKS control plane.
#[derive(Clone)]
pub struct ConnectionMaterializer {
    eks: Arc<dyn ClusterDescriber>,
}

impl ConnectionMaterializer {
    /// Create a materializer backed by an EKS describer.
    pub fn new(eks: Arc<dyn ClusterDescriber>) -> Self {
        Self { eks }
    }

    /// Describe the cluster and extract its endpoint and CA bundle.
    pub async fn materialize(
        &self,
        cluster_name: &str,
    ) -> Result<ConnectionDescriptor, MaterializeError> {
        info!(cluster_name, "Building the kubeconfig");

        let cluster = self
            .eks
            .describe_cluster(cluster_name)
            .await
            .map_err(|source| MaterializeError::Describe {
                cluster_name: cluster_name.to_string(),
                source,
            })?;

        let api_endpoint = cluster
            .endpoint
            .filter(|e| !e.is_empty())
            .ok_or_else(|| MaterializeError::MissingEndpoint(cluster_name.to_string()))?;
        let ca_certificate = cluster
            .certificate_authority
            .and_then(|ca| ca.data)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| MaterializeError::MissingCertificate(cluster_name.to_string()))?;

        Ok(ConnectionDescriptor {
            api_endpoint,
            ca_certificate,
        })
    }
}

/// On-disk kubeconfig document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KubeconfigFile {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub clusters: Vec<NamedCluster>,
    pub contexts: Vec<NamedContext>,
    pub current_context: String,
    pub users: Vec<NamedUser>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: ClusterEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterEntry {
    pub server: String,
    pub certificate_authority_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: ContextEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub cluster: String,
    pub user: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedUser {
    pub name: String,
    #[serde(default)]
    pub user: UserEntry,
}

/// Credential-less user; the token is supplied at connect time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {}

impl KubeconfigFile {
    /// Assemble the kubeconfig for one cluster.
    #[must_use]
    pub fn from_descriptor(cluster_name: &str, descriptor: &ConnectionDescriptor) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            clusters: vec![NamedCluster {
                name: cluster_name.to_string(),
                cluster: ClusterEntry {
                    server: descriptor.api_endpoint.clone(),
                    certificate_authority_data: descriptor.ca_certificate.clone(),
                },
            }],
            contexts: vec![NamedContext {
                name: CONTEXT_NAME.to_string(),
                context: ContextEntry {
                    cluster: cluster_name.to_string(),
                    user: CONTEXT_NAME.to_string(),
                },
            }],
            current_context: CONTEXT_NAME.to_string(),
            users: vec![NamedUser {
                name: CONTEXT_NAME.to_string(),
                user: UserEntry::default(),
            }],
        }
    }

    /// Cluster name and descriptor selected by the current context.
    #[must_use]
    pub fn current(&self) -> Option<(&str, ConnectionDescriptor)> {
        let context = self
            .contexts
            .iter()
            .find(|c| c.name == self.current_context)?;
        let cluster = self
            .clusters
            .iter()
            .find(|c| c.name == context.context.cluster)?;
        Some((
            cluster.name.as_str(),
            ConnectionDescriptor {
                api_endpoint: cluster.cluster.server.clone(),
                ca_certificate: cluster.cluster.certificate_authority_data.clone(),
            },
        ))
    }

    /// Render as YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Parse from YAML.
    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }
}
