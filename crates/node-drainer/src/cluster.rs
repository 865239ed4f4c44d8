//! Cluster Client.
//!
//! A thin wrapper over the four Kubernetes calls a drain needs. The
//! [`ClusterApi`] trait is the seam the orchestrator drives; the production
//! implementation talks to the API server through `kube`.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::api::policy::v1::Eviction;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{DeleteOptions, ObjectMeta};
use kube::api::{Api, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, ResourceExt};
use thiserror::Error;
use tracing::debug;

use crate::kubeconfig::{ConnectionDescriptor, KubeconfigFile};
use crate::token::BearerToken;

/// Errors talking to the cluster.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Kubernetes API call failed.
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// The kubeconfig could not be loaded.
    #[error("kubeconfig error: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    /// The kubeconfig could not be rendered.
    #[error("kubeconfig serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),

    /// A request body could not be encoded.
    #[error("request encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Eviction target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PodRef {
    /// Pod name.
    pub name: String,
    /// Pod namespace.
    pub namespace: String,
}

impl PodRef {
    /// Create a pod reference.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl std::fmt::Display for PodRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Kubernetes operations used by the drain.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Whether a node with exactly this name is registered.
    async fn node_exists(&self, node_name: &str) -> Result<bool, ClusterError>;

    /// Mark the node unschedulable. Re-cordoning is harmless.
    async fn cordon(&self, node_name: &str) -> Result<(), ClusterError>;

    /// Pods scheduled on the node, across all namespaces.
    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<PodRef>, ClusterError>;

    /// Request eviction of a pod, optionally overriding its grace period.
    async fn evict(&self, pod: &PodRef, grace_period: Option<u32>) -> Result<(), ClusterError>;
}

/// Builds a [`ClusterApi`] for one cluster and one token.
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    /// Connect using the descriptor and a freshly minted token.
    async fn connect(
        &self,
        cluster_name: &str,
        descriptor: &ConnectionDescriptor,
        token: &BearerToken,
    ) -> Result<Box<dyn ClusterApi>, ClusterError>;
}

/// [`ClusterApi`] backed by a `kube` client.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Wrap an existing client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the materialized kubeconfig and a bearer token.
    pub async fn from_descriptor(
        cluster_name: &str,
        descriptor: &ConnectionDescriptor,
        token: &BearerToken,
    ) -> Result<Self, ClusterError> {
        let yaml = KubeconfigFile::from_descriptor(cluster_name, descriptor).to_yaml()?;
        let kubeconfig = Kubeconfig::from_yaml(&yaml)?;
        let mut config =
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
        config.auth_info.token = Some(token.expose().to_owned().into());

        Ok(Self::new(Client::try_from(config)?))
    }
}

#[async_trait]
impl ClusterApi for KubeClusterClient {
    async fn node_exists(&self, node_name: &str) -> Result<bool, ClusterError> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let list = nodes.list(&ListParams::default()).await?;
        Ok(list.items.iter().any(|n| n.name_any() == node_name))
    }

    async fn cordon(&self, node_name: &str) -> Result<(), ClusterError> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        nodes.cordon(node_name).await?;
        Ok(())
    }

    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<PodRef>, ClusterError> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let params = ListParams::default().fields(&format!("spec.nodeName={node_name}"));
        let list = pods.list(&params).await?;

        debug!(node_name, count = list.items.len(), "Listed pods on node");

        Ok(list
            .items
            .iter()
            .map(|p| PodRef::new(p.namespace().unwrap_or_default(), p.name_any()))
            .collect())
    }

    async fn evict(&self, pod: &PodRef, grace_period: Option<u32>) -> Result<(), ClusterError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &pod.namespace);
        let body = serde_json::to_vec(&eviction_for(pod, grace_period))?;
        pods.create_subresource::<serde_json::Value>(
            "eviction",
            &pod.name,
            &PostParams::default(),
            body,
        )
        .await?;
        Ok(())
    }
}

/// policy/v1 Eviction for `pod`, carrying the grace period override if any.
fn eviction_for(pod: &PodRef, grace_period: Option<u32>) -> Eviction {
    Eviction {
        metadata: ObjectMeta {
            name: Some(pod.name.clone()),
            namespace: Some(pod.namespace.clone()),
            ..ObjectMeta::default()
        },
        delete_options: grace_period.map(|secs| DeleteOptions {
            grace_period_seconds: Some(i64::from(secs)),
            ..DeleteOptions::default()
        }),
    }
}

/// Connects through [`KubeClusterClient`].
#[derive(Debug, Clone, Copy, Default)]
pub struct KubeConnector;

#[async_trait]
impl ClusterConnector for KubeConnector {
    async fn connect(
        &self,
        cluster_name: &str,
        descriptor: &ConnectionDescriptor,
        token: &BearerToken,
    ) -> Result<Box<dyn ClusterApi>, ClusterError> {
        let client = KubeClusterClient::from_descriptor(cluster_name, descriptor, token).await?;
        Ok(Box::new(client))
    }
}
