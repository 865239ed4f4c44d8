//! Cloud provider seams used by the drain pipeline and their common types.

use async_trait::async_trait;
use thiserror::Error;

use super::aws::{CompleteLifecycleActionRequest, Ec2Instance, EksCluster};

/// Message fragment Auto Scaling returns, under a `ValidationError` code, when
/// a lifecycle action has already been resolved or has expired.
const NO_ACTIVE_ACTION_MESSAGE: &str = "No active Lifecycle Action found";

/// Errors that can occur while talking to AWS APIs.
#[derive(Error, Debug)]
pub enum AwsError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} {code} - {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Authentication or authorization was rejected.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// JSON response could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// XML response could not be decoded.
    #[error("XML decode error: {0}")]
    Xml(#[from] quick_xml::DeError),

    /// Endpoint URL could not be built.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl AwsError {
    /// Whether Auto Scaling rejected a completion because the lifecycle
    /// action is no longer pending.
    #[must_use]
    pub fn is_no_active_lifecycle_action(&self) -> bool {
        match self {
            Self::Api { code, message, .. } => {
                code == "ValidationError" && message.contains(NO_ACTIVE_ACTION_MESSAGE)
            }
            _ => false,
        }
    }
}

/// Looks up EC2 instance metadata.
#[async_trait]
pub trait InstanceDescriber: Send + Sync {
    /// Describe a single instance by ID.
    ///
    /// Returns `Ok(None)` when the call succeeds but no instance is returned.
    async fn describe_instance(&self, instance_id: &str) -> Result<Option<Ec2Instance>, AwsError>;
}

/// Looks up EKS control-plane metadata.
#[async_trait]
pub trait ClusterDescriber: Send + Sync {
    /// Describe an EKS cluster by name.
    async fn describe_cluster(&self, name: &str) -> Result<EksCluster, AwsError>;
}

/// Resolves Auto Scaling lifecycle hooks.
#[async_trait]
pub trait LifecycleActions: Send + Sync {
    /// Complete a pending lifecycle action.
    async fn complete_lifecycle_action(
        &self,
        req: &CompleteLifecycleActionRequest,
    ) -> Result<(), AwsError>;
}
