//! End-to-end handling of one lifecycle event.
//!
//! ```text
//! resolve -> (cache | materialize) -> mint token -> connect -> drain -> complete
//! ```
//!
//! Once the cluster identity is known the hook is always completed, whether or
//! not the steps in between succeed. Only a failure to resolve the identity
//! leaves the hook untouched.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::cache::CredentialCache;
use crate::cluster::{ClusterApi, ClusterConnector, ClusterError};
use crate::config::DrainerConfig;
use crate::drain::{DrainOrchestrator, DrainReport, DrainSettings};
use crate::event::LifecycleEvent;
use crate::kubeconfig::{ConnectionDescriptor, ConnectionMaterializer, MaterializeError};
use crate::lifecycle::{CompletionOutcome, LifecycleCompleter};
use crate::providers::Aws;
use crate::resolver::{ClusterIdentity, ClusterResolver, ResolveError};
use crate::token::{TokenError, TokenMinter};

/// Failures that stop processing before the hook is touched.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The instance could not be mapped to a node.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Failures reaching the cluster after the identity is known.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("failed to build cluster client: {0}")]
    Client(#[from] ClusterError),
}

/// What processing an event did.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// The drain ran (possibly partially) and completion was attempted.
    Drained {
        identity: ClusterIdentity,
        report: DrainReport,
        completion: CompletionOutcome,
    },
    /// The cluster could not be reached; completion was still attempted.
    Unreachable {
        identity: ClusterIdentity,
        error: ConnectError,
        completion: CompletionOutcome,
    },
    /// The instance carries no ownership tag. `completion` is `None` unless
    /// completing untagged instances is enabled.
    Abandoned {
        instance_id: String,
        completion: Option<CompletionOutcome>,
    },
}

impl PipelineOutcome {
    /// Completion result, if completion was attempted.
    #[must_use]
    pub fn completion(&self) -> Option<&CompletionOutcome> {
        match self {
            Self::Drained { completion, .. } | Self::Unreachable { completion, .. } => {
                Some(completion)
            }
            Self::Abandoned { completion, .. } => completion.as_ref(),
        }
    }
}

/// Wires the components together.
pub struct Pipeline {
    resolver: ClusterResolver,
    cache: Arc<dyn CredentialCache>,
    materializer: ConnectionMaterializer,
    minter: TokenMinter,
    connector: Arc<dyn ClusterConnector>,
    drainer: DrainOrchestrator,
    completer: LifecycleCompleter,
    complete_on_missing_tag: bool,
}

impl Pipeline {
    /// Assemble a pipeline from its parts.
    pub fn new(
        resolver: ClusterResolver,
        cache: Arc<dyn CredentialCache>,
        materializer: ConnectionMaterializer,
        minter: TokenMinter,
        connector: Arc<dyn ClusterConnector>,
        drainer: DrainOrchestrator,
        completer: LifecycleCompleter,
    ) -> Self {
        Self {
            resolver,
            cache,
            materializer,
            minter,
            connector,
            drainer,
            completer,
            complete_on_missing_tag: false,
        }
    }

    /// Resolve the hook for instances without an ownership tag.
    #[must_use]
    pub fn with_complete_on_missing_tag(mut self, enabled: bool) -> Self {
        self.complete_on_missing_tag = enabled;
        self
    }

    /// Build the production pipeline from configuration and an AWS client.
    pub fn from_config(
        config: &DrainerConfig,
        aws: Aws,
        cache: Arc<dyn CredentialCache>,
        connector: Arc<dyn ClusterConnector>,
    ) -> Self {
        let minter = TokenMinter::new(aws.credentials().clone(), aws.region());
        let aws = Arc::new(aws);

        Self::new(
            ClusterResolver::new(aws.clone(), config.ownership_tag.clone()),
            cache,
            ConnectionMaterializer::new(aws.clone()),
            minter,
            connector,
            DrainOrchestrator::new(DrainSettings {
                settle_delay: config.settle_delay,
                grace_period: config.grace_period,
            }),
            LifecycleCompleter::new(aws, config.completion_delay),
        )
        .with_complete_on_missing_tag(config.complete_on_missing_tag)
    }

    /// Process one lifecycle event.
    pub async fn process(&self, event: &LifecycleEvent) -> Result<PipelineOutcome, PipelineError> {
        info!(instance_id = %event.instance_id, "Processing lifecycle event");

        let identity = match self.resolver.resolve(&event.instance_id).await {
            Ok(identity) => identity,
            Err(e) if !e.is_fatal() => return Ok(self.abandon(event, &e).await),
            Err(e) => {
                error!(instance_id = %event.instance_id, error = %e, "Failed to resolve instance");
                return Err(e.into());
            }
        };

        let cluster = match self.connect(&identity).await {
            Ok(cluster) => cluster,
            Err(e) => {
                error!(
                    cluster_name = %identity.cluster_name,
                    error = %e,
                    "Cannot reach cluster, completing lifecycle action without draining"
                );
                let completion = self.completer.complete(event, false).await;
                return Ok(PipelineOutcome::Unreachable {
                    identity,
                    error: e,
                    completion,
                });
            }
        };

        let report = self.drainer.drain(cluster.as_ref(), &identity.node_name).await;
        let completion = self
            .completer
            .complete(event, report.skip_completion_delay)
            .await;

        Ok(PipelineOutcome::Drained {
            identity,
            report,
            completion,
        })
    }

    async fn abandon(&self, event: &LifecycleEvent, reason: &ResolveError) -> PipelineOutcome {
        if !self.complete_on_missing_tag {
            warn!(
                instance_id = %event.instance_id,
                reason = %reason,
                "Instance is not part of a cluster, leaving lifecycle hook to time out"
            );
            return PipelineOutcome::Abandoned {
                instance_id: event.instance_id.clone(),
                completion: None,
            };
        }

        info!(
            instance_id = %event.instance_id,
            reason = %reason,
            "Instance is not part of a cluster, completing lifecycle action"
        );
        PipelineOutcome::Abandoned {
            instance_id: event.instance_id.clone(),
            completion: Some(self.completer.complete(event, true).await),
        }
    }

    async fn connect(&self, identity: &ClusterIdentity) -> Result<Box<dyn ClusterApi>, ConnectError> {
        let descriptor = self.descriptor(&identity.cluster_name).await?;
        let token = self.minter.mint(&identity.cluster_name)?;
        Ok(self
            .connector
            .connect(&identity.cluster_name, &descriptor, &token)
            .await?)
    }

    async fn descriptor(&self, cluster_name: &str) -> Result<ConnectionDescriptor, MaterializeError> {
        match self.cache.get(cluster_name).await {
            Ok(Some(descriptor)) => return Ok(descriptor),
            Ok(None) => {}
            Err(e) => warn!(cluster_name, error = %e, "Credential cache unavailable"),
        }

        let descriptor = self.materializer.materialize(cluster_name).await?;
        if let Err(e) = self.cache.put(cluster_name, &descriptor).await {
            warn!(cluster_name, error = %e, "Failed to cache kubeconfig");
        }
        Ok(descriptor)
    }
}
