//! Drain Orchestrator.
//!
//! ```text
//! Start -> CheckExistence -> SkipDrain                               -> Complete
//!                         -> Cordon -> Settle -> Enumerate -> Evict   -> Complete
//! ```
//!
//! Draining is best-effort. Failures never escape [`DrainOrchestrator::drain`];
//! they are classified by stage, logged according to [`DrainStage::policy`] and
//! collected in the [`DrainOutcome`]. The only decision handed to the caller is
//! whether the completion delay should be skipped.

use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::cluster::{ClusterApi, ClusterError, PodRef};
use crate::config::DEFAULT_SETTLE_DELAY_SECS;

/// Steps of a drain that talk to the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStage {
    /// Looking the node up.
    CheckExistence,
    /// Marking the node unschedulable.
    Cordon,
    /// Listing pods on the node.
    Enumerate,
    /// Evicting a single pod.
    Evict,
}

/// What a stage failure does to the rest of the drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagePolicy {
    /// Log at error level and stop draining; completion still happens.
    Abort,
    /// Log at warn level and carry on with the next item.
    Continue,
}

impl DrainStage {
    /// Failure policy for this stage.
    #[must_use]
    pub fn policy(self) -> StagePolicy {
        match self {
            Self::CheckExistence | Self::Cordon | Self::Enumerate => StagePolicy::Abort,
            Self::Evict => StagePolicy::Continue,
        }
    }
}

impl std::fmt::Display for DrainStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CheckExistence => write!(f, "check-existence"),
            Self::Cordon => write!(f, "cordon"),
            Self::Enumerate => write!(f, "enumerate"),
            Self::Evict => write!(f, "evict"),
        }
    }
}

/// A failed drain step.
#[derive(Debug, Error)]
#[error("{stage} failed{}: {source}", pod_suffix(.pod))]
pub struct DrainStageError {
    /// Stage that failed.
    pub stage: DrainStage,
    /// Pod involved, for evictions.
    pub pod: Option<PodRef>,
    /// Underlying cluster error.
    #[source]
    pub source: ClusterError,
}

fn pod_suffix(pod: &Option<PodRef>) -> String {
    pod.as_ref()
        .map(|p| format!(" for pod {p}"))
        .unwrap_or_default()
}

/// What a drain did. Informational only.
#[derive(Debug, Default)]
pub struct DrainOutcome {
    /// Whether the node was found.
    pub node_found: bool,
    /// Whether the cordon succeeded.
    pub cordoned: bool,
    /// Evictions issued.
    pub attempted: usize,
    /// Evictions accepted.
    pub succeeded: usize,
    /// Every failure seen.
    pub errors: Vec<DrainStageError>,
}

/// Result handed to the completer.
#[derive(Debug)]
pub struct DrainReport {
    /// What happened.
    pub outcome: DrainOutcome,
    /// The node was already gone; complete without waiting.
    pub skip_completion_delay: bool,
}

/// Drain tuning.
#[derive(Debug, Clone)]
pub struct DrainSettings {
    /// Pause after cordoning so the scheduler observes it before pods are listed.
    pub settle_delay: Duration,
    /// Grace period override passed with every eviction.
    pub grace_period: Option<u32>,
}

impl Default for DrainSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(DEFAULT_SETTLE_DELAY_SECS),
            grace_period: None,
        }
    }
}

/// Sequences cordon and eviction for a single node.
#[derive(Debug, Clone, Default)]
pub struct DrainOrchestrator {
    settings: DrainSettings,
}

impl DrainOrchestrator {
    /// Create an orchestrator.
    #[must_use]
    pub fn new(settings: DrainSettings) -> Self {
        Self { settings }
    }

    /// Drain `node_name`. Never fails.
    pub async fn drain(&self, cluster: &dyn ClusterApi, node_name: &str) -> DrainReport {
        let mut outcome = DrainOutcome::default();

        match cluster.node_exists(node_name).await {
            Ok(true) => outcome.node_found = true,
            Ok(false) => {
                info!(node_name, "Node is not part of the cluster, skipping drain");
                return DrainReport {
                    outcome,
                    skip_completion_delay: true,
                };
            }
            Err(source) => {
                Self::record(&mut outcome, node_name, DrainStage::CheckExistence, None, source);
                return Self::report(outcome);
            }
        }

        if let Err(source) = cluster.cordon(node_name).await {
            Self::record(&mut outcome, node_name, DrainStage::Cordon, None, source);
            return Self::report(outcome);
        }
        outcome.cordoned = true;
        info!(node_name, "Cordoned node");

        tokio::time::sleep(self.settings.settle_delay).await;

        let pods = match cluster.list_pods_on_node(node_name).await {
            Ok(pods) => pods,
            Err(source) => {
                Self::record(&mut outcome, node_name, DrainStage::Enumerate, None, source);
                return Self::report(outcome);
            }
        };

        info!(node_name, pod_count = pods.len(), "Evicting pods");

        for pod in pods {
            outcome.attempted += 1;
            info!(pod = %pod.name, namespace = %pod.namespace, "Evicting pod");
            match cluster.evict(&pod, self.settings.grace_period).await {
                Ok(()) => outcome.succeeded += 1,
                Err(source) => {
                    Self::record(&mut outcome, node_name, DrainStage::Evict, Some(pod), source);
                }
            }
        }

        info!(
            node_name,
            attempted = outcome.attempted,
            succeeded = outcome.succeeded,
            failed = outcome.errors.len(),
            "Drain finished"
        );

        Self::report(outcome)
    }

    fn report(outcome: DrainOutcome) -> DrainReport {
        DrainReport {
            outcome,
            skip_completion_delay: false,
        }
    }

    fn record(
        outcome: &mut DrainOutcome,
        node_name: &str,
        stage: DrainStage,
        pod: Option<PodRef>,
        source: ClusterError,
    ) {
        let err = DrainStageError { stage, pod, source };
        match stage.policy() {
            StagePolicy::Abort => {
                error!(node_name, stage = %stage, error = %err, "Drain aborted, proceeding to completion");
            }
            StagePolicy::Continue => {
                warn!(node_name, stage = %stage, error = %err, "Drain step failed, continuing");
            }
        }
        outcome.errors.push(err);
    }
}
