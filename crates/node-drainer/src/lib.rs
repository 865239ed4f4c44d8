//! Drains EKS worker nodes when their Auto Scaling group terminates them.
//!
//! A terminate lifecycle event flows through:
//!
//! - [`resolver`] - instance to node name and owning cluster
//! - [`cache`] / [`kubeconfig`] - cluster connection details, reused across events
//! - [`token`] - short-lived IAM bearer token for the cluster
//! - [`cluster`] / [`drain`] - cordon the node and evict its pods
//! - [`lifecycle`] - release the hook with `ABANDON`
//!
//! [`pipeline::Pipeline`] wires these together.

pub mod cache;
pub mod cluster;
pub mod config;
pub mod drain;
pub mod event;
pub mod kubeconfig;
pub mod lifecycle;
pub mod pipeline;
pub mod providers;
pub mod resolver;
pub mod token;

pub use config::DrainerConfig;
pub use event::{LifecycleEnvelope, LifecycleEvent};
pub use pipeline::{Pipeline, PipelineError, PipelineOutcome};
