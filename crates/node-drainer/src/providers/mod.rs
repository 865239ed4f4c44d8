//! Cloud provider abstractions.
//!
//! The drain pipeline only depends on the traits defined here; [`aws::Aws`]
//! is the production implementation.

pub mod aws;
mod traits;

pub use traits::{AwsError, ClusterDescriber, InstanceDescriber, LifecycleActions};

pub use aws::Aws;
