//! AWS (Amazon Web Services) provider.
//!
//! ## Services
//!
//! - **EC2** - instance description (node name and ownership tag)
//! - **EKS** - cluster description (API endpoint and CA bundle)
//! - **Auto Scaling** - lifecycle hook completion
//! - **STS** - presigned `GetCallerIdentity` URLs used as cluster tokens
//!
//! Every request is signed with AWS Signature Version 4, see [`sigv4`].

mod client;
mod credentials;
mod models;
pub mod sigv4;

pub use client::{Aws, AwsEndpoints};
pub use credentials::AwsCredentials;
pub use models::*;
