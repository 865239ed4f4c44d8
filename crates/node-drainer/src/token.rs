//! Token Minter.
//!
//! EKS accepts a presigned STS `GetCallerIdentity` URL as a bearer token. The
//! cluster name travels in the signed `x-k8s-aws-id` header so a token minted
//! for one cluster is rejected by every other.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use thiserror::Error;
use url::Url;

use crate::providers::aws::sigv4::{self, SigningParams};
use crate::providers::aws::AwsCredentials;

/// Prefix identifying EKS IAM tokens.
pub const TOKEN_PREFIX: &str = "k8s-aws-v1.";

/// Header binding the token to one cluster.
pub const CLUSTER_ID_HEADER: &str = "x-k8s-aws-id";

/// Presigned URL lifetime.
pub const TOKEN_EXPIRES_IN_SECS: u64 = 60;

/// Token minting errors.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The STS URL could not be built.
    #[error("invalid STS endpoint: {0}")]
    Url(#[from] url::ParseError),
}

/// Short-lived cluster bearer token. Never cached or persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken {
    encoded_value: String,
}

impl BearerToken {
    /// Token text to send as `Authorization: Bearer <token>`.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.encoded_value
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

/// Mints EKS bearer tokens from ambient AWS credentials.
#[derive(Debug, Clone)]
pub struct TokenMinter {
    credentials: AwsCredentials,
    region: String,
}

impl TokenMinter {
    /// Create a minter for the given region.
    pub fn new(credentials: AwsCredentials, region: impl Into<String>) -> Self {
        Self {
            credentials,
            region: region.into(),
        }
    }

    /// Regional STS `GetCallerIdentity` URL.
    pub fn sts_url(&self) -> Result<Url, TokenError> {
        Ok(Url::parse(&format!(
            "https://sts.{}.amazonaws.com/?Action=GetCallerIdentity&Version=2011-06-15",
            self.region
        ))?)
    }

    /// Mint a fresh token for `cluster_name`.
    pub fn mint(&self, cluster_name: &str) -> Result<BearerToken, TokenError> {
        self.mint_at(cluster_name, Utc::now())
    }

    /// Mint a token signed at `now`.
    pub fn mint_at(&self, cluster_name: &str, now: DateTime<Utc>) -> Result<BearerToken, TokenError> {
        let params = SigningParams {
            credentials: &self.credentials,
            region: &self.region,
            service: "sts",
            time: now,
        };
        let presigned = sigv4::presign_url(
            "GET",
            &self.sts_url()?,
            &[(CLUSTER_ID_HEADER, cluster_name)],
            TOKEN_EXPIRES_IN_SECS,
            &params,
        );

        Ok(BearerToken {
            encoded_value: format!(
                "{TOKEN_PREFIX}{}",
                URL_SAFE_NO_PAD.encode(presigned.as_str().as_bytes())
            ),
        })
    }
}
