//! Ambient AWS credentials.

use std::fmt;

use crate::providers::AwsError;

/// Environment variable holding the access key ID.
pub const ENV_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
/// Environment variable holding the secret access key.
pub const ENV_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
/// Environment variable holding the session token of temporary credentials.
pub const ENV_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";

/// Static or temporary AWS credentials used for SigV4 signing.
#[derive(Clone)]
pub struct AwsCredentials {
    /// AWS access key ID.
    pub access_key_id: String,
    /// AWS secret access key.
    pub secret_access_key: String,
    /// Session token, present for role/instance credentials.
    pub session_token: Option<String>,
}

impl AwsCredentials {
    /// Create credentials from explicit values.
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
        }
    }

    /// Read credentials from the standard AWS environment variables.
    pub fn from_env() -> Result<Self, AwsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read credentials through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AwsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let access_key_id = lookup(ENV_ACCESS_KEY_ID)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AwsError::Config(format!("{ENV_ACCESS_KEY_ID} not set")))?;
        let secret_access_key = lookup(ENV_SECRET_ACCESS_KEY)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AwsError::Config(format!("{ENV_SECRET_ACCESS_KEY} not set")))?;
        let session_token = lookup(ENV_SESSION_TOKEN).filter(|v| !v.is_empty());

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}
