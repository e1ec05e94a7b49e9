//! AWS Credential Loading
//!
//! Reads the standard AWS environment variables at startup. Nothing is
//! hardcoded and the secret key is never logged.

use anyhow::{Context, Result};
use std::fmt;
use tracing::{debug, info};

/// Static or temporary AWS credentials
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.masked_key_id())
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl AwsCredentials {
    /// Load from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and the
    /// optional `AWS_SESSION_TOKEN`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let access_key_id =
            non_empty("AWS_ACCESS_KEY_ID").context("AWS_ACCESS_KEY_ID must be set")?;
        let secret_access_key =
            non_empty("AWS_SECRET_ACCESS_KEY").context("AWS_SECRET_ACCESS_KEY must be set")?;
        let session_token = non_empty("AWS_SESSION_TOKEN");

        if session_token.is_some() {
            debug!("Using temporary credentials with session token");
        }

        let credentials = Self {
            access_key_id,
            secret_access_key,
            session_token,
        };
        info!("AWS credentials loaded (key id: {})", credentials.masked_key_id());

        Ok(credentials)
    }

    /// Access key id with all but its last four characters hidden
    pub fn masked_key_id(&self) -> String {
        let chars: Vec<char> = self.access_key_id.chars().collect();
        let visible = chars.len().saturating_sub(4);
        let tail: String = chars[visible..].iter().collect();
        format!("{}{}", "*".repeat(visible), tail)
    }
}
