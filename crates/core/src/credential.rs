//! Credential key material and cache keys.
//!
//! [`CredentialEntry`] values are immutable once created: a refresh
//! produces a replacement entry, never an in-place mutation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AccountId, Environment};

/// Cache key for one credential: a trust partition, an account, and
/// optionally the role assumed inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialKey {
    pub environment: Environment,
    pub account: AccountId,
    /// Full role ARN when the credential is role-scoped; `None` for the
    /// environment's base credential.
    pub role_arn: Option<String>,
}

impl CredentialKey {
    pub fn base(environment: Environment, account: impl Into<AccountId>) -> Self {
        Self {
            environment,
            account: account.into(),
            role_arn: None,
        }
    }

    pub fn assumed(
        environment: Environment,
        account: impl Into<AccountId>,
        role_arn: impl Into<String>,
    ) -> Self {
        Self {
            environment,
            account: account.into(),
            role_arn: Some(role_arn.into()),
        }
    }
}

impl std::fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.role_arn {
            Some(role) => write!(f, "{}/{}/{}", self.environment, self.account, role),
            None => write!(f, "{}/{}", self.environment, self.account),
        }
    }
}

/// Validated AWS key material with expiry tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialEntry {
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Present for temporary (STS-issued) credentials.
    pub session_token: Option<String>,
    /// Absolute expiry; cache eviction happens before this point by the
    /// configured safety margin.
    pub expires_at: DateTime<Utc>,
    /// Whether this entry came from STS rather than a long-term key.
    pub temporary: bool,
}

impl CredentialEntry {
    /// Remaining validity from now. Negative once expired.
    pub fn remaining(&self) -> Duration {
        self.expires_at - Utc::now()
    }

    /// Whether the entry is still usable given a safety `margin`.
    ///
    /// An entry within the margin of its expiry is treated as expired so
    /// it is never handed out with too little runway to finish a call.
    pub fn is_fresh(&self, margin: Duration) -> bool {
        self.remaining() > margin
    }
}

/// Caller-facing view of a cached credential's validity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialStatus {
    pub valid: bool,
    /// Seconds of validity remaining, when a cached entry exists.
    pub expires_in: Option<i64>,
}
