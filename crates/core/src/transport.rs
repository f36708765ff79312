//! Transport traits: the seams between the engine and the cloud.
//!
//! Three external services back the engine — the identity/trust
//! service, instance discovery, and the remote-execution service — plus
//! the account directory. Each is a trait here so the AWS adapters in
//! `fleetrun-aws` and the test doubles are interchangeable.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credential::CredentialEntry;
use crate::error::{CredentialError, DiscoveryError, DispatchError, TrackingError};
use crate::instance::{DiscoveryFilters, Instance};
use crate::script::Script;
use crate::types::{AccountSummary, CallerIdentity, CommandId, Environment, InstanceId};

/// Identity/trust transport: credential validation and role assumption.
///
/// Pure protocol adapter — no caching and no retry policy of its own.
/// Calling [`assume_role`](IdentityClient::assume_role) twice yields two
/// independent scoped credentials; deduplication belongs to the
/// credential store.
#[async_trait]
pub trait IdentityClient: Send + Sync {
    /// Validate a credential and resolve the calling principal.
    async fn validate(
        &self,
        environment: Environment,
        credential: &CredentialEntry,
    ) -> Result<CallerIdentity, CredentialError>;

    /// Exchange `base` for a time-limited credential scoped to
    /// `role_arn`. Returns the scoped entry carrying its own expiry.
    async fn assume_role(
        &self,
        environment: Environment,
        base: &CredentialEntry,
        role_arn: &str,
        session_name: &str,
    ) -> Result<CredentialEntry, CredentialError>;
}

/// Instance discovery for one (account, region).
#[async_trait]
pub trait InstanceDiscovery: Send + Sync {
    /// One discovery pass; re-invoke for fresh data.
    async fn list(
        &self,
        credential: &CredentialEntry,
        region: &str,
        filters: &DiscoveryFilters,
    ) -> Result<Vec<Instance>, DiscoveryError>;
}

/// Remote view of a dispatched command, as reported by one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteCommandStatus {
    /// Queued or delayed on the remote side.
    Pending,
    InProgress,
    Success,
    Failed,
    Cancelled,
    TimedOut,
}

impl RemoteCommandStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::InProgress)
    }
}

/// One poll result: remote status plus whatever output is available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandPoll {
    pub status: RemoteCommandStatus,
    pub output: Option<String>,
    pub exit_code: Option<i32>,
}

/// Remote-execution transport: send, poll, cancel.
#[async_trait]
pub trait CommandTransport: Send + Sync {
    /// Submit one remote-execution request; returns the tracking ID
    /// without waiting for completion.
    async fn send(
        &self,
        credential: &CredentialEntry,
        region: &str,
        instance_id: &InstanceId,
        script: &Script,
        comment: &str,
    ) -> Result<CommandId, DispatchError>;

    /// Fetch the current state of a dispatched command.
    async fn poll(
        &self,
        credential: &CredentialEntry,
        region: &str,
        command_id: &CommandId,
        instance_id: &InstanceId,
    ) -> Result<CommandPoll, TrackingError>;

    /// Best-effort cancellation; the engine does not wait for remote
    /// acknowledgment.
    async fn cancel(
        &self,
        credential: &CredentialEntry,
        region: &str,
        command_id: &CommandId,
        instance_id: &InstanceId,
    ) -> Result<(), TrackingError>;
}

/// Account directory for an environment.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Accounts visible to the supplied credential.
    async fn list_accounts(
        &self,
        environment: Environment,
        credential: &CredentialEntry,
    ) -> Result<Vec<AccountSummary>, CredentialError>;
}

/// The full set of transports for one provider, resolved at startup.
#[derive(Clone)]
pub struct TransportSet {
    pub identity: Arc<dyn IdentityClient>,
    pub discovery: Arc<dyn InstanceDiscovery>,
    pub command: Arc<dyn CommandTransport>,
    pub accounts: Arc<dyn AccountDirectory>,
}

/// Convert an AWS SDK expiry into the engine's timestamp type.
///
/// Sub-second precision is irrelevant for hour-scale credentials.
pub fn expiry_from_epoch_secs(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
}
