//! The caller-facing engine facade.
//!
//! [`ScriptEngine`] wires the credential store, dispatcher, tracker,
//! and batch coordinator over one provider's transport set and exposes
//! the operations an embedding service needs: credential management,
//! account and instance listing, and batch script execution.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use fleetrun_core::config::EngineConfig;
use fleetrun_core::credential::{CredentialEntry, CredentialKey, CredentialStatus};
use fleetrun_core::error::{DiscoveryError, EngineError};
use fleetrun_core::execution::BatchResult;
use fleetrun_core::instance::{DiscoveryFilters, Instance};
use fleetrun_core::script::Script;
use fleetrun_core::transport::TransportSet;
use fleetrun_core::types::{
    AccountId, AccountSummary, CallerIdentity, Environment, InstanceId, RegionName,
};

use fleetrun_credential::CredentialStore;

use crate::batch::BatchCoordinator;
use crate::dispatcher::Dispatcher;
use crate::sink::{ExecutionSink, NoopSink};
use crate::tracker::ExecutionTracker;

/// One batch request: a script and the fleet slice to run it on.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub environment: Environment,
    /// Target account. When it differs from the account the base
    /// credential belongs to, the engine assumes the organization
    /// access role in it.
    pub account: AccountId,
    pub region: RegionName,
    pub script: Script,
    /// Targets, dispatched in order.
    pub instance_ids: Vec<InstanceId>,
}

/// Cross-account fleet script execution over one provider.
pub struct ScriptEngine {
    config: EngineConfig,
    store: Arc<CredentialStore>,
    transports: TransportSet,
    coordinator: BatchCoordinator,
}

impl ScriptEngine {
    pub fn new(config: EngineConfig, transports: TransportSet) -> Self {
        Self::with_sink(config, transports, Arc::new(NoopSink))
    }

    pub fn with_sink(
        config: EngineConfig,
        transports: TransportSet,
        sink: Arc<dyn ExecutionSink>,
    ) -> Self {
        let store = Arc::new(CredentialStore::new(
            Arc::clone(&transports.identity),
            config.credential_margin,
            config.session_duration,
        ));
        let dispatcher = Dispatcher::new(
            Arc::clone(&transports.command),
            config.dispatch_attempts,
            config.dispatch_base_delay,
        );
        let tracker = Arc::new(ExecutionTracker::new(
            Arc::clone(&transports.command),
            dispatcher,
            Arc::clone(&store),
            config.clone(),
            Arc::clone(&sink),
        ));
        let coordinator = BatchCoordinator::new(tracker, config.clone(), sink);
        Self {
            config,
            store,
            transports,
            coordinator,
        }
    }

    // ---- credentials ----

    /// Supply base credentials for an environment and validate them
    /// eagerly. Replaces any previous material and drops every cached
    /// entry derived from it.
    pub async fn put_credentials(
        &self,
        environment: Environment,
        access_key_id: String,
        secret_access_key: String,
        session_token: Option<String>,
    ) -> Result<CallerIdentity, EngineError> {
        let session_duration = chrono::Duration::from_std(self.config.session_duration)
            .unwrap_or_else(|_| chrono::Duration::seconds(3600));
        let entry = CredentialEntry {
            access_key_id,
            secret_access_key,
            temporary: session_token.is_some(),
            session_token,
            // Placeholder until validation stamps the effective expiry.
            expires_at: Utc::now() + session_duration,
        };
        self.store.put_base(environment, entry).await;
        Ok(self.store.validate_base(environment).await?)
    }

    /// Validity report for the base credential of (environment,
    /// account). Unknown pairs report invalid rather than erroring.
    pub async fn credential_status(
        &self,
        environment: Environment,
        account: &str,
    ) -> CredentialStatus {
        self.store.status(environment, account).await
    }

    /// Drop an environment's base material and every derived entry.
    pub async fn clear_credentials(&self, environment: Environment) {
        self.store.clear_environment(environment).await;
    }

    /// Environments currently holding base material.
    pub async fn environments(&self) -> Vec<Environment> {
        self.store.environments().await
    }

    // ---- discovery ----

    /// Accounts visible to the environment's base credential.
    pub async fn list_accounts(
        &self,
        environment: Environment,
    ) -> Result<Vec<AccountSummary>, EngineError> {
        let entry = self.store.base_entry(environment).await?;
        Ok(self
            .transports
            .accounts
            .list_accounts(environment, &entry)
            .await?)
    }

    /// Instances in (account, region) matching `filters`.
    ///
    /// An expired-credential failure triggers exactly one refresh and
    /// retry; a second failure surfaces to the caller.
    pub async fn list_instances(
        &self,
        environment: Environment,
        account: &str,
        region: &str,
        filters: &DiscoveryFilters,
    ) -> Result<Vec<Instance>, EngineError> {
        let key = self.credential_key(environment, account).await?;
        let entry = self.store.get(&key).await?;
        match self.transports.discovery.list(&entry, region, filters).await {
            Ok(instances) => Ok(instances),
            Err(DiscoveryError::AuthExpired(reason)) => {
                tracing::warn!(
                    %environment,
                    account,
                    reason,
                    "Discovery credential expired, refreshing once",
                );
                self.store.invalidate(environment, account).await;
                let entry = self.store.get(&key).await?;
                Ok(self.transports.discovery.list(&entry, region, filters).await?)
            }
            Err(err) => Err(err.into()),
        }
    }

    // ---- batches ----

    /// Start a batch and return its ID immediately.
    pub async fn start_batch(&self, request: BatchRequest) -> Result<Uuid, EngineError> {
        let key = self
            .credential_key(request.environment, &request.account)
            .await?;
        Ok(self
            .coordinator
            .start(key, request.region, request.script, request.instance_ids)
            .await)
    }

    /// Run a batch to completion and return the final result.
    pub async fn run_batch(&self, request: BatchRequest) -> Result<BatchResult, EngineError> {
        let batch_id = self.start_batch(request).await?;
        self.coordinator.wait(batch_id).await
    }

    /// Current snapshot of a batch, running or finished.
    pub async fn batch_status(&self, batch_id: Uuid) -> Result<BatchResult, EngineError> {
        self.coordinator.status(batch_id).await
    }

    /// Wait for a started batch to finish.
    pub async fn wait_batch(&self, batch_id: Uuid) -> Result<BatchResult, EngineError> {
        self.coordinator.wait(batch_id).await
    }

    /// Request cancellation of a running batch.
    pub async fn cancel_batch(&self, batch_id: Uuid) -> Result<(), EngineError> {
        self.coordinator.cancel(batch_id).await
    }

    /// Credential key for operations against `account`: the base key
    /// for the credential's own account, the organization access role
    /// for any other.
    async fn credential_key(
        &self,
        environment: Environment,
        account: &str,
    ) -> Result<CredentialKey, EngineError> {
        let home = match self.store.home_account(environment).await {
            Some(home) => home,
            None => self.store.validate_base(environment).await?.account,
        };
        Ok(if home == account {
            CredentialKey::base(environment, account)
        } else {
            CredentialKey::assumed(environment, account, environment.org_role_arn(account))
        })
    }
}
