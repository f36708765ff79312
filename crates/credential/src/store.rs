//! The credential cache.
//!
//! Layout: an outer `RwLock<HashMap>` maps each [`CredentialKey`] to an
//! `Arc` slot whose contents are guarded by a per-key
//! `tokio::sync::Mutex`. A refresh holds the slot mutex for its whole
//! network round-trip, so concurrent requesters of the same key block
//! on the in-flight refresh instead of issuing duplicates, while
//! requests for other keys are untouched.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::{Mutex, RwLock};

use fleetrun_core::credential::{CredentialEntry, CredentialKey, CredentialStatus};
use fleetrun_core::error::CredentialError;
use fleetrun_core::transport::IdentityClient;
use fleetrun_core::types::{AccountId, CallerIdentity, Environment};

/// Per-key cache slot. The mutex serializes validation/refresh for one
/// key; `None` means no validated entry exists yet.
struct Slot {
    entry: Mutex<Option<CredentialEntry>>,
}

/// Caches validated, possibly role-scoped credentials per
/// (environment, account, role) key.
pub struct CredentialStore {
    identity: Arc<dyn IdentityClient>,
    slots: RwLock<HashMap<CredentialKey, Arc<Slot>>>,
    /// Operator-supplied base key material per environment. Raw input,
    /// not yet validated; validation happens on first `get`.
    base: RwLock<HashMap<Environment, CredentialEntry>>,
    /// Account each environment's base credential belongs to, learned
    /// from the first successful validation.
    home: RwLock<HashMap<Environment, AccountId>>,
    /// Minimum remaining validity for a cache hit.
    margin: Duration,
    /// Requested lifetime for scoped sessions, and the assumed expiry
    /// for long-term keys (STS reports none).
    session_duration: Duration,
}

impl CredentialStore {
    pub fn new(
        identity: Arc<dyn IdentityClient>,
        margin: std::time::Duration,
        session_duration: std::time::Duration,
    ) -> Self {
        Self {
            identity,
            slots: RwLock::new(HashMap::new()),
            base: RwLock::new(HashMap::new()),
            home: RwLock::new(HashMap::new()),
            margin: Duration::from_std(margin).unwrap_or_else(|_| Duration::seconds(300)),
            session_duration: Duration::from_std(session_duration)
                .unwrap_or_else(|_| Duration::seconds(3600)),
        }
    }

    /// Supply (or replace) the base key material for an environment.
    ///
    /// Drops every cached entry for the environment so the next `get`
    /// revalidates against the new material.
    pub async fn put_base(&self, environment: Environment, entry: CredentialEntry) {
        tracing::info!(%environment, "Storing base credentials");
        self.base.write().await.insert(environment, entry);
        self.home.write().await.remove(&environment);
        self.evict_environment(environment).await;
    }

    /// Validate the environment's base material eagerly and learn which
    /// account it belongs to. The validated entry is cached under that
    /// account's base key.
    pub async fn validate_base(
        &self,
        environment: Environment,
    ) -> Result<CallerIdentity, CredentialError> {
        let base = self.base_material(environment).await?;
        let identity = self.identity.validate(environment, &base).await?;
        let entry = self.stamped(base);

        let key = CredentialKey::base(environment, identity.account.clone());
        let slot = self.slot_for(&key).await;
        *slot.entry.lock().await = Some(entry);
        self.home
            .write()
            .await
            .insert(environment, identity.account.clone());

        tracing::info!(%environment, account = %identity.account, "Validated base credentials");
        Ok(identity)
    }

    /// Account the environment's base credential belongs to, if it has
    /// been validated.
    pub async fn home_account(&self, environment: Environment) -> Option<AccountId> {
        self.home.read().await.get(&environment).cloned()
    }

    /// Resolve the environment's own base credential, validating first
    /// when the owning account is not yet known.
    pub async fn base_entry(
        &self,
        environment: Environment,
    ) -> Result<CredentialEntry, CredentialError> {
        let account = match self.home_account(environment).await {
            Some(account) => account,
            None => self.validate_base(environment).await?.account,
        };
        self.get(&CredentialKey::base(environment, account)).await
    }

    /// Resolve a credential for `key`, refreshing on miss or
    /// near-expiry.
    ///
    /// Cache hits with more than the safety margin of validity left
    /// return without network I/O. Otherwise the slot performs exactly
    /// one validation (base key) or role assumption (scoped key) and
    /// stores the replacement entry.
    pub async fn get(&self, key: &CredentialKey) -> Result<CredentialEntry, CredentialError> {
        let slot = self.slot_for(key).await;
        let mut guard = slot.entry.lock().await;

        if let Some(entry) = guard.as_ref() {
            if entry.is_fresh(self.margin) {
                return Ok(entry.clone());
            }
            tracing::debug!(key = %key, "Cached credential near expiry, refreshing");
        }

        let fresh = self.refresh(key).await?;
        *guard = Some(fresh.clone());
        Ok(fresh)
    }

    /// Evict every cached entry for (environment, account) immediately.
    pub async fn invalidate(&self, environment: Environment, account: &str) {
        tracing::info!(%environment, account, "Clearing credentials");
        self.slots
            .write()
            .await
            .retain(|key, _| !(key.environment == environment && key.account == account));
    }

    /// Remove the base material and all cached entries for an
    /// environment.
    pub async fn clear_environment(&self, environment: Environment) {
        self.base.write().await.remove(&environment);
        self.home.write().await.remove(&environment);
        self.evict_environment(environment).await;
    }

    /// Validity report for the base credential of (environment,
    /// account). Unknown keys report invalid rather than erroring.
    pub async fn status(&self, environment: Environment, account: &str) -> CredentialStatus {
        let key = CredentialKey::base(environment, account);
        // Clone the slot out of the map before waiting on its mutex:
        // holding the map guard across an in-flight refresh would queue
        // writers and, behind them, every other key's reads.
        let slot = self.slots.read().await.get(&key).map(Arc::clone);
        let Some(slot) = slot else {
            return CredentialStatus {
                valid: false,
                expires_in: None,
            };
        };
        let guard = slot.entry.lock().await;
        match guard.as_ref() {
            Some(entry) => CredentialStatus {
                valid: entry.is_fresh(self.margin),
                expires_in: Some(entry.remaining().num_seconds()),
            },
            None => CredentialStatus {
                valid: false,
                expires_in: None,
            },
        }
    }

    /// Environments with usable base material, for the operator UI.
    pub async fn environments(&self) -> Vec<Environment> {
        self.base.read().await.keys().copied().collect()
    }

    // ---- private helpers ----

    async fn slot_for(&self, key: &CredentialKey) -> Arc<Slot> {
        if let Some(slot) = self.slots.read().await.get(key) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().await;
        Arc::clone(slots.entry(key.clone()).or_insert_with(|| {
            Arc::new(Slot {
                entry: Mutex::new(None),
            })
        }))
    }

    async fn evict_environment(&self, environment: Environment) {
        self.slots
            .write()
            .await
            .retain(|key, _| key.environment != environment);
    }

    async fn base_material(
        &self,
        environment: Environment,
    ) -> Result<CredentialEntry, CredentialError> {
        self.base
            .read()
            .await
            .get(&environment)
            .cloned()
            .ok_or_else(|| CredentialError::Missing(environment.to_string()))
    }

    /// Stamp a validated base entry with its effective expiry.
    ///
    /// Long-term keys carry no authoritative expiry; assign the session
    /// duration. Temporary material keeps the expiry it was supplied
    /// with.
    fn stamped(&self, base: CredentialEntry) -> CredentialEntry {
        let expires_at = if base.temporary {
            base.expires_at
        } else {
            Utc::now() + self.session_duration
        };
        CredentialEntry { expires_at, ..base }
    }

    /// Perform one validation or role assumption for `key`.
    ///
    /// Called with the key's slot mutex held, which is what guarantees
    /// at most one in-flight refresh per key.
    async fn refresh(&self, key: &CredentialKey) -> Result<CredentialEntry, CredentialError> {
        let base = self.base_material(key.environment).await?;

        match &key.role_arn {
            None => {
                let identity = self.identity.validate(key.environment, &base).await?;
                tracing::info!(
                    key = %key,
                    arn = %identity.arn,
                    "Validated base credentials",
                );
                self.home
                    .write()
                    .await
                    .insert(key.environment, identity.account);
                Ok(self.stamped(base))
            }
            Some(role_arn) => {
                let session_name = format!("fleetrun-{}", Utc::now().timestamp());
                let scoped = self
                    .identity
                    .assume_role(key.environment, &base, role_arn, &session_name)
                    .await?;
                tracing::info!(
                    key = %key,
                    expires_at = %scoped.expires_at,
                    "Assumed role",
                );
                Ok(scoped)
            }
        }
    }
}
