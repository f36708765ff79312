//! Organizations-backed account directory.
//!
//! A management-account credential sees the whole organization via
//! `ListAccounts`. Member-account or standalone credentials are denied
//! that call, so the directory falls back to the caller's own account
//! resolved through the identity client.

use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_organizations::config::{BehaviorVersion, Region};
use aws_sdk_organizations::error::ProvideErrorMetadata;

use fleetrun_core::credential::CredentialEntry;
use fleetrun_core::error::CredentialError;
use fleetrun_core::transport::{AccountDirectory, IdentityClient};
use fleetrun_core::types::{AccountSummary, Environment};

use crate::sdk_credentials;

/// Account directory backed by AWS Organizations, with a single-account
/// fallback for credentials outside a management account.
pub struct OrgAccountDirectory {
    identity: Arc<dyn IdentityClient>,
}

impl OrgAccountDirectory {
    pub fn new(identity: Arc<dyn IdentityClient>) -> Self {
        Self { identity }
    }

    fn client(
        &self,
        environment: Environment,
        entry: &CredentialEntry,
    ) -> aws_sdk_organizations::Client {
        let config = aws_sdk_organizations::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(environment.home_region()))
            .credentials_provider(sdk_credentials(entry))
            .build();
        aws_sdk_organizations::Client::from_conf(config)
    }

    /// Fall back to a one-entry directory holding the caller's own
    /// account.
    async fn own_account(
        &self,
        environment: Environment,
        credential: &CredentialEntry,
    ) -> Result<Vec<AccountSummary>, CredentialError> {
        let identity = self.identity.validate(environment, credential).await?;
        Ok(vec![AccountSummary {
            id: identity.account,
            name: None,
            status: Some("ACTIVE".to_string()),
        }])
    }
}

/// Codes meaning the credential cannot enumerate the organization at
/// all, as opposed to a transient failure.
fn is_not_enumerable(code: &str) -> bool {
    matches!(
        code,
        "AccessDeniedException" | "AWSOrganizationsNotInUseException"
    )
}

#[async_trait]
impl AccountDirectory for OrgAccountDirectory {
    async fn list_accounts(
        &self,
        environment: Environment,
        credential: &CredentialEntry,
    ) -> Result<Vec<AccountSummary>, CredentialError> {
        let client = self.client(environment, credential);

        let mut accounts = Vec::new();
        let mut pages = client.list_accounts().into_paginator().items().send();
        while let Some(item) = pages.next().await {
            let account = match item {
                Ok(account) => account,
                Err(err) if err.code().is_some_and(is_not_enumerable) => {
                    tracing::debug!(
                        %environment,
                        code = err.code().unwrap_or_default(),
                        "Organization not enumerable, falling back to caller account"
                    );
                    return self.own_account(environment, credential).await;
                }
                Err(err) => {
                    let message = err.message().unwrap_or("ListAccounts failed").to_string();
                    return Err(CredentialError::Transient(message));
                }
            };
            if let Some(id) = account.id() {
                accounts.push(AccountSummary {
                    id: id.to_string(),
                    name: account.name().map(str::to_string),
                    status: account.status().map(|s| s.as_str().to_string()),
                });
            }
        }

        tracing::info!(%environment, count = accounts.len(), "Listed organization accounts");
        Ok(accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denial_codes_trigger_fallback() {
        assert!(is_not_enumerable("AccessDeniedException"));
        assert!(is_not_enumerable("AWSOrganizationsNotInUseException"));
        assert!(!is_not_enumerable("ThrottlingException"));
    }
}
