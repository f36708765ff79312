//! AWS adapters for the fleetrun transport traits.
//!
//! One adapter per external service: STS for identity and role
//! assumption, EC2 for instance discovery, SSM for remote command
//! execution, and Organizations for the account directory.
//! [`registry::ProviderRegistry`] bundles them into a statically known
//! capability set per provider identifier.

pub mod accounts;
pub mod classify;
pub mod command;
pub mod discovery;
pub mod identity;
pub mod registry;

use aws_credential_types::Credentials;
use fleetrun_core::credential::CredentialEntry;

/// Provider name recorded on SDK credentials built from a cache entry.
const PROVIDER_NAME: &str = "fleetrun-credential-store";

/// Convert a validated cache entry into SDK key material.
pub(crate) fn sdk_credentials(entry: &CredentialEntry) -> Credentials {
    Credentials::new(
        entry.access_key_id.clone(),
        entry.secret_access_key.clone(),
        entry.session_token.clone(),
        None,
        PROVIDER_NAME,
    )
}
