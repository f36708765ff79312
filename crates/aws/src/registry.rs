//! Provider registry: named bundles of transport implementations.
//!
//! The runner resolves a provider identifier (currently only `aws`) to
//! the full transport set the engine needs. The registry is populated
//! once at startup and read-only afterwards.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fleetrun_core::transport::{IdentityClient, TransportSet};

use crate::accounts::OrgAccountDirectory;
use crate::command::SsmCommandTransport;
use crate::discovery::Ec2Discovery;
use crate::identity::StsIdentityClient;

/// The AWS transport set: STS identity, EC2 discovery, SSM execution,
/// and the Organizations directory.
pub fn aws_transports(session_duration: Duration) -> TransportSet {
    let identity: Arc<dyn IdentityClient> = Arc::new(StsIdentityClient::new(session_duration));
    TransportSet {
        discovery: Arc::new(Ec2Discovery),
        command: Arc::new(SsmCommandTransport),
        accounts: Arc::new(OrgAccountDirectory::new(Arc::clone(&identity))),
        identity,
    }
}

/// Registry of provider transport sets keyed by identifier.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, TransportSet>,
}

impl ProviderRegistry {
    /// Registry holding only the AWS provider.
    pub fn aws_only(session_duration: Duration) -> Self {
        let mut registry = Self::default();
        registry.register("aws", aws_transports(session_duration));
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, transports: TransportSet) {
        self.providers.insert(name.into(), transports);
    }

    pub fn get(&self, name: &str) -> Option<&TransportSet> {
        self.providers.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }
}
