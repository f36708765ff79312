//! EC2-backed instance discovery.
//!
//! One `list` call performs one paginated `DescribeInstances` pass and
//! converts each reservation's instances into read-only snapshots.
//! State and tag filters are pushed server-side; the platform filter is
//! applied locally because EC2 only tags Windows instances with a
//! platform value.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_ec2::config::{BehaviorVersion, Region};
use aws_sdk_ec2::error::ProvideErrorMetadata;
use aws_sdk_ec2::types::Filter;

use fleetrun_core::credential::CredentialEntry;
use fleetrun_core::error::DiscoveryError;
use fleetrun_core::instance::{DiscoveryFilters, Instance, InstanceState, Platform};
use fleetrun_core::transport::InstanceDiscovery;

use crate::classify;
use crate::sdk_credentials;

/// Instance discovery backed by EC2 `DescribeInstances`.
#[derive(Debug, Default)]
pub struct Ec2Discovery;

impl Ec2Discovery {
    fn client(&self, entry: &CredentialEntry, region: &str) -> aws_sdk_ec2::Client {
        let config = aws_sdk_ec2::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(sdk_credentials(entry))
            .build();
        aws_sdk_ec2::Client::from_conf(config)
    }
}

/// Build the server-side EC2 filter list from a discovery filter set.
fn ec2_filters(filters: &DiscoveryFilters) -> Vec<Filter> {
    let mut out = Vec::new();
    if let Some(state) = filters.state {
        out.push(
            Filter::builder()
                .name("instance-state-name")
                .values(state.as_str())
                .build(),
        );
    }
    if filters.platform == Some(Platform::Windows) {
        out.push(Filter::builder().name("platform").values("windows").build());
    }
    for (key, value) in &filters.tags {
        out.push(
            Filter::builder()
                .name(format!("tag:{key}"))
                .values(value)
                .build(),
        );
    }
    out
}

/// Convert one EC2 instance record into a snapshot. Returns `None` for
/// records missing an ID or a recognizable state.
fn snapshot(instance: &aws_sdk_ec2::types::Instance) -> Option<Instance> {
    let id = instance.instance_id()?.to_string();
    let state = instance
        .state()
        .and_then(|s| s.name())
        .and_then(|name| InstanceState::parse(name.as_str()))?;

    let tags: HashMap<String, String> = instance
        .tags()
        .iter()
        .filter_map(|tag| Some((tag.key()?.to_string(), tag.value()?.to_string())))
        .collect();

    Some(Instance {
        id,
        platform: Platform::from_ec2(instance.platform().map(|p| p.as_str())),
        state,
        private_ip: instance.private_ip_address().map(str::to_string),
        public_ip: instance.public_ip_address().map(str::to_string),
        tags,
    })
}

#[async_trait]
impl InstanceDiscovery for Ec2Discovery {
    async fn list(
        &self,
        credential: &CredentialEntry,
        region: &str,
        filters: &DiscoveryFilters,
    ) -> Result<Vec<Instance>, DiscoveryError> {
        let client = self.client(credential, region);

        let mut request = client.describe_instances();
        let server_filters = ec2_filters(filters);
        if !server_filters.is_empty() {
            request = request.set_filters(Some(server_filters));
        }

        let mut instances = Vec::new();
        let mut pages = request.into_paginator().send();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|err| {
                let message = err.message().unwrap_or("DescribeInstances failed").to_string();
                classify::discovery_error(err.code(), &message)
            })?;
            for reservation in page.reservations() {
                instances.extend(
                    reservation
                        .instances()
                        .iter()
                        .filter_map(snapshot)
                        .filter(|i| filters.matches(i)),
                );
            }
        }

        tracing::info!(region, count = instances.len(), "Discovered instances");
        Ok(instances)
    }
}
