use std::collections::HashMap;

use cluster_aggregator_runner::prelude::HostGroupResolver;
use futures::future::BoxFuture;
use futures::FutureExt;

#[derive(derive_more::Error, derive_more::Display, Debug)]
#[display("Unknown host group {group_id}")]
pub struct UnknownHostGroupError {
    group_id: u64,
}

/// Host groups listed in the configuration file.
#[derive(Debug, Clone, Default)]
pub struct StaticHostGroups {
    groups: HashMap<u64, Vec<String>>,
}

impl StaticHostGroups {
    pub fn new(groups: HashMap<u64, Vec<String>>) -> Self {
        Self { groups }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl HostGroupResolver for StaticHostGroups {
    fn hosts_for_group(&self, group_id: u64) -> BoxFuture<'_, anyhow::Result<Vec<String>>> {
        let hosts: anyhow::Result<Vec<String>> = self
            .groups
            .get(&group_id)
            .cloned()
            .ok_or_else(|| UnknownHostGroupError { group_id }.into());

        futures::future::ready(hosts).boxed()
    }
}
