//! Resolver backed by a fixed inventory

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tracing::debug;

use crate::errors::ExecError;
use crate::models::batch::DeviceEndpoint;
use crate::topology::resolver::TopologyResolver;

/// Resolves devices from a static list of endpoints
#[derive(Debug, Clone, Default)]
pub struct StaticTopologyResolver {
    endpoints: HashMap<String, DeviceEndpoint>,
}

impl StaticTopologyResolver {
    pub fn new(endpoints: impl IntoIterator<Item = DeviceEndpoint>) -> Self {
        Self {
            endpoints: endpoints
                .into_iter()
                .map(|e| (e.device_name.clone(), e))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

#[async_trait]
impl TopologyResolver for StaticTopologyResolver {
    async fn resolve(
        &self,
        device_names: &BTreeSet<String>,
    ) -> Result<HashMap<String, DeviceEndpoint>, ExecError> {
        let resolved: HashMap<_, _> = device_names
            .iter()
            .filter_map(|name| self.endpoints.get(name))
            .filter(|endpoint| endpoint.port != 0)
            .map(|endpoint| (endpoint.device_name.clone(), endpoint.clone()))
            .collect();

        debug!(
            "Resolved {}/{} devices from static inventory",
            resolved.len(),
            device_names.len()
        );
        Ok(resolved)
    }
}
