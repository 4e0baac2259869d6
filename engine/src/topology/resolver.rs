//! Topology resolver interface

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;

use crate::errors::ExecError;
use crate::models::batch::DeviceEndpoint;

/// Resolves device names to live management endpoints
///
/// Devices that are not in the topology, or have no usable management port,
/// are left out of the returned map. Absence is not an error.
#[async_trait]
pub trait TopologyResolver: Send + Sync {
    async fn resolve(
        &self,
        device_names: &BTreeSet<String>,
    ) -> Result<HashMap<String, DeviceEndpoint>, ExecError>;
}
