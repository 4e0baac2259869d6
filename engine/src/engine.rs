//! Batch execution facade
//!
//! Validates a raw batch, resolves its devices, dispatches one session per
//! command group and aggregates the outcomes. Only an invalid batch fails
//! as a whole; everything else is reported per device.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, info_span, warn, Instrument};

use crate::aggregate::aggregate;
use crate::batch::{validate, RawBatch};
use crate::dispatch::{ConcurrencyPolicy, DispatchOptions, Dispatcher};
use crate::errors::ExecError;
use crate::models::batch::{BatchKind, DeviceEndpoint, ValidationIssue};
use crate::models::result::ExecutionResult;
use crate::session::driver::{SessionDriver, SessionRunner};
use crate::storage::settings::{DispatchSettings, SessionStyle, Settings};
use crate::topology::{Gns3TopologyResolver, StaticTopologyResolver, TopologyResolver};

/// Response for one batch, serialised as a JSON array either way
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum BatchResponse {
    /// One result per input group, in input order
    Results(Vec<ExecutionResult>),

    /// The batch was rejected before any device was contacted
    Invalid(Vec<ValidationIssue>),
}

impl BatchResponse {
    pub fn results(&self) -> Option<&[ExecutionResult]> {
        match self {
            BatchResponse::Results(results) => Some(results),
            BatchResponse::Invalid(_) => None,
        }
    }

    pub fn issues(&self) -> Option<&[ValidationIssue]> {
        match self {
            BatchResponse::Results(_) => None,
            BatchResponse::Invalid(issues) => Some(issues),
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, BatchResponse::Invalid(_))
    }
}

/// Multi-device command execution engine
pub struct BatchEngine {
    dispatch: DispatchSettings,
    resolver: Arc<dyn TopologyResolver>,
    runner: Arc<dyn SessionRunner>,
}

impl BatchEngine {
    pub fn new(
        dispatch: DispatchSettings,
        resolver: Arc<dyn TopologyResolver>,
        runner: Arc<dyn SessionRunner>,
    ) -> Self {
        Self {
            dispatch,
            resolver,
            runner,
        }
    }

    /// Engine wired to real consoles
    ///
    /// Uses the GNS3 server when `topology.server_url` is set, the static
    /// inventory otherwise.
    pub fn from_settings(settings: &Settings) -> Result<Self, ExecError> {
        let resolver: Arc<dyn TopologyResolver> = if settings.topology.server_url.is_some() {
            Arc::new(Gns3TopologyResolver::from_settings(settings)?)
        } else {
            let resolver = StaticTopologyResolver::new(settings.inventory.clone());
            if resolver.is_empty() {
                warn!(
                    "No topology server and no static inventory configured, no device will resolve"
                );
            } else {
                info!(
                    "No topology server configured, using static inventory ({} devices)",
                    resolver.len()
                );
            }
            Arc::new(resolver)
        };
        let runner = Arc::new(SessionDriver::tcp(settings.profiles.clone()));

        Ok(Self::new(settings.dispatch.clone(), resolver, runner))
    }

    /// Execute one batch end to end
    pub async fn execute_batch(&self, raw: impl Into<RawBatch>, kind: BatchKind) -> BatchResponse {
        let batch_id = uuid::Uuid::new_v4();
        let span = info_span!("batch", id = %batch_id, kind = %kind);
        self.execute(raw.into(), kind).instrument(span).await
    }

    async fn execute(&self, raw: RawBatch, kind: BatchKind) -> BatchResponse {
        let groups = match validate(raw, kind) {
            Ok(groups) => groups,
            Err(issues) => {
                warn!("Rejected {} batch with {} issue(s)", kind, issues.len());
                return BatchResponse::Invalid(issues);
            }
        };

        if groups.is_empty() {
            info!("Empty {} batch, nothing to do", kind);
            return BatchResponse::Results(Vec::new());
        }

        let names: BTreeSet<String> = groups.iter().map(|g| g.device_name.clone()).collect();
        let endpoints = match self.resolver.resolve(&names).await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                error!("Topology resolution failed, no device will be contacted: {}", e);
                HashMap::new()
            }
        };

        let options = self.dispatch_options(&endpoints);
        info!(
            "Executing {} batch: {} groups, {}/{} devices resolved, policy {:?}",
            kind,
            groups.len(),
            endpoints.len(),
            names.len(),
            options.policy
        );

        let outcomes = Dispatcher::new(Arc::clone(&self.runner))
            .dispatch(&groups, &endpoints, &options)
            .await;

        BatchResponse::Results(aggregate(&groups, outcomes))
    }

    /// Unbounded only when every resolved device is an interactive console
    fn dispatch_options(&self, endpoints: &HashMap<String, DeviceEndpoint>) -> DispatchOptions {
        let all_interactive = !endpoints.is_empty()
            && endpoints
                .values()
                .all(|e| self.runner.style_for(e) == Some(SessionStyle::InteractivePrompt));

        let policy = if self.dispatch.interactive_unbounded && all_interactive {
            ConcurrencyPolicy::Unbounded
        } else {
            ConcurrencyPolicy::Bounded(self.dispatch.pool_size)
        };

        DispatchOptions {
            policy,
            deadline: self.dispatch.batch_deadline_secs.map(Duration::from_secs),
        }
    }
}
