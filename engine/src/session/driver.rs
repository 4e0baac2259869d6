//! Session style selection

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::error;

use crate::models::batch::{CommandGroup, DeviceEndpoint};
use crate::models::result::SessionOutcome;
use crate::session::cli::{CliSessionFactory, TelnetCliSessionFactory};
use crate::session::transport::{Connector, TcpConnector};
use crate::session::{interactive, structured};
use crate::storage::settings::{Profile, SessionStyle};

/// Drives one device session and reports its outcome
///
/// Implementations never fail: every problem ends up in the outcome.
#[async_trait]
pub trait SessionRunner: Send + Sync {
    async fn run(&self, endpoint: &DeviceEndpoint, group: &CommandGroup) -> SessionOutcome;

    /// Session style used for an endpoint, if known
    fn style_for(&self, endpoint: &DeviceEndpoint) -> Option<SessionStyle>;
}

/// Session runner selecting the style from the endpoint's profile group
pub struct SessionDriver {
    profiles: BTreeMap<String, Profile>,
    connector: Arc<dyn Connector>,
    cli_factory: Arc<dyn CliSessionFactory>,
}

impl SessionDriver {
    pub fn new(
        profiles: BTreeMap<String, Profile>,
        connector: Arc<dyn Connector>,
        cli_factory: Arc<dyn CliSessionFactory>,
    ) -> Self {
        Self {
            profiles,
            connector,
            cli_factory,
        }
    }

    /// Driver talking to real consoles over TCP
    pub fn tcp(profiles: BTreeMap<String, Profile>) -> Self {
        let connector: Arc<dyn Connector> = Arc::new(TcpConnector);
        let cli_factory = Arc::new(TelnetCliSessionFactory::new(Arc::clone(&connector)));
        Self::new(profiles, connector, cli_factory)
    }
}

#[async_trait]
impl SessionRunner for SessionDriver {
    async fn run(&self, endpoint: &DeviceEndpoint, group: &CommandGroup) -> SessionOutcome {
        let Some(profile) = self.profiles.get(&endpoint.profile_group) else {
            error!(
                "Device '{}' uses unknown profile group '{}'",
                endpoint.device_name, endpoint.profile_group
            );
            return SessionOutcome::failure(
                &endpoint.device_name,
                format!("Unknown profile group: {}", endpoint.profile_group),
                Duration::ZERO,
            );
        };

        match profile.style {
            SessionStyle::InteractivePrompt => {
                interactive::run(self.connector.as_ref(), endpoint, profile, &group.commands).await
            }
            SessionStyle::StructuredRequest => {
                structured::run(self.cli_factory.as_ref(), endpoint, profile, group).await
            }
        }
    }

    fn style_for(&self, endpoint: &DeviceEndpoint) -> Option<SessionStyle> {
        self.profiles.get(&endpoint.profile_group).map(|p| p.style)
    }
}
