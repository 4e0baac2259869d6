//! GNS3 server topology resolver
//!
//! Reads the node inventory of a GNS3 project over the REST API and maps
//! each node's console to a [`DeviceEndpoint`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::errors::ExecError;
use crate::models::batch::DeviceEndpoint;
use crate::storage::settings::Settings;
use crate::topology::resolver::TopologyResolver;

/// Console hosts that only say "listening everywhere".
const WILDCARD_HOSTS: &[&str] = &["", "0.0.0.0", "::", "0:0:0:0:0:0:0:0"];

/// Project summary returned by `GET /v2/projects`
#[derive(Debug, Clone, Deserialize)]
pub struct Gns3Project {
    pub project_id: String,
    pub name: String,
    #[serde(default)]
    pub status: String,
}

/// Node summary returned by `GET /v2/projects/{id}/nodes`
#[derive(Debug, Clone, Deserialize)]
pub struct Gns3Node {
    pub name: String,
    #[serde(default)]
    pub node_type: String,
    #[serde(default)]
    pub console: Option<u16>,
    #[serde(default)]
    pub console_host: Option<String>,
    #[serde(default)]
    pub console_type: Option<String>,
}

/// Thin REST client for the GNS3 server
pub struct Gns3Client {
    client: Client,
    base_url: Url,
    username: Option<String>,
    password: Option<SecretString>,
}

impl Gns3Client {
    /// Create a new client for `base_url`
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, ExecError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| {
                ExecError::ConfigError(format!("Invalid GNS3 server URL '{}': {}", base_url, e))
            })?;

        Ok(Self {
            client,
            base_url,
            username: None,
            password: None,
        })
    }

    /// Use HTTP basic auth on every request
    pub fn with_basic_auth(mut self, username: String, password: Option<SecretString>) -> Self {
        self.username = Some(username);
        self.password = password;
        self
    }

    /// Host part of the server URL
    pub fn server_host(&self) -> Option<&str> {
        self.base_url.host_str()
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ExecError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| ExecError::TopologyError(format!("Invalid API path '{}': {}", path, e)))?;
        debug!("GET {}", url);

        let mut request = self.client.get(url);
        if let Some(username) = &self.username {
            request = request.basic_auth(
                username,
                self.password.as_ref().map(|p| p.expose_secret().to_string()),
            );
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("GNS3 GET {} failed: {} - {}", path, status, body);
            return Err(ExecError::TopologyError(format!("{}: {}", status, body)));
        }

        let body = response.json().await?;
        Ok(body)
    }

    /// List all projects
    pub async fn projects(&self) -> Result<Vec<Gns3Project>, ExecError> {
        self.get("/v2/projects").await
    }

    /// List the nodes of a project
    pub async fn nodes(&self, project_id: &str) -> Result<Vec<Gns3Node>, ExecError> {
        self.get(&format!("/v2/projects/{}/nodes", project_id)).await
    }
}

/// Resolver reading the currently opened (or configured) GNS3 project
pub struct Gns3TopologyResolver {
    client: Gns3Client,
    project_id: Option<String>,
    console_host: Option<String>,
    node_type_profiles: BTreeMap<String, String>,
    default_profile_group: String,
}

impl Gns3TopologyResolver {
    /// Build a resolver from settings; `topology.server_url` must be set
    pub fn from_settings(settings: &Settings) -> Result<Self, ExecError> {
        let topology = &settings.topology;
        let server_url = topology.server_url.as_deref().ok_or_else(|| {
            ExecError::ConfigError("topology.server_url is not configured".to_string())
        })?;

        let mut client =
            Gns3Client::new(server_url, Duration::from_secs(topology.request_timeout_secs))?;
        if let Some(username) = &topology.username {
            client = client.with_basic_auth(username.clone(), topology.password.clone());
        }

        Ok(Self {
            client,
            project_id: topology.project_id.clone(),
            console_host: topology.console_host.clone(),
            node_type_profiles: settings.node_type_profiles.clone(),
            default_profile_group: settings.default_profile_group.clone(),
        })
    }

    async fn current_project_id(&self) -> Result<Option<String>, ExecError> {
        if let Some(project_id) = &self.project_id {
            return Ok(Some(project_id.clone()));
        }

        let projects = self.client.projects().await?;
        if projects.is_empty() {
            warn!("No projects found on GNS3 server");
            return Ok(None);
        }

        match projects.into_iter().find(|p| p.status == "opened") {
            Some(project) => {
                info!("Using opened project '{}' ({})", project.name, project.project_id);
                Ok(Some(project.project_id))
            }
            None => {
                warn!("No opened project found on GNS3 server");
                Ok(None)
            }
        }
    }

    /// Map project nodes to endpoints for the requested names
    pub fn endpoints_from_nodes(
        &self,
        nodes: &[Gns3Node],
        device_names: &BTreeSet<String>,
    ) -> HashMap<String, DeviceEndpoint> {
        let mut endpoints = HashMap::new();

        for node in nodes.iter().filter(|n| device_names.contains(&n.name)) {
            let port = match node.console {
                Some(port) if port != 0 => port,
                _ => {
                    warn!("Device '{}' has no console port", node.name);
                    continue;
                }
            };

            let Some(host) = self.console_host_for(node) else {
                warn!("No console host known for device '{}'", node.name);
                continue;
            };

            let profile_group = self
                .node_type_profiles
                .get(&node.node_type)
                .cloned()
                .unwrap_or_else(|| self.default_profile_group.clone());

            endpoints.insert(
                node.name.clone(),
                DeviceEndpoint {
                    device_name: node.name.clone(),
                    host,
                    port,
                    profile_group,
                },
            );
        }

        endpoints
    }

    fn console_host_for(&self, node: &Gns3Node) -> Option<String> {
        if let Some(host) = &self.console_host {
            return Some(host.clone());
        }
        match node.console_host.as_deref() {
            Some(host) if !WILDCARD_HOSTS.contains(&host) => Some(host.to_string()),
            _ => self.client.server_host().map(str::to_string),
        }
    }
}

#[async_trait]
impl TopologyResolver for Gns3TopologyResolver {
    async fn resolve(
        &self,
        device_names: &BTreeSet<String>,
    ) -> Result<HashMap<String, DeviceEndpoint>, ExecError> {
        let Some(project_id) = self.current_project_id().await? else {
            return Ok(HashMap::new());
        };

        let nodes = self.client.nodes(&project_id).await?;
        let endpoints = self.endpoints_from_nodes(&nodes, device_names);

        info!(
            "Resolved {}/{} devices in project {}",
            endpoints.len(),
            device_names.len(),
            project_id
        );
        Ok(endpoints)
    }
}
