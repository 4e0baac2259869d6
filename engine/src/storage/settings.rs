//! Settings file management

use std::collections::BTreeMap;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ExecError;
use crate::filesys::file::File;
use crate::logs::LogLevel;
use crate::models::batch::DeviceEndpoint;

/// Profile group used for full network-OS devices.
pub const CISCO_IOSV_TELNET: &str = "cisco_IOSv_telnet";

/// Profile group used for lightweight virtual PCs.
pub const VPCS_TELNET: &str = "vpcs_telnet";

/// Failure text that marks a configuration transaction as worth one retry.
pub const DEFAULT_TRANSIENT_SIGNATURE: &str = "Pattern not detected";

/// Engine settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Topology service configuration
    #[serde(default)]
    pub topology: TopologySettings,

    /// Session profiles keyed by profile group
    #[serde(default = "default_profiles")]
    pub profiles: BTreeMap<String, Profile>,

    /// GNS3 node type → profile group
    #[serde(default = "default_node_type_profiles")]
    pub node_type_profiles: BTreeMap<String, String>,

    /// Profile group for node types not listed above
    #[serde(default = "default_profile_group")]
    pub default_profile_group: String,

    /// Dispatcher configuration
    #[serde(default)]
    pub dispatch: DispatchSettings,

    /// Static endpoints, used when no topology server is configured
    #[serde(default)]
    pub inventory: Vec<DeviceEndpoint>,
}

fn default_profiles() -> BTreeMap<String, Profile> {
    let mut profiles = BTreeMap::new();
    profiles.insert(CISCO_IOSV_TELNET.to_string(), Profile::structured("cisco_ios"));
    profiles.insert(VPCS_TELNET.to_string(), Profile::interactive("vpcs"));
    profiles
}

fn default_node_type_profiles() -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    map.insert("vpcs".to_string(), VPCS_TELNET.to_string());
    map
}

fn default_profile_group() -> String {
    CISCO_IOSV_TELNET.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            topology: TopologySettings::default(),
            profiles: default_profiles(),
            node_type_profiles: default_node_type_profiles(),
            default_profile_group: default_profile_group(),
            dispatch: DispatchSettings::default(),
            inventory: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file, falling back to defaults when absent
    pub async fn load(file: &File) -> Result<Self, ExecError> {
        let settings = if file.exists().await {
            info!("Loading settings from {}", file.path().display());
            file.read_json::<Settings>().await?
        } else {
            debug!(
                "Settings file {} not found, using defaults",
                file.path().display()
            );
            Settings::default()
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `GNS3_SERVER_*` overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply `GNS3_SERVER_*` overrides from an arbitrary lookup
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("GNS3_SERVER_URL") {
            self.topology.server_url = Some(url);
        }
        if let Some(host) = lookup("GNS3_SERVER_HOST") {
            self.topology.console_host = Some(host);
        }
        if let Some(username) = lookup("GNS3_SERVER_USERNAME") {
            self.topology.username = Some(username);
        }
        if let Some(password) = lookup("GNS3_SERVER_PASSWORD") {
            self.topology.password = Some(SecretString::from(password));
        }
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<(), ExecError> {
        if self.dispatch.pool_size == 0 {
            return Err(ExecError::ConfigError(
                "dispatch.pool_size must be greater than zero".to_string(),
            ));
        }
        if !self.profiles.contains_key(&self.default_profile_group) {
            return Err(ExecError::ConfigError(format!(
                "default profile group '{}' is not defined",
                self.default_profile_group
            )));
        }
        for (node_type, group) in &self.node_type_profiles {
            if !self.profiles.contains_key(group) {
                return Err(ExecError::ConfigError(format!(
                    "node type '{}' maps to undefined profile group '{}'",
                    node_type, group
                )));
            }
        }
        for profile in self.profiles.values() {
            if let Some(pattern) = &profile.prompt_pattern {
                regex::Regex::new(pattern)?;
            }
        }
        Ok(())
    }

    /// Profile group for a GNS3 node type
    pub fn profile_group_for(&self, node_type: &str) -> &str {
        self.node_type_profiles
            .get(node_type)
            .map(String::as_str)
            .unwrap_or(&self.default_profile_group)
    }

    /// Look up a profile by group
    pub fn profile(&self, group: &str) -> Result<&Profile, ExecError> {
        self.profiles
            .get(group)
            .ok_or_else(|| ExecError::ConfigError(format!("Unknown profile group: {}", group)))
    }
}

/// Topology service settings
#[derive(Debug, Clone, Deserialize)]
pub struct TopologySettings {
    /// GNS3 server base URL; `None` selects the static inventory
    #[serde(default)]
    pub server_url: Option<String>,

    /// Host to dial for consoles, overriding the node's console host
    #[serde(default)]
    pub console_host: Option<String>,

    /// Basic auth username for the GNS3 API
    #[serde(default)]
    pub username: Option<String>,

    /// Basic auth password for the GNS3 API
    #[serde(default)]
    pub password: Option<SecretString>,

    /// Project to read; the opened project is used when unset
    #[serde(default)]
    pub project_id: Option<String>,

    /// HTTP request timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for TopologySettings {
    fn default() -> Self {
        Self {
            server_url: None,
            console_host: None,
            username: None,
            password: None,
            project_id: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// How a device session is driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStyle {
    /// Raw console with shell-like prompt, fixed settle delays
    InteractivePrompt,

    /// Login, prompt detection and config mode handled by a CLI session
    StructuredRequest,
}

/// Session profile for a group of devices
#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub style: SessionStyle,

    /// Platform hint, e.g. `cisco_ios`
    #[serde(default)]
    pub platform: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<SecretString>,

    /// Secret for privileged mode, when the platform asks for one
    #[serde(default)]
    pub enable_secret: Option<SecretString>,

    /// Connect timeout; style default when unset
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,

    /// Prompt regex; style default when unset
    #[serde(default)]
    pub prompt_pattern: Option<String>,

    /// Bound on every prompt wait
    #[serde(default = "default_prompt_timeout")]
    pub prompt_timeout_secs: u64,

    /// Empty lines sent to wake the console up
    #[serde(default = "default_init_newlines")]
    pub init_newlines: usize,

    /// Settle delay after each wake-up line
    #[serde(default = "default_init_settle")]
    pub init_settle_ms: u64,

    /// Settle delay after each command before waiting for the prompt
    #[serde(default = "default_command_settle")]
    pub command_settle_ms: u64,

    /// Substring marking a configuration failure as transient
    #[serde(default = "default_transient_signature")]
    pub transient_failure_signature: String,
}

fn default_prompt_timeout() -> u64 {
    30
}

fn default_init_newlines() -> usize {
    4
}

fn default_init_settle() -> u64 {
    500
}

fn default_command_settle() -> u64 {
    5000
}

fn default_transient_signature() -> String {
    DEFAULT_TRANSIENT_SIGNATURE.to_string()
}

impl Profile {
    fn with_style(style: SessionStyle, platform: &str) -> Self {
        Self {
            style,
            platform: platform.to_string(),
            username: None,
            password: None,
            enable_secret: None,
            connect_timeout_secs: None,
            prompt_pattern: None,
            prompt_timeout_secs: default_prompt_timeout(),
            init_newlines: default_init_newlines(),
            init_settle_ms: default_init_settle(),
            command_settle_ms: default_command_settle(),
            transient_failure_signature: default_transient_signature(),
        }
    }

    /// Interactive-prompt profile with reference timings
    pub fn interactive(platform: &str) -> Self {
        Self::with_style(SessionStyle::InteractivePrompt, platform)
    }

    /// Structured-request profile with reference timings
    pub fn structured(platform: &str) -> Self {
        Self::with_style(SessionStyle::StructuredRequest, platform)
    }

    pub fn connect_timeout(&self) -> Duration {
        let secs = self.connect_timeout_secs.unwrap_or(match self.style {
            SessionStyle::InteractivePrompt => 30,
            SessionStyle::StructuredRequest => 120,
        });
        Duration::from_secs(secs)
    }

    pub fn prompt_pattern(&self) -> &str {
        match (&self.prompt_pattern, self.style) {
            (Some(pattern), _) => pattern,
            (None, SessionStyle::InteractivePrompt) => r"PC\d+>",
            (None, SessionStyle::StructuredRequest) => r"[\w\-.()/:]+[>#]\s*$",
        }
    }

    pub fn prompt_timeout(&self) -> Duration {
        Duration::from_secs(self.prompt_timeout_secs)
    }

    pub fn init_settle(&self) -> Duration {
        Duration::from_millis(self.init_settle_ms)
    }

    pub fn command_settle(&self) -> Duration {
        Duration::from_millis(self.command_settle_ms)
    }
}

/// Dispatcher settings
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchSettings {
    /// Worker pool size for structured-request batches
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// One worker per group for interactive-prompt batches
    #[serde(default = "default_true")]
    pub interactive_unbounded: bool,

    /// Optional deadline after which still-running workers are aborted
    #[serde(default)]
    pub batch_deadline_secs: Option<u64>,
}

fn default_pool_size() -> usize {
    10
}

fn default_true() -> bool {
    true
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            interactive_unbounded: true,
            batch_deadline_secs: None,
        }
    }
}
