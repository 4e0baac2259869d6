//! Batch input models

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What a batch does to its devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchKind {
    /// Read-only display commands, one response captured per command
    Display,

    /// Configuration commands applied as a single transaction
    Configure,
}

impl BatchKind {
    /// Name of the JSON field that carries the command list for this kind
    pub fn commands_field(&self) -> &'static str {
        match self {
            BatchKind::Display => "commands",
            BatchKind::Configure => "config_commands",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchKind::Display => "display",
            BatchKind::Configure => "configure",
        }
    }
}

impl fmt::Display for BatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "display" | "show" => Ok(BatchKind::Display),
            "configure" | "config" => Ok(BatchKind::Configure),
            _ => Err(format!("Invalid batch kind: {}", s)),
        }
    }
}

/// One entry of a command batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandGroup {
    /// Device name as it appears in the topology
    pub device_name: String,

    /// Ordered commands, possibly empty
    pub commands: Vec<String>,

    /// Batch kind this group was validated for
    pub kind: BatchKind,
}

impl CommandGroup {
    pub fn new(device_name: impl Into<String>, commands: Vec<String>, kind: BatchKind) -> Self {
        Self {
            device_name: device_name.into(),
            commands,
            kind,
        }
    }
}

/// Resolved connection target for a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEndpoint {
    /// Device name
    pub device_name: String,

    /// Host carrying the device console
    pub host: String,

    /// Management (console) port
    pub port: u16,

    /// Profile group selecting session style and credentials
    pub profile_group: String,
}

/// Structured validation failure for a raw batch
///
/// Serialised as `{"error": "..."}` so that callers receive the same array
/// shape whether validation fails or execution runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// Human readable description
    pub error: String,

    /// Index of the offending element, when the issue is element-scoped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,

    /// Offending field name, when the issue is field-scoped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ValidationIssue {
    /// Issue about the batch as a whole
    pub fn batch(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            index: None,
            field: None,
        }
    }

    /// Issue about one element of the batch
    pub fn element(index: usize, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            index: Some(index),
            field: None,
        }
    }

    /// Issue about one field of one element
    pub fn field(index: usize, field: &str, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            index: Some(index),
            field: Some(field.to_string()),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.error)
    }
}
