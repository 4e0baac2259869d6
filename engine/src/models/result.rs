//! Execution outcome and result models

use std::time::Duration;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Output captured from one device session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SessionOutput {
    /// All command output concatenated in execution order
    Combined(String),

    /// Output captured per command, in execution order
    PerCommand(CommandOutputs),
}

impl SessionOutput {
    pub fn as_combined(&self) -> Option<&str> {
        match self {
            SessionOutput::Combined(s) => Some(s),
            SessionOutput::PerCommand(_) => None,
        }
    }

    pub fn as_per_command(&self) -> Option<&CommandOutputs> {
        match self {
            SessionOutput::Combined(_) => None,
            SessionOutput::PerCommand(outputs) => Some(outputs),
        }
    }
}

/// Ordered command → output pairs
///
/// Serialised as a JSON object keyed by command. A command repeated within a
/// group keeps every occurrence in memory; in JSON the last one wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutputs(Vec<(String, String)>);

impl CommandOutputs {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, command: impl Into<String>, output: impl Into<String>) {
        self.0.push((command.into(), output.into()));
    }

    /// Output of the first occurrence of `command`
    pub fn get(&self, command: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(cmd, _)| cmd == command)
            .map(|(_, out)| out.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for CommandOutputs {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (command, output) in &self.0 {
            map.serialize_entry(command, output)?;
        }
        map.end()
    }
}

/// Internal result of driving one device session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub device_name: String,

    /// Captured output, or the failure detail
    pub result: Result<SessionOutput, String>,

    /// Wall-clock time spent on the session
    pub elapsed: Duration,
}

impl SessionOutcome {
    pub fn success(
        device_name: impl Into<String>,
        output: SessionOutput,
        elapsed: Duration,
    ) -> Self {
        Self {
            device_name: device_name.into(),
            result: Ok(output),
            elapsed,
        }
    }

    pub fn failure(
        device_name: impl Into<String>,
        detail: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            device_name: device_name.into(),
            result: Err(detail.into()),
            elapsed,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.result.as_ref().err().map(String::as_str)
    }
}

/// Public status of a device result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Error,
}

/// Final per-device record returned to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub device_name: String,

    pub status: ResultStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<SessionOutput>,

    /// Echo of the commands requested for this device
    pub commands: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub elapsed_ms: u64,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }
}
