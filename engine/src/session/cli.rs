//! Structured CLI session
//!
//! A [`CliSession`] hides login, prompt detection and configuration mode
//! behind command-level calls. The telnet implementation targets IOS-like
//! consoles.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

use crate::errors::ExecError;
use crate::models::batch::DeviceEndpoint;
use crate::session::transport::{Connector, Transport};
use crate::storage::settings::Profile;

/// Lines that mean the device rejected a configuration command.
const CONFIG_ERROR_MARKERS: &[&str] = &[
    "% Invalid input",
    "% Incomplete command",
    "% Ambiguous command",
    "% Unknown command",
];

const LOGIN_PATTERN: &str = r"(?i)(username|login)\s*:\s*$";
const PASSWORD_PATTERN: &str = r"(?i)password\s*:\s*$";
const CONFIG_PROMPT_PATTERN: &str = r"(?:^|[\r\n])[\w\-.]+\(config[^)]*\)#\s*$";

/// Most prompts seen before giving up on login.
const MAX_LOGIN_STEPS: usize = 4;

/// Quiet period that ends a resync.
const RESYNC_SETTLE: Duration = Duration::from_millis(200);

/// Most settle rounds spent discarding late output during a resync.
const MAX_RESYNC_ROUNDS: usize = 10;

/// Command-level session with a network-OS device
#[async_trait]
pub trait CliSession: Send {
    /// Run one display command and return its output
    async fn send_command(&mut self, command: &str) -> Result<String, ExecError>;

    /// Apply commands as one configuration transaction, entering and leaving
    /// configuration mode
    async fn send_config_set(&mut self, commands: &[String]) -> Result<String, ExecError>;

    /// Bring the session back to an idle prompt after a failed command,
    /// discarding output that arrives late
    async fn resync(&mut self) -> Result<(), ExecError>;

    async fn close(&mut self) -> Result<(), ExecError>;
}

/// Opens logged-in CLI sessions
#[async_trait]
pub trait CliSessionFactory: Send + Sync {
    async fn open(
        &self,
        endpoint: &DeviceEndpoint,
        profile: &Profile,
    ) -> Result<Box<dyn CliSession>, ExecError>;
}

/// Factory for [`TelnetCliSession`]s over a [`Connector`]
pub struct TelnetCliSessionFactory {
    connector: Arc<dyn Connector>,
}

impl TelnetCliSessionFactory {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl CliSessionFactory for TelnetCliSessionFactory {
    async fn open(
        &self,
        endpoint: &DeviceEndpoint,
        profile: &Profile,
    ) -> Result<Box<dyn CliSession>, ExecError> {
        let any_prompt = Regex::new(profile.prompt_pattern())?;
        let transport = self.connector.connect(endpoint, profile.connect_timeout()).await?;

        let mut session = TelnetCliSession {
            transport,
            prompt: any_prompt.clone(),
            any_prompt,
            config_prompt: Regex::new(CONFIG_PROMPT_PATTERN)?,
            timeout: profile.prompt_timeout(),
        };

        match session.prepare(profile, profile.connect_timeout()).await {
            Ok(()) => {
                info!(
                    "Session ready on device '{}' ({}), prompt '{}'",
                    endpoint.device_name,
                    profile.platform,
                    session.prompt.as_str()
                );
                Ok(Box::new(session))
            }
            Err(e) => {
                if let Err(close_err) = session.close().await {
                    warn!("Error closing connection to '{}': {}", endpoint.device_name, close_err);
                }
                Err(e)
            }
        }
    }
}

/// CLI session over a console transport
pub struct TelnetCliSession {
    transport: Box<dyn Transport>,
    /// Prompt of this device, learned after login
    prompt: Regex,
    /// Profile-level prompt pattern, used until the device prompt is known
    any_prompt: Regex,
    config_prompt: Regex,
    timeout: Duration,
}

impl TelnetCliSession {
    /// Log in if asked to, reach a prompt, and disable paging
    async fn prepare(
        &mut self,
        profile: &Profile,
        login_timeout: Duration,
    ) -> Result<(), ExecError> {
        let login = Regex::new(LOGIN_PATTERN)?;
        let password = Regex::new(PASSWORD_PATTERN)?;
        let any = Regex::new(&format!(
            "{}|{}|{}",
            LOGIN_PATTERN,
            PASSWORD_PATTERN,
            self.any_prompt.as_str()
        ))?;

        self.transport.write_all(b"\n").await?;

        let mut last = String::new();
        for _ in 0..MAX_LOGIN_STEPS {
            last = self.transport.read_until(&any, login_timeout).await?;
            if login.is_match(&last) {
                let username = profile.username.as_deref().ok_or_else(|| {
                    ExecError::ConfigError(
                        "device asked for a username but none is configured".to_string(),
                    )
                })?;
                self.transport.write_all(format!("{}\n", username).as_bytes()).await?;
            } else if password.is_match(&last) {
                let secret = profile.password.as_ref().ok_or_else(|| {
                    ExecError::ConfigError(
                        "device asked for a password but none is configured".to_string(),
                    )
                })?;
                self.transport
                    .write_all(format!("{}\n", secret.expose_secret()).as_bytes())
                    .await?;
            } else {
                break;
            }
        }

        if !self.any_prompt.is_match(&last) {
            return Err(ExecError::PatternNotDetected(
                "login did not reach a device prompt".to_string(),
            ));
        }

        if last.trim_end().ends_with('>') {
            if let Some(secret) = &profile.enable_secret {
                self.transport.write_all(b"enable\n").await?;
                self.transport.read_until(&password, self.timeout).await?;
                self.transport
                    .write_all(format!("{}\n", secret.expose_secret()).as_bytes())
                    .await?;
                last = self.transport.read_until(&self.any_prompt, self.timeout).await?;
            }
        }

        self.learn_prompt(&last)?;
        self.exchange("terminal length 0").await?;
        Ok(())
    }

    /// Narrow prompt matching to the hostname shown in `text`
    fn learn_prompt(&mut self, text: &str) -> Result<(), ExecError> {
        if let Some(pattern) = device_prompt_pattern(text) {
            self.prompt = Regex::new(&pattern)?;
        }
        Ok(())
    }

    /// Write one line and read through the next prompt
    async fn exchange(&mut self, line: &str) -> Result<String, ExecError> {
        self.transport.write_all(format!("{}\n", line).as_bytes()).await?;
        self.transport.read_until(&self.prompt, self.timeout).await
    }

    /// Configuration commands may rename the device, so match any config prompt
    async fn exchange_config(&mut self, line: &str) -> Result<String, ExecError> {
        self.transport.write_all(format!("{}\n", line).as_bytes()).await?;
        self.transport.read_until(&self.config_prompt, self.timeout).await
    }

    /// Leave configuration mode and relearn the prompt
    async fn leave_config(&mut self) -> Result<String, ExecError> {
        self.transport.write_all(b"end\n").await?;
        let output = self.transport.read_until(&self.any_prompt, self.timeout).await?;
        self.learn_prompt(&output)?;
        Ok(output)
    }
}

/// Prompt pattern for the hostname on the last line of `text`
///
/// `R-1#` yields a pattern matching `R-1#`, `R-1>` and `R-1(config-if)#` at
/// the start of a line and the end of the buffer.
pub fn device_prompt_pattern(text: &str) -> Option<String> {
    let last = text.lines().map(str::trim).filter(|l| !l.is_empty()).last()?;
    let base = last.strip_suffix(['#', '>'])?;
    let host = match base.find('(') {
        Some(pos) => &base[..pos],
        None => base,
    };
    if host.is_empty() {
        return None;
    }
    Some(format!(
        r"(?:^|[\r\n]){}(?:\([\w.\-]*\))?[>#]\s*$",
        regex::escape(host)
    ))
}

#[async_trait]
impl CliSession for TelnetCliSession {
    async fn send_command(&mut self, command: &str) -> Result<String, ExecError> {
        debug!("send_command: {}", command);
        let raw = self.exchange(command).await?;
        Ok(strip_echo_and_prompt(&raw, command))
    }

    async fn resync(&mut self) -> Result<(), ExecError> {
        // The bare line gets its own prompt; output of the failed command may come first
        self.transport.write_all(b"\n").await?;
        let mut discarded = self.transport.read_until(&self.prompt, self.timeout).await?;

        for _ in 0..MAX_RESYNC_ROUNDS {
            tokio::time::sleep(RESYNC_SETTLE).await;
            let late = self.transport.drain().await?;
            if late.is_empty() {
                debug!("Resynced session, discarded {} chars", discarded.len());
                return Ok(());
            }
            discarded.push_str(&late);
        }

        Err(ExecError::PatternNotDetected(
            "idle prompt after resync, device keeps sending output".to_string(),
        ))
    }

    async fn send_config_set(&mut self, commands: &[String]) -> Result<String, ExecError> {
        let mut transcript = self.exchange("configure terminal").await?;
        if !self.config_prompt.is_match(&transcript) {
            return Err(ExecError::PatternNotDetected(
                "configuration mode prompt after 'configure terminal'".to_string(),
            ));
        }

        let mut result = Ok(());
        for command in commands {
            let output = match self.exchange_config(command).await {
                Ok(output) => output,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            };
            if let Some(marker) = CONFIG_ERROR_MARKERS.iter().find(|m| output.contains(*m)) {
                transcript.push_str(&output);
                result = Err(ExecError::CommandError(format!(
                    "'{}' rejected by device ({})",
                    command,
                    marker.trim_start_matches("% ")
                )));
                break;
            }
            transcript.push_str(&output);
        }

        // Leave configuration mode even when a command failed
        let exit = self.leave_config().await;
        result?;
        transcript.push_str(&exit?);
        Ok(transcript)
    }

    async fn close(&mut self) -> Result<(), ExecError> {
        self.transport.close().await
    }
}

/// Drop the echoed command line and the trailing prompt line
pub fn strip_echo_and_prompt(raw: &str, command: &str) -> String {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "");
    let mut lines: Vec<&str> = normalized.lines().collect();

    if lines.first().is_some_and(|first| first.contains(command.trim())) {
        lines.remove(0);
    }
    if !lines.is_empty() {
        lines.pop();
    }

    lines.join("\n").trim_end().to_string()
}
