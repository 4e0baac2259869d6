//! Interactive-prompt session style
//!
//! Used for lightweight virtual hosts (VPCS). The console is woken up with
//! empty lines, then each command is written, given a fixed settle delay,
//! and synchronised on the shell prompt.

use std::time::Instant;

use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::errors::ExecError;
use crate::models::batch::DeviceEndpoint;
use crate::models::result::{SessionOutcome, SessionOutput};
use crate::session::transport::{Connector, Transport};
use crate::storage::settings::Profile;
use crate::utils::truncate_for_log;

/// Drive one interactive-prompt session to completion
///
/// The transport is closed exactly once on every path after a successful
/// connect. Connect failures are not retried.
pub async fn run(
    connector: &dyn Connector,
    endpoint: &DeviceEndpoint,
    profile: &Profile,
    commands: &[String],
) -> SessionOutcome {
    let started = Instant::now();
    let device = endpoint.device_name.as_str();

    let prompt = match Regex::new(profile.prompt_pattern()) {
        Ok(prompt) => prompt,
        Err(e) => {
            let detail = ExecError::from(e).to_string();
            return SessionOutcome::failure(device, detail, started.elapsed());
        }
    };

    info!(
        "Connecting to device '{}' at {}:{} ({} commands)",
        device,
        endpoint.host,
        endpoint.port,
        commands.len()
    );

    let mut transport = match connector.connect(endpoint, profile.connect_timeout()).await {
        Ok(transport) => transport,
        Err(e) => {
            error!("Connection to device '{}' failed: {}", device, e);
            return SessionOutcome::failure(device, e.to_string(), started.elapsed());
        }
    };

    let result = drive(transport.as_mut(), &prompt, profile, device, commands).await;

    if let Err(e) = transport.close().await {
        warn!("Error closing connection to device '{}': {}", device, e);
    }
    debug!("Connection closed for device '{}'", device);

    match result {
        Ok(output) => {
            info!(
                "Successfully executed all {} commands on device '{}'",
                commands.len(),
                device
            );
            SessionOutcome::success(device, SessionOutput::Combined(output), started.elapsed())
        }
        Err(e) => {
            error!("Error executing commands on device '{}': {}", device, e);
            SessionOutcome::failure(device, e.to_string(), started.elapsed())
        }
    }
}

async fn drive(
    transport: &mut dyn Transport,
    prompt: &Regex,
    profile: &Profile,
    device: &str,
    commands: &[String],
) -> Result<String, ExecError> {
    handshake(transport, prompt, profile).await?;
    debug!("Connection initialized for device '{}'", device);

    let mut combined = String::new();
    for (i, command) in commands.iter().enumerate() {
        info!(
            "Executing command {}/{} on device '{}': {}",
            i + 1,
            commands.len(),
            device,
            command
        );

        if !command.is_ascii() {
            return Err(ExecError::CommandError(format!(
                "command '{}' contains non-ASCII characters",
                command
            )));
        }

        transport.write_all(format!("{}\n", command).as_bytes()).await?;
        tokio::time::sleep(profile.command_settle()).await;

        let mut output = transport.read_until(prompt, profile.prompt_timeout()).await?;
        output.push_str(&transport.drain().await?);

        debug!(
            "Command '{}' executed on device '{}': {}",
            command,
            device,
            truncate_for_log(&output, 200)
        );
        combined.push_str(&output);
    }

    Ok(combined)
}

/// Wake the console up and discard the banner and stale prompts
async fn handshake(
    transport: &mut dyn Transport,
    prompt: &Regex,
    profile: &Profile,
) -> Result<(), ExecError> {
    for _ in 0..profile.init_newlines {
        transport.write_all(b"\n").await?;
        tokio::time::sleep(profile.init_settle()).await;
    }
    transport.read_until(prompt, profile.prompt_timeout()).await?;
    transport.drain().await?;
    Ok(())
}
