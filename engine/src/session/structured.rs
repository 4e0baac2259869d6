//! Structured-request session style
//!
//! Used for full network-OS devices. Display commands are captured one by
//! one; configuration commands go out as a single transaction that is
//! retried once when it fails with the profile's transient signature.

use std::time::Instant;

use tracing::{error, info, warn};

use crate::errors::ExecError;
use crate::models::batch::{BatchKind, CommandGroup, DeviceEndpoint};
use crate::models::result::{CommandOutputs, SessionOutcome, SessionOutput};
use crate::session::cli::{CliSession, CliSessionFactory};
use crate::storage::settings::Profile;

/// Result text for a configure group without commands.
pub const NO_CONFIG_COMMANDS: &str = "No configuration commands to execute";

/// Configuration attempts per device: the first try plus one retry.
const MAX_CONFIG_ATTEMPTS: u32 = 2;

/// Drive one structured-request session to completion
pub async fn run(
    factory: &dyn CliSessionFactory,
    endpoint: &DeviceEndpoint,
    profile: &Profile,
    group: &CommandGroup,
) -> SessionOutcome {
    match group.kind {
        BatchKind::Display => run_display(factory, endpoint, profile, &group.commands).await,
        BatchKind::Configure => run_configure(factory, endpoint, profile, &group.commands).await,
    }
}

async fn run_display(
    factory: &dyn CliSessionFactory,
    endpoint: &DeviceEndpoint,
    profile: &Profile,
    commands: &[String],
) -> SessionOutcome {
    let started = Instant::now();
    let device = endpoint.device_name.as_str();

    let mut session = match factory.open(endpoint, profile).await {
        Ok(session) => session,
        Err(e) => {
            error!("Unable to open session on device '{}': {}", device, e);
            return SessionOutcome::failure(device, e.to_string(), started.elapsed());
        }
    };

    let mut outputs = CommandOutputs::new();
    let mut remaining = commands.iter();
    while let Some(command) = remaining.next() {
        match session.send_command(command).await {
            Ok(output) => outputs.push(command.as_str(), output),
            Err(e) => {
                warn!("Command '{}' failed on device '{}': {}", command, device, e);
                outputs.push(command.as_str(), command_error(command, &e));

                // Late output of the failed command must not land on the next one
                if let Err(lost) = session.resync().await {
                    error!("Session on device '{}' could not be resynced: {}", device, lost);
                    for skipped in remaining.by_ref() {
                        outputs.push(skipped.as_str(), command_error(skipped, &lost));
                    }
                }
            }
        }
    }

    close_session(session.as_mut(), device).await;

    info!("Executed {} display commands on device '{}'", commands.len(), device);
    SessionOutcome::success(device, SessionOutput::PerCommand(outputs), started.elapsed())
}

async fn run_configure(
    factory: &dyn CliSessionFactory,
    endpoint: &DeviceEndpoint,
    profile: &Profile,
    commands: &[String],
) -> SessionOutcome {
    let started = Instant::now();
    let device = endpoint.device_name.as_str();

    if commands.is_empty() {
        return SessionOutcome::success(
            device,
            SessionOutput::Combined(NO_CONFIG_COMMANDS.to_string()),
            started.elapsed(),
        );
    }

    let mut attempt = 1;
    loop {
        match config_transaction(factory, endpoint, profile, commands).await {
            Ok(output) => {
                info!(
                    "Applied {} configuration commands on device '{}' (attempt {})",
                    commands.len(),
                    device,
                    attempt
                );
                return SessionOutcome::success(
                    device,
                    SessionOutput::Combined(output),
                    started.elapsed(),
                );
            }
            Err(e) => {
                let detail = e.to_string();
                if attempt < MAX_CONFIG_ATTEMPTS && is_transient(&detail, profile) {
                    warn!(
                        "Transient configuration failure on device '{}', retrying once: {}",
                        device, detail
                    );
                    attempt += 1;
                    continue;
                }
                error!(
                    "Configuration failed on device '{}' after {} attempt(s): {}",
                    device, attempt, detail
                );
                return SessionOutcome::failure(
                    device,
                    format!("Configuration failed: {}", detail),
                    started.elapsed(),
                );
            }
        }
    }
}

/// One attempt: fresh session, full command list, session closed afterwards
async fn config_transaction(
    factory: &dyn CliSessionFactory,
    endpoint: &DeviceEndpoint,
    profile: &Profile,
    commands: &[String],
) -> Result<String, ExecError> {
    let mut session = factory.open(endpoint, profile).await?;
    let result = session.send_config_set(commands).await;
    close_session(session.as_mut(), &endpoint.device_name).await;
    result
}

fn command_error(command: &str, e: &ExecError) -> String {
    format!("Error executing command '{}': {}", command, e)
}

fn is_transient(detail: &str, profile: &Profile) -> bool {
    let signature = profile.transient_failure_signature.as_str();
    !signature.is_empty() && detail.contains(signature)
}

async fn close_session(session: &mut dyn CliSession, device: &str) {
    if let Err(e) = session.close().await {
        warn!("Error closing session on device '{}': {}", device, e);
    }
}
