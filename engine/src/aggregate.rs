//! Result aggregation

use tracing::debug;

use crate::models::batch::CommandGroup;
use crate::models::result::{ExecutionResult, ResultStatus, SessionOutcome};

/// Turn dispatcher outcomes into the public result list
///
/// Walks groups and outcomes by index. The result has exactly one entry per
/// group, in group order; a missing outcome becomes an error entry.
pub fn aggregate(groups: &[CommandGroup], outcomes: Vec<SessionOutcome>) -> Vec<ExecutionResult> {
    let mut outcomes = outcomes.into_iter();

    let results: Vec<ExecutionResult> = groups
        .iter()
        .map(|group| match outcomes.next() {
            Some(outcome) => to_result(group, outcome),
            None => ExecutionResult {
                device_name: group.device_name.clone(),
                status: ResultStatus::Error,
                output: None,
                commands: group.commands.clone(),
                error: Some("No outcome recorded for device".to_string()),
                elapsed_ms: 0,
            },
        })
        .collect();

    debug!(
        "Aggregated {} results ({} errors)",
        results.len(),
        results.iter().filter(|r| !r.is_success()).count()
    );
    results
}

fn to_result(group: &CommandGroup, outcome: SessionOutcome) -> ExecutionResult {
    let elapsed_ms = outcome.elapsed.as_millis() as u64;
    match outcome.result {
        Ok(output) => ExecutionResult {
            device_name: group.device_name.clone(),
            status: ResultStatus::Success,
            output: Some(output),
            commands: group.commands.clone(),
            error: None,
            elapsed_ms,
        },
        Err(detail) => ExecutionResult {
            device_name: group.device_name.clone(),
            status: ResultStatus::Error,
            output: None,
            commands: group.commands.clone(),
            error: Some(detail),
            elapsed_ms,
        },
    }
}
