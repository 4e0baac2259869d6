//! Execution dispatcher
//!
//! Every resolved command group gets its own tokio task. Results land in a
//! slot addressed by the group's batch index, so output order never depends
//! on completion order. A failing, slow or panicking worker only affects its
//! own slot.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::models::batch::{CommandGroup, DeviceEndpoint};
use crate::models::result::SessionOutcome;
use crate::session::driver::SessionRunner;

/// How many workers may run at once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyPolicy {
    /// One worker per group, all started immediately
    Unbounded,

    /// At most `n` sessions in flight
    Bounded(usize),
}

/// Per-batch dispatch options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    pub policy: ConcurrencyPolicy,

    /// Abort workers still running after this long
    pub deadline: Option<Duration>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            policy: ConcurrencyPolicy::Bounded(10),
            deadline: None,
        }
    }
}

/// Error text for a group whose device did not resolve
pub fn not_found_message(device_name: &str) -> String {
    format!(
        "Device '{}' not found in topology or missing management port",
        device_name
    )
}

/// Fans command groups out to a [`SessionRunner`]
pub struct Dispatcher {
    runner: Arc<dyn SessionRunner>,
}

impl Dispatcher {
    pub fn new(runner: Arc<dyn SessionRunner>) -> Self {
        Self { runner }
    }

    /// Run every group and return one outcome per group, in input order
    pub async fn dispatch(
        &self,
        groups: &[CommandGroup],
        endpoints: &HashMap<String, DeviceEndpoint>,
        options: &DispatchOptions,
    ) -> Vec<SessionOutcome> {
        let mut slots: Vec<Option<SessionOutcome>> = vec![None; groups.len()];
        let semaphore = match options.policy {
            ConcurrencyPolicy::Bounded(n) => Some(Arc::new(Semaphore::new(n.max(1)))),
            ConcurrencyPolicy::Unbounded => None,
        };

        debug!(
            "Dispatching {} groups with policy {:?}",
            groups.len(),
            options.policy
        );

        let mut handles: Vec<(usize, JoinHandle<SessionOutcome>)> =
            Vec::with_capacity(groups.len());

        for (index, group) in groups.iter().enumerate() {
            let Some(endpoint) = endpoints.get(&group.device_name) else {
                warn!(
                    "Device '{}' not found in topology or missing management port",
                    group.device_name
                );
                slots[index] = Some(SessionOutcome::failure(
                    &group.device_name,
                    not_found_message(&group.device_name),
                    Duration::ZERO,
                ));
                continue;
            };

            let runner = Arc::clone(&self.runner);
            let sem = semaphore.clone();
            let endpoint = endpoint.clone();
            let group = group.clone();
            let span = info_span!("device", name = %group.device_name, index);

            handles.push((
                index,
                tokio::spawn(
                    async move {
                        let _permit = match sem {
                            Some(sem) => sem.acquire_owned().await.ok(),
                            None => None,
                        };
                        runner.run(&endpoint, &group).await
                    }
                    .instrument(span),
                ),
            ));
        }

        let deadline = options.deadline.map(|d| (Instant::now() + d, d));
        let joined = join_all(
            handles
                .into_iter()
                .map(|(index, handle)| async move { (index, join_worker(handle, deadline).await) }),
        )
        .await;

        for (index, joined) in joined {
            let device = &groups[index].device_name;
            slots[index] = Some(match joined {
                Joined::Done(outcome) => outcome,
                Joined::Failed(e) => {
                    error!("Worker for device '{}' failed: {}", device, e);
                    SessionOutcome::failure(device, worker_failure_message(e), Duration::ZERO)
                }
                Joined::TimedOut(limit) => {
                    warn!("Device '{}' still running at batch deadline, aborted", device);
                    SessionOutcome::failure(
                        device,
                        format!("Execution timed out after {}s batch deadline", limit.as_secs()),
                        limit,
                    )
                }
            });
        }

        let outcomes: Vec<SessionOutcome> = slots
            .into_iter()
            .zip(groups)
            .map(|(slot, group)| {
                slot.unwrap_or_else(|| {
                    SessionOutcome::failure(
                        &group.device_name,
                        "No outcome recorded",
                        Duration::ZERO,
                    )
                })
            })
            .collect();

        info!(
            "Dispatch completed: {}/{} devices succeeded",
            outcomes.iter().filter(|o| o.succeeded()).count(),
            outcomes.len()
        );
        outcomes
    }
}

/// How a worker ended
enum Joined {
    Done(SessionOutcome),
    Failed(JoinError),
    TimedOut(Duration),
}

async fn join_worker(
    mut handle: JoinHandle<SessionOutcome>,
    deadline: Option<(Instant, Duration)>,
) -> Joined {
    let joined = match deadline {
        Some((at, limit)) => match tokio::time::timeout_at(at, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                handle.abort();
                return Joined::TimedOut(limit);
            }
        },
        None => handle.await,
    };

    match joined {
        Ok(outcome) => Joined::Done(outcome),
        Err(e) => Joined::Failed(e),
    }
}

fn worker_failure_message(err: JoinError) -> String {
    if err.is_panic() {
        format!("Worker panicked: {}", panic_text(err.into_panic()))
    } else {
        format!("Worker cancelled: {}", err)
    }
}

fn panic_text(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
