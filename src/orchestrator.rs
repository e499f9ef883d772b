// Fan-out executor: runs independent write units concurrently and reports one outcome per unit.
// A failing (or panicking) unit never cancels its siblings; there is no cross-unit rollback.

use crate::error::{ImportError, StorageError, UnitError};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::sync::watch;
use tokio::task::{self, JoinSet};
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Storage destination a unit writes to. Used to name failures in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    Identities,
    ServerDetails,
    Sessions,
    KickCounts,
    Nicknames,
    GeoInfo,
    ServerSamples,
    CommandUsage,
    WindowSummary,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Destination::Identities => "identities",
            Destination::ServerDetails => "server_details",
            Destination::Sessions => "sessions",
            Destination::KickCounts => "kick_counts",
            Destination::Nicknames => "nicknames",
            Destination::GeoInfo => "geo_info",
            Destination::ServerSamples => "server_samples",
            Destination::CommandUsage => "command_usage",
            Destination::WindowSummary => "window_summary",
        };
        f.write_str(name)
    }
}

/// One independent, individually-failable piece of work.
pub struct WorkItem {
    destination: Destination,
    task: BoxFuture<'static, Result<(), StorageError>>,
}

impl WorkItem {
    pub fn new<F>(destination: Destination, task: F) -> Self
    where
        F: Future<Output = Result<(), StorageError>> + Send + 'static,
    {
        Self {
            destination,
            task: Box::pin(task),
        }
    }

    pub fn destination(&self) -> Destination {
        self.destination
    }
}

#[derive(Debug)]
pub struct UnitFailure {
    pub destination: Destination,
    pub error: UnitError,
}

/// Per-unit outcomes of one fan-out.
#[derive(Debug, Default)]
pub struct FanOutReport {
    pub succeeded: Vec<Destination>,
    pub failed: Vec<UnitFailure>,
    /// Units still running when the wait cap was reached. They were left running.
    pub abandoned: Vec<Destination>,
}

impl FanOutReport {
    pub fn finished(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.abandoned.is_empty()
    }

    pub fn failed_destinations(&self) -> Vec<Destination> {
        self.failed.iter().map(|f| f.destination).collect()
    }

    /// Folds another fan-out's outcomes into this one.
    pub fn merge(&mut self, other: FanOutReport) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
        self.abandoned.extend(other.abandoned);
    }
}

/// Runs a list of [`WorkItem`]s on the runtime's worker pool and waits for all of them.
///
/// Two ways to stop waiting early:
/// - an interrupt signal (`watch` flips to `true`): in-flight units are still awaited to the
///   end, then [`ImportError::InterruptedWait`] is returned;
/// - the wait cap: remaining units are detached (not aborted) and reported as abandoned.
#[derive(Debug, Clone, Default)]
pub struct TaskOrchestrator {
    wait_cap: Option<Duration>,
    interrupt: Option<watch::Receiver<bool>>,
}

impl TaskOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_wait_cap(mut self, cap: Duration) -> Self {
        self.wait_cap = Some(cap);
        self
    }

    pub fn with_interrupt(mut self, interrupt: watch::Receiver<bool>) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    pub async fn run(
        &self,
        phase: &'static str,
        items: Vec<WorkItem>,
    ) -> Result<FanOutReport, ImportError> {
        let mut report = FanOutReport::default();
        if items.is_empty() {
            return Ok(report);
        }

        let started = Instant::now();
        let mut set = JoinSet::new();
        let mut pending: Vec<Option<Destination>> = Vec::with_capacity(items.len());
        let mut task_index: HashMap<task::Id, usize> = HashMap::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            pending.push(Some(item.destination));
            let handle = set.spawn(async move {
                let outcome = match AssertUnwindSafe(item.task).catch_unwind().await {
                    Ok(result) => result.map_err(UnitError::from),
                    Err(payload) => Err(UnitError::Panicked(panic_message(payload.as_ref()))),
                };
                (index, outcome)
            });
            task_index.insert(handle.id(), index);
        }

        let deadline = self.wait_cap.map(|cap| started + cap);
        let mut interrupt = self.interrupt.clone();
        let mut interrupted = false;

        loop {
            tokio::select! {
                joined = set.join_next() => {
                    let Some(joined) = joined else { break };
                    let (index, outcome) = match joined {
                        Ok(v) => v,
                        Err(e) => {
                            let Some(&index) = task_index.get(&e.id()) else {
                                warn!(phase, error = %e, "fan-out task of unknown unit did not complete");
                                continue;
                            };
                            (index, Err(UnitError::Lost(e.to_string())))
                        }
                    };
                    let Some(destination) = pending.get_mut(index).and_then(Option::take) else {
                        continue;
                    };
                    match outcome {
                        Ok(()) => {
                            debug!(phase, destination = %destination, "fan-out unit done");
                            report.succeeded.push(destination);
                        }
                        Err(error) => {
                            warn!(phase, destination = %destination, error = %error, "fan-out unit failed");
                            report.failed.push(UnitFailure { destination, error });
                        }
                    }
                }
                _ = cap_reached(deadline) => {
                    report.abandoned = pending.iter().flatten().copied().collect();
                    set.detach_all();
                    warn!(
                        phase,
                        abandoned = report.abandoned.len(),
                        "fan-out wait cap reached; remaining units left running"
                    );
                    return Err(ImportError::InterruptedWait(Box::new(report)));
                }
                _ = interrupt_signaled(&mut interrupt), if !interrupted => {
                    interrupted = true;
                    warn!(phase, "fan-out wait interrupted; letting in-flight units finish");
                }
            }
        }

        info!(
            phase,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fan-out complete"
        );

        if interrupted {
            return Err(ImportError::InterruptedWait(Box::new(report)));
        }
        Ok(report)
    }
}

async fn cap_reached(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn interrupt_signaled(interrupt: &mut Option<watch::Receiver<bool>>) {
    match interrupt {
        Some(rx) => {
            // Sender gone without signaling: never interrupted.
            let closed = rx.wait_for(|flag| *flag).await.is_err();
            if closed {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending().await,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".into()
    }
}
