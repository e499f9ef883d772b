// Live telemetry sampler. One task ticks the sampler; window rollover is detected by the
// memory reducer on wall-clock time and the finished summary goes to a dedicated writer task.

mod sensor;

pub use sensor::{HostSensor, PlayerCounter, SysinfoSensor};

use crate::aggregator::{RunningMax, RunningMean, TimeBucketedMean, WINDOW, WindowReducer};
use crate::models::{Sample, WindowSummary};
use crate::storage::StorageGateway;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::time::{Duration, interval};
use tracing::Instrument;
use uuid::Uuid;

/// Summaries waiting for the writer. A window is a minute, so this is hours of slack.
pub const SUMMARY_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    /// Nothing folded since the last flush.
    Idle,
    Accumulating,
}

/// Folds samples into one [`WindowSummary`] per elapsed window. Single owner, no locking.
#[derive(Debug)]
pub struct PeriodicSampler {
    server_id: Uuid,
    players: RunningMax<u32>,
    cpu: RunningMean,
    memory: TimeBucketedMean,
    state: SamplerState,
}

impl PeriodicSampler {
    pub fn new(server_id: Uuid) -> Self {
        Self {
            server_id,
            players: RunningMax::new(0),
            cpu: RunningMean::new(),
            memory: TimeBucketedMean::new(WINDOW),
            state: SamplerState::Idle,
        }
    }

    pub fn state(&self) -> SamplerState {
        self.state
    }

    /// Folds one sample; true when it closed the current window and a flush is due.
    pub fn observe(&mut self, sample: &Sample) -> bool {
        let elapsed = self
            .memory
            .accumulate(sample.timestamp, sample.memory_used as f64);
        self.players.accumulate(sample.online_players);
        self.cpu.accumulate(sample.cpu_load);
        self.state = SamplerState::Accumulating;
        elapsed
    }

    /// Reads and resets all reducers. The summary is stamped with the start of the window
    /// that just closed.
    pub fn flush(&mut self, now: i64, free_disk_space_mb: i64) -> WindowSummary {
        let summary = WindowSummary {
            server_id: self.server_id,
            window_start: now - WINDOW.as_millis() as i64,
            max_players: self.players.flush_and_reset(),
            mean_cpu_load: self.cpu.flush_and_reset(),
            mean_memory_used: self.memory.flush_and_reset(now) as u64,
            free_disk_space_mb,
        };
        self.state = SamplerState::Idle;
        summary
    }

    /// One tick: read the host, fold, and flush if the window elapsed.
    pub async fn tick<H: HostSensor>(
        &mut self,
        sensor: &H,
    ) -> anyhow::Result<Option<WindowSummary>> {
        let sample = sensor.read_sample().await?;
        if !self.observe(&sample) {
            return Ok(None);
        }
        let free_disk_space_mb = sensor.free_disk_space_mb().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, operation = "free_disk_space", "disk read failed");
            -1
        });
        Ok(Some(self.flush(sample.timestamp, free_disk_space_mb)))
    }
}

pub struct SamplerDeps<H> {
    pub sensor: Arc<H>,
    pub summary_tx: mpsc::Sender<WindowSummary>,
    pub summaries_written_total: Arc<AtomicU64>,
    pub shutdown_rx: tokio::sync::oneshot::Receiver<()>,
}

pub struct SamplerConfig {
    pub server_id: Uuid,
    pub tick_interval_ms: u64,
    /// How often to log sampler stats (real seconds).
    pub stats_log_interval_secs: u64,
}

/// Spawns the writer that stores each summary as one write. A failed write is logged and
/// dropped; the next window is unaffected. Exits when the sampler drops its sender.
pub fn spawn_summary_writer<S: StorageGateway>(
    mut summary_rx: mpsc::Receiver<WindowSummary>,
    store: Arc<S>,
    summaries_written_total: Arc<AtomicU64>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(summary) = summary_rx.recv().await {
            match store.insert_window_summary(&summary).await {
                Ok(()) => {
                    summaries_written_total.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        operation = "insert_window_summary",
                        window_start = summary.window_start,
                        max_players = summary.max_players,
                        "window summary saved"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        operation = "insert_window_summary",
                        window_start = summary.window_start,
                        "window summary lost"
                    );
                }
            }
        }
        tracing::debug!("Summary writer shutting down");
    })
}

/// Spawns the sampler loop. Ticks never overlap; missed ticks are skipped.
pub fn spawn<H: HostSensor>(
    deps: SamplerDeps<H>,
    config: SamplerConfig,
) -> tokio::task::JoinHandle<()> {
    let SamplerDeps {
        sensor,
        summary_tx,
        summaries_written_total,
        mut shutdown_rx,
    } = deps;
    let SamplerConfig {
        server_id,
        tick_interval_ms,
        stats_log_interval_secs,
    } = config;

    let sampler_span = tracing::span!(tracing::Level::DEBUG, "sampler", tick_interval_ms);
    let sampler_loop = async move {
        let mut sampler = PeriodicSampler::new(server_id);
        let mut tick = interval(Duration::from_millis(tick_interval_ms));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut stats_log_tick = interval(Duration::from_secs(stats_log_interval_secs));
        stats_log_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut windows_flushed_total: u64 = 0;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let summary = match sampler.tick(sensor.as_ref()).await {
                        Ok(Some(summary)) => summary,
                        Ok(None) => continue,
                        Err(e) => {
                            tracing::warn!(error = %e, operation = "read_sample", "sample failed");
                            continue;
                        }
                    };
                    windows_flushed_total += 1;
                    if summary_tx.send(summary).await.is_err() {
                        tracing::debug!("Summary writer channel closed");
                    }
                }
                _ = &mut shutdown_rx => {
                    tracing::debug!("Sampler shutting down");
                    break;
                }
                _ = stats_log_tick.tick() => {
                    tracing::info!(
                        windows_flushed_total,
                        summaries_written_total = summaries_written_total.load(Ordering::Relaxed),
                        "sampler stats"
                    );
                }
            }
        }
    };
    tokio::spawn(sampler_loop.instrument(sampler_span))
}
