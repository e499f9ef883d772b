// Live telemetry: per-tick sample and the per-window summary it is reduced to.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Instantaneous reading taken on every sampler tick. Never stored on its own.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub timestamp: i64,
    pub online_players: u32,
    /// System load average per logical core.
    pub cpu_load: f64,
    pub memory_used: u64,
}

/// One row per elapsed window per server. `window_start` is the start of the window
/// that just closed, not the flush instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSummary {
    pub server_id: Uuid,
    pub window_start: i64,
    pub max_players: u32,
    pub mean_cpu_load: f64,
    pub mean_memory_used: u64,
    /// Megabytes; -1 when the disk could not be read.
    pub free_disk_space_mb: i64,
}
