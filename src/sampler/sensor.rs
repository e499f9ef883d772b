// Host readings for the sampler: load, memory and disk via sysinfo; players from the host.

use crate::clock::now_ms;
use crate::models::Sample;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use sysinfo::{Disks, System};

const BYTES_PER_MB: u64 = 1024 * 1024;

pub trait HostSensor: Send + Sync + 'static {
    fn read_sample(&self) -> impl Future<Output = anyhow::Result<Sample>> + Send;

    fn free_disk_space_mb(&self) -> impl Future<Output = anyhow::Result<i64>> + Send;
}

/// Online player count, updated by whatever hosts the sampler (join/quit hooks).
#[derive(Debug, Clone, Default)]
pub struct PlayerCounter(Arc<AtomicU32>);

impl PlayerCounter {
    pub fn set(&self, online: u32) {
        self.0.store(online, Ordering::Relaxed);
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct SysinfoSensor {
    sys: Arc<std::sync::Mutex<System>>,
    disks: Arc<std::sync::Mutex<Disks>>,
    players: PlayerCounter,
    /// Free space is reported for the partition holding this path.
    data_path: PathBuf,
}

impl SysinfoSensor {
    pub fn new(players: PlayerCounter, data_path: impl Into<PathBuf>) -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_all();
        sys.refresh_memory();
        Self {
            sys: Arc::new(std::sync::Mutex::new(sys)),
            disks: Arc::new(std::sync::Mutex::new(Disks::new_with_refreshed_list())),
            players,
            data_path: data_path.into(),
        }
    }
}

impl HostSensor for SysinfoSensor {
    async fn read_sample(&self) -> anyhow::Result<Sample> {
        let sys = self.sys.clone();
        let online_players = self.players.get();
        tokio::task::spawn_blocking(move || {
            let mut sys = sys
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo lock poisoned: {}", e))?;
            sys.refresh_memory();
            let cores = sys.cpus().len().max(1) as f64;
            let cpu_load = System::load_average().one / cores;
            let memory_used = sys.total_memory().saturating_sub(sys.available_memory());

            Ok(Sample {
                timestamp: now_ms(),
                online_players,
                cpu_load,
                memory_used,
            })
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }

    async fn free_disk_space_mb(&self) -> anyhow::Result<i64> {
        let disks = self.disks.clone();
        let data_path = self.data_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut disks = disks
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo disks lock poisoned: {}", e))?;
            disks.refresh(false);
            let target = data_path.canonicalize().unwrap_or(data_path);
            let available = disks
                .list()
                .iter()
                .filter(|d| target.starts_with(d.mount_point()))
                .max_by_key(|d| mount_depth(d.mount_point()))
                .map(|d| d.available_space())
                .ok_or_else(|| anyhow::anyhow!("no disk mounted for {}", target.display()))?;
            Ok((available / BYTES_PER_MB) as i64)
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }
}

fn mount_depth(mount: &Path) -> usize {
    mount.components().count()
}
