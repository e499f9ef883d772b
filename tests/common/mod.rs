// Shared test helpers: an in-memory storage gateway that records every call, plus record builders.
#![allow(dead_code)]

use analytics_ingest::error::StorageError;
use analytics_ingest::models::*;
use analytics_ingest::orchestrator::Destination;
use analytics_ingest::storage::StorageGateway;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// Everything a [`RecordingStore`] accepted, per destination.
#[derive(Debug, Default)]
pub struct Written {
    pub identities: HashMap<Identity, UserInfo>,
    pub server_details: Vec<UserInfo>,
    pub sessions: HashMap<Identity, Vec<Session>>,
    pub kick_counts: HashMap<Identity, u32>,
    pub nicknames: HashMap<Identity, Vec<String>>,
    pub nickname_last_used: Option<i64>,
    pub geo_info: HashMap<Identity, Vec<GeoInfo>>,
    pub server_samples: Vec<ServerSample>,
    pub command_usage: HashMap<String, u32>,
    pub window_summaries: Vec<WindowSummary>,
}

/// In-memory [`StorageGateway`]. Calls are logged in completion order as
/// `(destination, items)`; failing destinations are logged too but write nothing.
#[derive(Debug, Default)]
pub struct RecordingStore {
    existing: HashSet<Identity>,
    existing_on_server: HashSet<Identity>,
    failing: HashSet<Destination>,
    fail_snapshot: bool,
    identity_delay: Option<Duration>,
    calls: Mutex<Vec<(Destination, usize)>>,
    written: Mutex<Written>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_existing(mut self, ids: impl IntoIterator<Item = Identity>) -> Self {
        self.existing.extend(ids);
        self
    }

    pub fn with_existing_on_server(mut self, ids: impl IntoIterator<Item = Identity>) -> Self {
        self.existing_on_server.extend(ids);
        self
    }

    pub fn failing(mut self, destination: Destination) -> Self {
        self.failing.insert(destination);
        self
    }

    pub fn failing_snapshot(mut self) -> Self {
        self.fail_snapshot = true;
        self
    }

    /// Identity inserts take this long before completing.
    pub fn with_identity_delay(mut self, delay: Duration) -> Self {
        self.identity_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<(Destination, usize)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn destinations(&self) -> Vec<Destination> {
        self.calls().into_iter().map(|(d, _)| d).collect()
    }

    pub fn written<T>(&self, f: impl FnOnce(&Written) -> T) -> T {
        f(&self.written.lock().unwrap())
    }

    fn record(
        &self,
        destination: Destination,
        items: usize,
        write: impl FnOnce(&mut Written),
    ) -> Result<(), StorageError> {
        self.calls.lock().unwrap().push((destination, items));
        if self.failing.contains(&destination) {
            return Err(StorageError::Unavailable(format!("{} rejected", destination)));
        }
        write(&mut self.written.lock().unwrap());
        Ok(())
    }
}

impl StorageGateway for RecordingStore {
    async fn fetch_existing_identities(&self) -> Result<HashSet<Identity>, StorageError> {
        if self.fail_snapshot {
            return Err(StorageError::Unavailable("snapshot".into()));
        }
        Ok(self.existing.clone())
    }

    async fn fetch_existing_server_identities(
        &self,
        _server_id: Uuid,
    ) -> Result<HashSet<Identity>, StorageError> {
        if self.fail_snapshot {
            return Err(StorageError::Unavailable("snapshot".into()));
        }
        Ok(self.existing_on_server.clone())
    }

    async fn insert_identities(
        &self,
        users: &HashMap<Identity, UserInfo>,
    ) -> Result<(), StorageError> {
        if let Some(delay) = self.identity_delay {
            tokio::time::sleep(delay).await;
        }
        self.record(Destination::Identities, users.len(), |w| {
            w.identities.extend(users.iter().map(|(k, v)| (*k, v.clone())))
        })
    }

    async fn insert_server_details(
        &self,
        _server_id: Uuid,
        users: &[UserInfo],
    ) -> Result<(), StorageError> {
        self.record(Destination::ServerDetails, users.len(), |w| {
            w.server_details.extend_from_slice(users)
        })
    }

    async fn insert_sessions(
        &self,
        _server_id: Uuid,
        sessions: &HashMap<Identity, Vec<Session>>,
    ) -> Result<(), StorageError> {
        let count = sessions.values().map(Vec::len).sum();
        self.record(Destination::Sessions, count, |w| {
            for (id, s) in sessions {
                w.sessions.entry(*id).or_default().extend(s.iter().cloned());
            }
        })
    }

    async fn insert_nicknames(
        &self,
        _server_id: Uuid,
        nicknames: &HashMap<Identity, Vec<String>>,
        last_used: i64,
    ) -> Result<(), StorageError> {
        self.record(Destination::Nicknames, nicknames.len(), |w| {
            w.nicknames
                .extend(nicknames.iter().map(|(k, v)| (*k, v.clone())));
            w.nickname_last_used = Some(last_used);
        })
    }

    async fn insert_geo_info(
        &self,
        geo_info: &HashMap<Identity, Vec<GeoInfo>>,
    ) -> Result<(), StorageError> {
        self.record(Destination::GeoInfo, geo_info.len(), |w| {
            w.geo_info.extend(geo_info.iter().map(|(k, v)| (*k, v.clone())))
        })
    }

    async fn insert_kick_counts(&self, kicks: &HashMap<Identity, u32>) -> Result<(), StorageError> {
        self.record(Destination::KickCounts, kicks.len(), |w| {
            w.kick_counts.extend(kicks.iter().map(|(k, v)| (*k, *v)))
        })
    }

    async fn insert_server_samples(
        &self,
        _server_id: Uuid,
        samples: &[ServerSample],
    ) -> Result<(), StorageError> {
        self.record(Destination::ServerSamples, samples.len(), |w| {
            w.server_samples.extend_from_slice(samples)
        })
    }

    async fn insert_command_usage(
        &self,
        _server_id: Uuid,
        usage: &HashMap<String, u32>,
    ) -> Result<(), StorageError> {
        self.record(Destination::CommandUsage, usage.len(), |w| {
            for (command, n) in usage {
                *w.command_usage.entry(command.clone()).or_default() += n;
            }
        })
    }

    async fn insert_window_summary(&self, summary: &WindowSummary) -> Result<(), StorageError> {
        self.record(Destination::WindowSummary, 1, |w| {
            w.window_summaries.push(summary.clone())
        })
    }
}

pub fn server_id() -> Uuid {
    Uuid::from_u128(0x5e_u128 << 64 | 1)
}

pub fn player_id(n: u128) -> Uuid {
    Uuid::from_u128(0xa11ce_u128 << 64 | n)
}

pub fn raw_record(id: Option<Uuid>, name: Option<&str>) -> RawRecord {
    RawRecord {
        uuid: id,
        name: name.map(str::to_string),
        ..RawRecord::default()
    }
}

pub fn observed(address: &str, observed_at: Option<i64>) -> AddressObservation {
    AddressObservation {
        address: address.parse::<IpAddr>().unwrap(),
        observed_at,
    }
}

pub fn world(world: &str, playtime_ms: u64) -> WorldPlaytime {
    WorldPlaytime {
        world: world.into(),
        playtime_ms,
    }
}

pub fn server_sample(date: i64, players_online: i32) -> ServerSample {
    ServerSample {
        date,
        tps: 20.0,
        players_online,
        cpu_usage: 0.5,
        ram_usage: 1024,
        entities: 100,
        chunks_loaded: 50,
        free_disk_space: 2048,
    }
}
