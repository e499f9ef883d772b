// Player records: raw rows from an external source and the refined import form.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;
use wincode::{SchemaRead, SchemaWrite};

/// Stable unique key for a tracked player across the whole store.
pub type Identity = Uuid;

/// One network-origin address a player was seen from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressObservation {
    pub address: IpAddr,
    /// Epoch ms the address was last observed; import time when the source doesn't know.
    #[serde(default)]
    pub observed_at: Option<i64>,
}

/// Playtime on one world, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct WorldPlaytime {
    pub world: String,
    pub playtime_ms: u64,
}

/// Row as produced by an external source reader. Either `uuid` or `name` may be missing
/// until the refiner has run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawRecord {
    pub uuid: Option<Uuid>,
    pub name: Option<String>,
    /// Epoch ms of first join; 0 = unknown.
    pub registered: i64,
    pub op: bool,
    pub banned: bool,
    pub times_kicked: u32,
    pub addresses: Vec<AddressObservation>,
    pub nicknames: Vec<String>,
    pub world_times: Vec<WorldPlaytime>,
    pub kills: u32,
    pub mob_kills: u32,
    pub deaths: u32,
}

/// Address with its resolved region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoInfo {
    pub address: String,
    pub region: String,
    pub observed_at: i64,
}

/// Refined, immutable player record ready for the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRecord {
    pub id: Identity,
    pub name: String,
    pub registered: i64,
    pub op: bool,
    pub banned: bool,
    pub times_kicked: u32,
    pub geo_info: Vec<GeoInfo>,
    pub nicknames: Vec<String>,
    pub world_times: Vec<WorldPlaytime>,
    pub kills: u32,
    pub mob_kills: u32,
    pub deaths: u32,
}

/// Identity / per-server detail row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: Identity,
    pub name: String,
    pub registered: i64,
    pub op: bool,
    pub banned: bool,
}

/// Play session. Imported sessions have no start/end and carry lifetime totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub started_at: i64,
    pub ended_at: i64,
    pub player_kills: u32,
    pub mob_kills: u32,
    pub deaths: u32,
    pub world_times: Vec<WorldPlaytime>,
}

impl ImportRecord {
    pub fn user_info(&self) -> UserInfo {
        UserInfo {
            id: self.id,
            name: self.name.clone(),
            registered: self.registered,
            op: self.op,
            banned: self.banned,
        }
    }

    /// The single lifetime session an imported record contributes.
    pub fn imported_session(&self) -> Session {
        Session {
            started_at: 0,
            ended_at: 0,
            player_kills: self.kills,
            mob_kills: self.mob_kills,
            deaths: self.deaths,
            world_times: self.world_times.clone(),
        }
    }
}
