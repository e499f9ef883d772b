// Server-level import data: historical periodic samples and command usage.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One historical periodic sample. Unknown gauges are -1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSample {
    pub date: i64,
    #[serde(default = "unknown_f64")]
    pub tps: f64,
    pub players_online: i32,
    #[serde(default = "unknown_f64")]
    pub cpu_usage: f64,
    #[serde(default = "unknown_i64")]
    pub ram_usage: i64,
    #[serde(default = "unknown_i32")]
    pub entities: i32,
    #[serde(default = "unknown_i32")]
    pub chunks_loaded: i32,
    #[serde(default = "unknown_i64")]
    pub free_disk_space: i64,
}

fn unknown_f64() -> f64 {
    -1.0
}

fn unknown_i64() -> i64 {
    -1
}

fn unknown_i32() -> i32 {
    -1
}

/// Server data for one import invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerImportBatch {
    pub server_id: Uuid,
    pub samples: Vec<ServerSample>,
    pub command_usage: HashMap<String, u32>,
}
