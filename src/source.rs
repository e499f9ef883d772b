// JSON dump reader for the binary: `{ "server": {...}, "users": [...] }`.
// Either key may be omitted; the server batch is attributed to this server's id.

use crate::models::{RawRecord, ServerImportBatch, ServerSample};
use crate::pipeline::ImportSource;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportDump {
    #[serde(default)]
    server: Option<ServerDump>,
    #[serde(default)]
    users: Vec<RawRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerDump {
    #[serde(default)]
    samples: Vec<ServerSample>,
    #[serde(default)]
    command_usage: HashMap<String, u32>,
}

pub fn parse_import_dump(json: &str, server_id: Uuid) -> anyhow::Result<ImportSource> {
    let dump: ImportDump = serde_json::from_str(json)?;
    Ok(ImportSource {
        server: dump.server.map(|s| ServerImportBatch {
            server_id,
            samples: s.samples,
            command_usage: s.command_usage,
        }),
        users: dump.users,
    })
}

pub fn load_import_file(path: &Path, server_id: Uuid) -> anyhow::Result<ImportSource> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading {}: {}", path.display(), e))?;
    parse_import_dump(&json, server_id)
        .map_err(|e| anyhow::anyhow!("parsing {}: {}", path.display(), e))
}
