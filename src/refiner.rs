// Normalizes raw rows before import: fills in missing ids/names and merges duplicate rows
// for one identity. Output order is first-seen order, and refining refined output is a no-op.

use crate::error::RefineError;
use crate::models::{AddressObservation, RawRecord, WorldPlaytime};
use std::collections::HashMap;
use uuid::Uuid;

pub trait DataRefiner: Send + Sync {
    fn refine(&self, raw: Vec<RawRecord>) -> Result<Vec<RawRecord>, RefineError>;
}

/// Deterministic id for a player known only by name.
pub fn name_derived_id(name: &str) -> Uuid {
    Uuid::new_v3(
        &Uuid::NAMESPACE_OID,
        format!("OfflinePlayer:{}", name).as_bytes(),
    )
}

#[derive(Debug, Clone, Default)]
pub struct MergingRefiner;

impl DataRefiner for MergingRefiner {
    fn refine(&self, raw: Vec<RawRecord>) -> Result<Vec<RawRecord>, RefineError> {
        let mut id_by_name: HashMap<String, Uuid> = HashMap::new();
        let mut name_by_id: HashMap<Uuid, String> = HashMap::new();
        for row in &raw {
            if let (Some(id), Some(name)) = (row.uuid, non_empty(&row.name)) {
                id_by_name.entry(name.to_string()).or_insert(id);
                name_by_id.entry(id).or_insert_with(|| name.to_string());
            }
        }

        let mut out: Vec<RawRecord> = Vec::with_capacity(raw.len());
        let mut position: HashMap<Uuid, usize> = HashMap::new();

        for (index, row) in raw.into_iter().enumerate() {
            let id = match (row.uuid, non_empty(&row.name)) {
                (Some(id), _) => id,
                (None, Some(name)) => id_by_name
                    .get(name)
                    .copied()
                    .unwrap_or_else(|| name_derived_id(name)),
                (None, None) => return Err(RefineError::MissingIdentity { index }),
            };
            let name = match non_empty(&row.name) {
                Some(name) => name.to_string(),
                None => name_by_id
                    .get(&id)
                    .cloned()
                    .ok_or(RefineError::MissingName { index, id })?,
            };
            let row = normalize(RawRecord {
                uuid: Some(id),
                name: Some(name),
                ..row
            });

            match position.get(&id) {
                Some(&at) => merge(&mut out[at], row),
                None => {
                    position.insert(id, out.len());
                    out.push(row);
                }
            }
        }
        Ok(out)
    }
}

fn non_empty(name: &Option<String>) -> Option<&str> {
    name.as_deref().map(str::trim).filter(|n| !n.is_empty())
}

/// Collapses duplicates inside one row so a single row is already a fixed point.
fn normalize(mut row: RawRecord) -> RawRecord {
    let addresses = std::mem::take(&mut row.addresses);
    let nicknames = std::mem::take(&mut row.nicknames);
    let world_times = std::mem::take(&mut row.world_times);
    union_addresses(&mut row.addresses, addresses);
    union_nicknames(&mut row.nicknames, nicknames);
    sum_world_times(&mut row.world_times, world_times);
    row
}

fn merge(into: &mut RawRecord, other: RawRecord) {
    if other.registered > 0 && (into.registered == 0 || other.registered < into.registered) {
        into.registered = other.registered;
    }
    into.op |= other.op;
    into.banned |= other.banned;
    into.times_kicked = into.times_kicked.saturating_add(other.times_kicked);
    into.kills = into.kills.saturating_add(other.kills);
    into.mob_kills = into.mob_kills.saturating_add(other.mob_kills);
    into.deaths = into.deaths.saturating_add(other.deaths);
    union_addresses(&mut into.addresses, other.addresses);
    union_nicknames(&mut into.nicknames, other.nicknames);
    sum_world_times(&mut into.world_times, other.world_times);
}

fn union_addresses(into: &mut Vec<AddressObservation>, from: Vec<AddressObservation>) {
    for obs in from {
        match into.iter_mut().find(|o| o.address == obs.address) {
            Some(existing) => {
                existing.observed_at = match (existing.observed_at, obs.observed_at) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                };
            }
            None => into.push(obs),
        }
    }
}

fn union_nicknames(into: &mut Vec<String>, from: Vec<String>) {
    for nickname in from {
        if !nickname.is_empty() && !into.contains(&nickname) {
            into.push(nickname);
        }
    }
}

fn sum_world_times(into: &mut Vec<WorldPlaytime>, from: Vec<WorldPlaytime>) {
    for wt in from {
        match into.iter_mut().find(|w| w.world == wt.world) {
            Some(existing) => {
                existing.playtime_ms = existing.playtime_ms.saturating_add(wt.playtime_ms)
            }
            None => into.push(wt),
        }
    }
}
