// Versioned BLOB columns: [version: u8][wincode payload].

use crate::error::StorageError;
use crate::models::WorldPlaytime;

/// sessions.world_times: Vec<WorldPlaytime>.
pub(super) const WORLD_TIMES_VERSION: u8 = 1;

fn with_version_prefix(version: u8, payload: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(version);
    out.extend_from_slice(&payload);
    out
}

/// Payload after the version byte. Unknown versions are rejected.
fn blob_payload(bytes: &[u8], expected_version: u8) -> Result<&[u8], StorageError> {
    match bytes.split_first() {
        Some((&version, payload)) if version == expected_version => Ok(payload),
        Some((&version, _)) => Err(StorageError::Blob(format!(
            "unsupported blob version {} (expected {})",
            version, expected_version
        ))),
        None => Err(StorageError::Blob("empty blob".into())),
    }
}

#[allow(clippy::ptr_arg)] // wincode schema is on Vec<T>
pub(super) fn encode_world_times(times: &Vec<WorldPlaytime>) -> Result<Vec<u8>, StorageError> {
    let payload = wincode::serialize(times).map_err(|e| StorageError::Blob(e.to_string()))?;
    Ok(with_version_prefix(WORLD_TIMES_VERSION, payload))
}

pub(super) fn decode_world_times(bytes: &[u8]) -> Result<Vec<WorldPlaytime>, StorageError> {
    let payload = blob_payload(bytes, WORLD_TIMES_VERSION)?;
    wincode::deserialize(payload).map_err(|e| StorageError::Blob(e.to_string()))
}
