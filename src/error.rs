// Typed errors for the import pipeline and storage seam.

use crate::orchestrator::FanOutReport;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("blob encoding: {0}")]
    Blob(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Raw input could not be normalized; the whole user batch is skipped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RefineError {
    #[error("raw record {index} has neither an id nor a name")]
    MissingIdentity { index: usize },
    #[error("raw record {index} ({id}) has no name and none could be inferred")]
    MissingName { index: usize, id: uuid::Uuid },
}

/// Why one fan-out unit failed.
#[derive(Debug, Error)]
pub enum UnitError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("unit panicked: {0}")]
    Panicked(String),
    /// The unit's task ended without producing an outcome.
    #[error("unit did not complete: {0}")]
    Lost(String),
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("refine failed: {0}")]
    Refine(#[from] RefineError),
    #[error("fetching existing identities failed: {0}")]
    Snapshot(#[source] StorageError),
    #[error("identity insert failed, dependent inserts skipped: {0}")]
    IdentityInsert(#[source] StorageError),
    #[error(
        "fan-out wait interrupted ({} finished, {} abandoned)",
        .0.finished(),
        .0.abandoned.len()
    )]
    InterruptedWait(Box<FanOutReport>),
}
