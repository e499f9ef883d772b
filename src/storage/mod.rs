// Storage seam. Every call commits fully or fails; nothing is partially written within one call.

mod blob;
pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::StorageError;
use crate::models::{GeoInfo, Identity, ServerSample, Session, UserInfo, WindowSummary};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use uuid::Uuid;

/// Batched keyed writes and existing-key lookups consumed by the pipeline and the sampler.
///
/// Calls may block on I/O; callers never hold a lock across them.
pub trait StorageGateway: Send + Sync + 'static {
    /// Identities in the global identity table.
    fn fetch_existing_identities(
        &self,
    ) -> impl Future<Output = Result<HashSet<Identity>, StorageError>> + Send;

    /// Identities with a detail row for `server_id`.
    fn fetch_existing_server_identities(
        &self,
        server_id: Uuid,
    ) -> impl Future<Output = Result<HashSet<Identity>, StorageError>> + Send;

    fn insert_identities(
        &self,
        users: &HashMap<Identity, UserInfo>,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn insert_server_details(
        &self,
        server_id: Uuid,
        users: &[UserInfo],
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn insert_sessions(
        &self,
        server_id: Uuid,
        sessions: &HashMap<Identity, Vec<Session>>,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Upserts nickname history; `last_used` is refreshed for known nicknames.
    fn insert_nicknames(
        &self,
        server_id: Uuid,
        nicknames: &HashMap<Identity, Vec<String>>,
        last_used: i64,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn insert_geo_info(
        &self,
        geo_info: &HashMap<Identity, Vec<GeoInfo>>,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Sets the kick count of existing identities.
    fn insert_kick_counts(
        &self,
        kicks: &HashMap<Identity, u32>,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn insert_server_samples(
        &self,
        server_id: Uuid,
        samples: &[ServerSample],
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn insert_command_usage(
        &self,
        server_id: Uuid,
        usage: &HashMap<String, u32>,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn insert_window_summary(
        &self,
        summary: &WindowSummary,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;
}
