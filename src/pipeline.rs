// Bulk import: refine → convert → dedup → identity insert → fan-out of the dependent writes.
// Server data runs as a second, independent fan-out alongside the user data.

use crate::clock::now_ms;
use crate::dedup::DedupSnapshot;
use crate::error::ImportError;
use crate::geolocation::{GeolocationResolver, UNKNOWN_REGION};
use crate::models::{
    GeoInfo, Identity, ImportRecord, RawRecord, ServerImportBatch, Session, UserInfo,
};
use crate::orchestrator::{Destination, FanOutReport, TaskOrchestrator, WorkItem};
use crate::refiner::{DataRefiner, MergingRefiner};
use crate::storage::StorageGateway;
use futures_util::StreamExt;
use futures_util::future::join_all;
use futures_util::stream;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

const DEFAULT_CONVERSION_CONCURRENCY: usize = 32;

/// Everything one import invocation brings in.
#[derive(Debug, Clone, Default)]
pub struct ImportSource {
    pub server: Option<ServerImportBatch>,
    pub users: Vec<RawRecord>,
}

#[derive(Debug)]
pub enum PhaseOutcome {
    /// Nothing to import for this phase.
    Empty,
    /// The phase stopped before fan-out; nothing after the failing step was written.
    Aborted(ImportError),
    Completed(FanOutReport),
}

impl PhaseOutcome {
    pub fn report(&self) -> Option<&FanOutReport> {
        match self {
            PhaseOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct ImportSummary {
    pub server: PhaseOutcome,
    pub users: PhaseOutcome,
}

/// Disjoint per-destination collections built before any unit is submitted.
#[derive(Debug, Default)]
struct UserBatch {
    identities: HashMap<Identity, UserInfo>,
    server_details: Vec<UserInfo>,
    sessions: HashMap<Identity, Vec<Session>>,
    kick_counts: HashMap<Identity, u32>,
    nicknames: HashMap<Identity, Vec<String>>,
    geo_info: HashMap<Identity, Vec<GeoInfo>>,
}

impl UserBatch {
    fn build(records: Vec<ImportRecord>, snapshot: &DedupSnapshot) -> Self {
        let partition = snapshot.classify(records.iter().map(|r| r.id));
        let mut batch = UserBatch::default();
        for record in records {
            let id = record.id;
            let info = record.user_info();
            if partition.new_identities.contains(&id) {
                batch.identities.insert(id, info.clone());
            }
            if partition.new_to_server.contains(&id) {
                batch.server_details.push(info);
            }
            batch.sessions.insert(id, vec![record.imported_session()]);
            batch.kick_counts.insert(id, record.times_kicked);
            batch.nicknames.insert(id, record.nicknames);
            batch.geo_info.insert(id, record.geo_info);
        }
        batch
    }
}

pub struct ImportPipeline<S, G, R = MergingRefiner> {
    store: Arc<S>,
    geolocation: Arc<G>,
    refiner: R,
    orchestrator: TaskOrchestrator,
    server_id: Uuid,
    conversion_concurrency: usize,
}

impl<S: StorageGateway, G: GeolocationResolver> ImportPipeline<S, G> {
    pub fn new(store: Arc<S>, geolocation: Arc<G>, server_id: Uuid) -> Self {
        Self {
            store,
            geolocation,
            refiner: MergingRefiner,
            orchestrator: TaskOrchestrator::new(),
            server_id,
            conversion_concurrency: DEFAULT_CONVERSION_CONCURRENCY,
        }
    }
}

impl<S: StorageGateway, G: GeolocationResolver, R: DataRefiner> ImportPipeline<S, G, R> {
    pub fn with_refiner<R2: DataRefiner>(self, refiner: R2) -> ImportPipeline<S, G, R2> {
        ImportPipeline {
            store: self.store,
            geolocation: self.geolocation,
            refiner,
            orchestrator: self.orchestrator,
            server_id: self.server_id,
            conversion_concurrency: self.conversion_concurrency,
        }
    }

    pub fn with_orchestrator(mut self, orchestrator: TaskOrchestrator) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    pub fn with_conversion_concurrency(mut self, n: usize) -> Self {
        self.conversion_concurrency = n.max(1);
        self
    }

    /// Runs the server and user phases concurrently and waits for both.
    /// Only an interrupted fan-out wait is returned as an error, after both phases stopped;
    /// its report then carries the outcomes of both phases.
    pub async fn run(&self, source: ImportSource) -> Result<ImportSummary, ImportError> {
        let started = Instant::now();
        let ImportSource { server, users } = source;
        let (server, users) = tokio::join!(self.run_server(server), self.run_users(users));
        let summary = match (server, users) {
            (Ok(server), Ok(users)) => ImportSummary { server, users },
            (server, users) => return Err(merge_interrupted([server, users])),
        };
        info!(
            operation = "import",
            elapsed_ms = started.elapsed().as_millis() as u64,
            "import processing complete"
        );
        Ok(summary)
    }

    pub async fn run_server(
        &self,
        batch: Option<ServerImportBatch>,
    ) -> Result<PhaseOutcome, ImportError> {
        let Some(batch) = batch else {
            debug!("server import data absent, skipping");
            return Ok(PhaseOutcome::Empty);
        };
        let ServerImportBatch {
            server_id,
            samples,
            command_usage,
        } = batch;

        let store = Arc::clone(&self.store);
        let samples_unit = WorkItem::new(Destination::ServerSamples, async move {
            store.insert_server_samples(server_id, &samples).await
        });
        let store = Arc::clone(&self.store);
        let commands_unit = WorkItem::new(Destination::CommandUsage, async move {
            store.insert_command_usage(server_id, &command_usage).await
        });

        let report = self
            .orchestrator
            .run("server", vec![samples_unit, commands_unit])
            .await?;
        Ok(PhaseOutcome::Completed(report))
    }

    pub async fn run_users(&self, raw: Vec<RawRecord>) -> Result<PhaseOutcome, ImportError> {
        if raw.is_empty() {
            debug!("user import data empty, skipping");
            return Ok(PhaseOutcome::Empty);
        }
        let started = Instant::now();
        let raw_count = raw.len();

        let refined = match self.refiner.refine(raw) {
            Ok(refined) => refined,
            Err(e) => {
                warn!(error = %e, raw_count, "user import data malformed; skipping batch");
                return Ok(PhaseOutcome::Aborted(e.into()));
            }
        };
        let records = self.convert(refined).await;

        let snapshot = match DedupSnapshot::fetch(self.store.as_ref(), self.server_id).await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "fetching existing identities failed; skipping batch");
                return Ok(PhaseOutcome::Aborted(ImportError::Snapshot(e)));
            }
        };
        let record_count = records.len();
        let batch = UserBatch::build(records, &snapshot);
        info!(
            raw_count,
            record_count,
            new_identities = batch.identities.len(),
            new_to_server = batch.server_details.len(),
            "user data collected"
        );

        // Everything below references identity rows, so they go in before the fan-out.
        if !batch.identities.is_empty()
            && let Err(e) = self.store.insert_identities(&batch.identities).await
        {
            warn!(destination = %Destination::Identities, error = %e, "identity insert failed");
            return Ok(PhaseOutcome::Aborted(ImportError::IdentityInsert(e)));
        }

        let report = self.orchestrator.run("users", self.user_units(batch)).await?;
        info!(
            operation = "import_users",
            elapsed_ms = started.elapsed().as_millis() as u64,
            "user data processed"
        );
        Ok(PhaseOutcome::Completed(report))
    }

    fn user_units(&self, batch: UserBatch) -> Vec<WorkItem> {
        let UserBatch {
            identities: _,
            server_details,
            sessions,
            kick_counts,
            nicknames,
            geo_info,
        } = batch;
        let server_id = self.server_id;
        let imported_at = now_ms();
        let mut units = Vec::with_capacity(5);

        if !server_details.is_empty() {
            let store = Arc::clone(&self.store);
            units.push(WorkItem::new(Destination::ServerDetails, async move {
                store.insert_server_details(server_id, &server_details).await
            }));
        }
        let store = Arc::clone(&self.store);
        units.push(WorkItem::new(Destination::Sessions, async move {
            store.insert_sessions(server_id, &sessions).await
        }));
        let store = Arc::clone(&self.store);
        units.push(WorkItem::new(Destination::KickCounts, async move {
            store.insert_kick_counts(&kick_counts).await
        }));
        let store = Arc::clone(&self.store);
        units.push(WorkItem::new(Destination::Nicknames, async move {
            store
                .insert_nicknames(server_id, &nicknames, imported_at)
                .await
        }));
        let store = Arc::clone(&self.store);
        units.push(WorkItem::new(Destination::GeoInfo, async move {
            store.insert_geo_info(&geo_info).await
        }));
        units
    }

    /// Converts refined rows concurrently; order is not preserved.
    async fn convert(&self, refined: Vec<RawRecord>) -> Vec<ImportRecord> {
        let imported_at = now_ms();
        stream::iter(refined)
            .map(|raw| self.to_import_record(raw, imported_at))
            .buffer_unordered(self.conversion_concurrency)
            .filter_map(futures_util::future::ready)
            .collect()
            .await
    }

    async fn to_import_record(&self, raw: RawRecord, imported_at: i64) -> Option<ImportRecord> {
        let Some(id) = raw.uuid else {
            warn!(name = ?raw.name, "refined record without id, dropping");
            return None;
        };
        let regions = join_all(
            raw.addresses
                .iter()
                .map(|obs| self.geolocation.resolve(obs.address)),
        )
        .await;
        let geo_info = raw
            .addresses
            .iter()
            .zip(regions)
            .map(|(obs, region)| GeoInfo {
                address: obs.address.to_string(),
                region: region.unwrap_or_else(|| UNKNOWN_REGION.to_string()),
                observed_at: obs.observed_at.unwrap_or(imported_at),
            })
            .collect();

        Some(ImportRecord {
            id,
            name: raw.name.unwrap_or_default(),
            registered: raw.registered,
            op: raw.op,
            banned: raw.banned,
            times_kicked: raw.times_kicked,
            geo_info,
            nicknames: raw.nicknames,
            world_times: raw.world_times,
            kills: raw.kills,
            mob_kills: raw.mob_kills,
            deaths: raw.deaths,
        })
    }
}

/// Folds both phases into one interrupted-wait error once at least one phase was interrupted.
/// Completed phases contribute their outcomes; an aborted phase is logged.
fn merge_interrupted(phases: [Result<PhaseOutcome, ImportError>; 2]) -> ImportError {
    let mut merged = FanOutReport::default();
    for phase in phases {
        match phase {
            Ok(PhaseOutcome::Completed(report)) => merged.merge(report),
            Ok(PhaseOutcome::Aborted(e)) => {
                warn!(error = %e, "phase aborted while the other phase was interrupted");
            }
            Ok(PhaseOutcome::Empty) => {}
            Err(ImportError::InterruptedWait(report)) => merged.merge(*report),
            Err(e) => warn!(error = %e, "phase failed while the other phase was interrupted"),
        }
    }
    ImportError::InterruptedWait(Box::new(merged))
}
