// First-seen detection against point-in-time snapshots of stored identities.

use crate::error::StorageError;
use crate::models::Identity;
use crate::storage::StorageGateway;
use std::collections::HashSet;
use uuid::Uuid;

/// `incoming \ existing`.
pub fn partition(incoming: &HashSet<Identity>, existing: &HashSet<Identity>) -> HashSet<Identity> {
    incoming.difference(existing).copied().collect()
}

/// Which incoming identities need which first-seen insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    /// Absent from the global identity table.
    pub new_identities: HashSet<Identity>,
    /// Absent from this server's detail table (may already exist globally).
    pub new_to_server: HashSet<Identity>,
    /// Every incoming identity; feeds the append-only tables.
    pub all: HashSet<Identity>,
}

/// Both existing-identity sets, read once per import and never mutated while it runs.
#[derive(Debug, Clone, Default)]
pub struct DedupSnapshot {
    identities: HashSet<Identity>,
    server_identities: HashSet<Identity>,
}

impl DedupSnapshot {
    pub fn new(identities: HashSet<Identity>, server_identities: HashSet<Identity>) -> Self {
        Self {
            identities,
            server_identities,
        }
    }

    pub async fn fetch<S: StorageGateway>(
        store: &S,
        server_id: Uuid,
    ) -> Result<Self, StorageError> {
        let (identities, server_identities) = tokio::try_join!(
            store.fetch_existing_identities(),
            store.fetch_existing_server_identities(server_id),
        )?;
        tracing::debug!(
            operation = "dedup_snapshot",
            identities = identities.len(),
            server_identities = server_identities.len(),
            "existing identities fetched"
        );
        Ok(Self::new(identities, server_identities))
    }

    pub fn is_new_identity(&self, id: &Identity) -> bool {
        !self.identities.contains(id)
    }

    pub fn is_new_to_server(&self, id: &Identity) -> bool {
        !self.server_identities.contains(id)
    }

    pub fn classify(&self, incoming: impl IntoIterator<Item = Identity>) -> Partition {
        let all: HashSet<Identity> = incoming.into_iter().collect();
        Partition {
            new_identities: partition(&all, &self.identities),
            new_to_server: partition(&all, &self.server_identities),
            all,
        }
    }
}
