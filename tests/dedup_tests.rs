// First-seen partitioning against the stored identity sets

mod common;

use analytics_ingest::dedup::{DedupSnapshot, partition};
use common::{RecordingStore, player_id, server_id};
use std::collections::HashSet;

#[test]
fn partition_is_set_difference() {
    let incoming: HashSet<_> = [1, 2, 3].map(player_id).into();
    let existing: HashSet<_> = [2, 4].map(player_id).into();
    let new = partition(&incoming, &existing);
    assert_eq!(new, HashSet::from([1, 3].map(player_id)));
}

#[test]
fn partition_with_empty_existing_is_everything() {
    let incoming: HashSet<_> = [1, 2].map(player_id).into();
    assert_eq!(partition(&incoming, &HashSet::new()), incoming);
}

#[test]
fn classify_splits_global_and_per_server_newness() {
    // 1: known everywhere; 2: known globally, new here; 3: brand new.
    let snapshot = DedupSnapshot::new(
        [1, 2].map(player_id).into(),
        [1].map(player_id).into(),
    );
    let p = snapshot.classify([1, 2, 3, 3].map(player_id));
    assert_eq!(p.new_identities, HashSet::from([3].map(player_id)));
    assert_eq!(p.new_to_server, HashSet::from([2, 3].map(player_id)));
    assert_eq!(p.all.len(), 3);
    assert!(snapshot.is_new_to_server(&player_id(2)));
    assert!(!snapshot.is_new_identity(&player_id(2)));
}

#[tokio::test]
async fn fetch_reads_both_sets_from_store() {
    let store = RecordingStore::new()
        .with_existing([1, 2].map(player_id))
        .with_existing_on_server([2].map(player_id));
    let snapshot = DedupSnapshot::fetch(&store, server_id()).await.unwrap();
    assert!(!snapshot.is_new_identity(&player_id(1)));
    assert!(snapshot.is_new_to_server(&player_id(1)));
    assert!(!snapshot.is_new_to_server(&player_id(2)));
    assert!(snapshot.is_new_identity(&player_id(9)));
}

#[tokio::test]
async fn fetch_surfaces_store_failure() {
    let store = RecordingStore::new().failing_snapshot();
    assert!(DedupSnapshot::fetch(&store, server_id()).await.is_err());
}
