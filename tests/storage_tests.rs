// SqliteStore tests: schema init, first-seen inserts, upserts, blob round trip through sessions

mod common;

use analytics_ingest::models::*;
use analytics_ingest::storage::{SqliteStore, StorageGateway};
use common::{player_id, server_id, server_sample, world};
use std::collections::HashMap;
use std::time::Duration;
use tempfile::TempDir;

async fn open(dir: &TempDir) -> SqliteStore {
    let path = dir.path().join("analytics.db");
    let store = SqliteStore::connect(path.to_str().unwrap(), 4, Duration::from_secs(5))
        .await
        .unwrap();
    store.init().await.unwrap();
    store
}

fn user(n: u128, name: &str) -> UserInfo {
    UserInfo {
        id: player_id(n),
        name: name.into(),
        registered: 1_000 * n as i64,
        op: n % 2 == 0,
        banned: false,
    }
}

fn identities(users: &[UserInfo]) -> HashMap<Identity, UserInfo> {
    users.iter().map(|u| (u.id, u.clone())).collect()
}

#[tokio::test]
async fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    store.init().await.unwrap();
    assert!(store.fetch_existing_identities().await.unwrap().is_empty());
}

#[tokio::test]
async fn inserted_identities_are_fetched_back() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    let users = [user(1, "alice"), user(2, "bob")];
    store.insert_identities(&identities(&users)).await.unwrap();
    store
        .insert_server_details(server_id(), &users[..1])
        .await
        .unwrap();

    let all = store.fetch_existing_identities().await.unwrap();
    assert_eq!(all.len(), 2);
    let on_server = store
        .fetch_existing_server_identities(server_id())
        .await
        .unwrap();
    assert!(on_server.contains(&player_id(1)));
    assert!(!on_server.contains(&player_id(2)));
}

#[tokio::test]
async fn duplicate_identity_insert_fails_whole_call() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    store
        .insert_identities(&identities(&[user(1, "alice")]))
        .await
        .unwrap();
    let again = identities(&[user(1, "alice"), user(3, "carol")]);
    assert!(store.insert_identities(&again).await.is_err());
    // Rolled back: carol was not written either.
    assert_eq!(store.fetch_existing_identities().await.unwrap().len(), 1);
}

#[tokio::test]
async fn sessions_require_known_identity() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    let sessions: HashMap<_, _> = [(
        player_id(9),
        vec![Session {
            started_at: 0,
            ended_at: 0,
            player_kills: 0,
            mob_kills: 0,
            deaths: 0,
            world_times: vec![],
        }],
    )]
    .into();
    assert!(store.insert_sessions(server_id(), &sessions).await.is_err());
}

#[tokio::test]
async fn sessions_keep_world_times() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    store
        .insert_identities(&identities(&[user(1, "alice")]))
        .await
        .unwrap();
    let session = Session {
        started_at: 0,
        ended_at: 0,
        player_kills: 3,
        mob_kills: 40,
        deaths: 2,
        world_times: vec![world("overworld", 90_000), world("nether", 5_000)],
    };
    let sessions: HashMap<_, _> = [(player_id(1), vec![session.clone()])].into();
    store.insert_sessions(server_id(), &sessions).await.unwrap();

    assert_eq!(store.sessions_of(player_id(1)).await.unwrap(), vec![session]);
}

#[tokio::test]
async fn kick_counts_update_identity_rows() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    store
        .insert_identities(&identities(&[user(1, "alice")]))
        .await
        .unwrap();
    let kicks: HashMap<Identity, u32> = [(player_id(1), 4)].into();
    store.insert_kick_counts(&kicks).await.unwrap();
    let kicked: i64 = sqlx::query_scalar("SELECT times_kicked FROM users WHERE uuid = $1")
        .bind(player_id(1).to_string())
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(kicked, 4);
}

#[tokio::test]
async fn nicknames_and_geo_are_upserted() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    store
        .insert_identities(&identities(&[user(1, "alice")]))
        .await
        .unwrap();
    let nicknames: HashMap<_, _> = [(player_id(1), vec!["al".to_string()])].into();
    store
        .insert_nicknames(server_id(), &nicknames, 100)
        .await
        .unwrap();
    store
        .insert_nicknames(server_id(), &nicknames, 200)
        .await
        .unwrap();
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT nickname, last_used FROM nicknames WHERE uuid = $1")
            .bind(player_id(1).to_string())
            .fetch_all(store.pool())
            .await
            .unwrap();
    assert_eq!(rows, vec![("al".to_string(), 200)]);

    let geo = |region: &str, observed_at| -> HashMap<Identity, Vec<GeoInfo>> {
        [(
            player_id(1),
            vec![GeoInfo {
                address: "10.0.0.1".into(),
                region: region.into(),
                observed_at,
            }],
        )]
        .into()
    };
    store.insert_geo_info(&geo("Not Known", 10)).await.unwrap();
    store.insert_geo_info(&geo("Finland", 20)).await.unwrap();
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT region, last_used FROM geo_info WHERE uuid = $1")
            .bind(player_id(1).to_string())
            .fetch_all(store.pool())
            .await
            .unwrap();
    assert_eq!(rows, vec![("Finland".to_string(), 20)]);
}

#[tokio::test]
async fn command_usage_accumulates_across_imports() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    let usage: HashMap<String, u32> = [("/home".to_string(), 3)].into();
    store.insert_command_usage(server_id(), &usage).await.unwrap();
    store.insert_command_usage(server_id(), &usage).await.unwrap();
    let used: i64 = sqlx::query_scalar("SELECT times_used FROM commands WHERE command = '/home'")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(used, 6);
}

#[tokio::test]
async fn server_samples_skip_existing_dates() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    store
        .insert_server_samples(server_id(), &[server_sample(1_000, 3)])
        .await
        .unwrap();
    store
        .insert_server_samples(
            server_id(),
            &[server_sample(1_000, 9), server_sample(2_000, 5)],
        )
        .await
        .unwrap();
    let rows: Vec<(i64, i64)> =
        sqlx::query_as("SELECT date, players_online FROM tps ORDER BY date")
            .fetch_all(store.pool())
            .await
            .unwrap();
    assert_eq!(rows, vec![(1_000, 3), (2_000, 5)]);
}

#[tokio::test]
async fn window_summaries_are_read_back_oldest_first() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    for (i, start) in [0, 60_000, 120_000].into_iter().enumerate() {
        store
            .insert_window_summary(&WindowSummary {
                server_id: server_id(),
                window_start: start,
                max_players: i as u32,
                mean_cpu_load: 0.5,
                mean_memory_used: 2048,
                free_disk_space_mb: 900,
            })
            .await
            .unwrap();
    }
    let recent = store.recent_window_summaries(server_id(), 2).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].window_start, 60_000);
    assert_eq!(recent[1].window_start, 120_000);
    assert_eq!(recent[1].max_players, 2);

    let tps: f64 = sqlx::query_scalar("SELECT tps FROM tps WHERE date = 0")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(tps, -1.0);
}

#[tokio::test]
async fn empty_batches_are_no_ops() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    store.insert_identities(&HashMap::new()).await.unwrap();
    store.insert_server_details(server_id(), &[]).await.unwrap();
    store
        .insert_sessions(server_id(), &HashMap::new())
        .await
        .unwrap();
    store.insert_kick_counts(&HashMap::new()).await.unwrap();
    store.insert_server_samples(server_id(), &[]).await.unwrap();
}
