// SQLite gateway. sqlx pool in WAL mode; one transaction per gateway call.
// Foreign keys are enforced, so identity rows must exist before any dependent row.

use super::{StorageGateway, blob};
use crate::error::StorageError;
use crate::models::{GeoInfo, Identity, ServerSample, Session, UserInfo, WindowSummary};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

/// Window summaries leave the game-loop gauges unknown.
const UNKNOWN_GAUGE: i64 = -1;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to SQLite at `path`, creating the parent dir and DB if missing.
    pub async fn connect(
        path: &str,
        max_pool_size: u32,
        busy_timeout: Duration,
    ) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(busy_timeout)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS users (
                uuid TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                registered INTEGER NOT NULL,
                times_kicked INTEGER NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS user_info (
                uuid TEXT NOT NULL REFERENCES users(uuid),
                server_uuid TEXT NOT NULL,
                registered INTEGER NOT NULL,
                opped INTEGER NOT NULL,
                banned INTEGER NOT NULL,
                PRIMARY KEY (uuid, server_uuid)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                uuid TEXT NOT NULL REFERENCES users(uuid),
                server_uuid TEXT NOT NULL,
                session_start INTEGER NOT NULL,
                session_end INTEGER NOT NULL,
                player_kills INTEGER NOT NULL,
                mob_kills INTEGER NOT NULL,
                deaths INTEGER NOT NULL,
                world_times BLOB NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_sessions_uuid ON sessions(uuid)",
            r#"
            CREATE TABLE IF NOT EXISTS nicknames (
                uuid TEXT NOT NULL REFERENCES users(uuid),
                server_uuid TEXT NOT NULL,
                nickname TEXT NOT NULL,
                last_used INTEGER NOT NULL,
                PRIMARY KEY (uuid, server_uuid, nickname)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS geo_info (
                uuid TEXT NOT NULL REFERENCES users(uuid),
                address TEXT NOT NULL,
                region TEXT NOT NULL,
                last_used INTEGER NOT NULL,
                PRIMARY KEY (uuid, address)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS tps (
                server_uuid TEXT NOT NULL,
                date INTEGER NOT NULL,
                tps REAL NOT NULL,
                players_online INTEGER NOT NULL,
                cpu_usage REAL NOT NULL,
                ram_usage INTEGER NOT NULL,
                entities INTEGER NOT NULL,
                chunks_loaded INTEGER NOT NULL,
                free_disk_space INTEGER NOT NULL,
                PRIMARY KEY (server_uuid, date)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS commands (
                server_uuid TEXT NOT NULL,
                command TEXT NOT NULL,
                times_used INTEGER NOT NULL,
                PRIMARY KEY (server_uuid, command)
            )
            "#,
        ];
        for sql in statements {
            sqlx::query(sql).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Sessions stored for one identity, oldest first.
    pub async fn sessions_of(&self, id: Identity) -> Result<Vec<Session>, StorageError> {
        let rows = sqlx::query(
            "SELECT session_start, session_end, player_kills, mob_kills, deaths, world_times
             FROM sessions WHERE uuid = $1 ORDER BY id ASC",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let world_times: Vec<u8> = row.try_get("world_times")?;
            out.push(Session {
                started_at: row.try_get("session_start")?,
                ended_at: row.try_get("session_end")?,
                player_kills: row.try_get::<i64, _>("player_kills")? as u32,
                mob_kills: row.try_get::<i64, _>("mob_kills")? as u32,
                deaths: row.try_get::<i64, _>("deaths")? as u32,
                world_times: blob::decode_world_times(&world_times)?,
            });
        }
        Ok(out)
    }

    /// Most recent `limit` window rows for a server, returned oldest first.
    pub async fn recent_window_summaries(
        &self,
        server_id: Uuid,
        limit: u32,
    ) -> Result<Vec<WindowSummary>, StorageError> {
        let rows = sqlx::query(
            "SELECT date, players_online, cpu_usage, ram_usage, free_disk_space
             FROM tps WHERE server_uuid = $1 ORDER BY date DESC LIMIT $2",
        )
        .bind(server_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(WindowSummary {
                server_id,
                window_start: row.try_get("date")?,
                max_players: row.try_get::<i64, _>("players_online")?.max(0) as u32,
                mean_cpu_load: row.try_get("cpu_usage")?,
                mean_memory_used: row.try_get::<i64, _>("ram_usage")?.max(0) as u64,
                free_disk_space_mb: row.try_get("free_disk_space")?,
            });
        }
        out.reverse();
        Ok(out)
    }

    async fn fetch_uuids(
        &self,
        sql: &str,
        server_id: Option<Uuid>,
    ) -> Result<HashSet<Identity>, StorageError> {
        let mut query = sqlx::query_scalar::<_, String>(sql);
        if let Some(server_id) = server_id {
            query = query.bind(server_id.to_string());
        }
        let raw = query.fetch_all(&self.pool).await?;
        raw.iter().map(|s| parse_uuid(s)).collect()
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, StorageError> {
    Uuid::parse_str(s).map_err(|e| StorageError::Corrupt(format!("uuid {:?}: {}", s, e)))
}

impl StorageGateway for SqliteStore {
    #[instrument(skip(self), fields(repo = "store", operation = "fetch_existing_identities"))]
    async fn fetch_existing_identities(&self) -> Result<HashSet<Identity>, StorageError> {
        self.fetch_uuids("SELECT uuid FROM users", None).await
    }

    #[instrument(skip(self), fields(repo = "store", operation = "fetch_existing_server_identities"))]
    async fn fetch_existing_server_identities(
        &self,
        server_id: Uuid,
    ) -> Result<HashSet<Identity>, StorageError> {
        self.fetch_uuids(
            "SELECT uuid FROM user_info WHERE server_uuid = $1",
            Some(server_id),
        )
        .await
    }

    #[instrument(skip(self, users), fields(repo = "store", operation = "insert_identities", users_count = users.len()))]
    async fn insert_identities(
        &self,
        users: &HashMap<Identity, UserInfo>,
    ) -> Result<(), StorageError> {
        if users.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for (id, user) in users {
            sqlx::query("INSERT INTO users (uuid, name, registered) VALUES ($1, $2, $3)")
                .bind(id.to_string())
                .bind(&user.name)
                .bind(user.registered)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, users), fields(repo = "store", operation = "insert_server_details", users_count = users.len()))]
    async fn insert_server_details(
        &self,
        server_id: Uuid,
        users: &[UserInfo],
    ) -> Result<(), StorageError> {
        if users.is_empty() {
            return Ok(());
        }
        let server = server_id.to_string();
        let mut tx = self.pool.begin().await?;
        for user in users {
            sqlx::query(
                "INSERT INTO user_info (uuid, server_uuid, registered, opped, banned) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(user.id.to_string())
            .bind(&server)
            .bind(user.registered)
            .bind(user.op)
            .bind(user.banned)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, sessions), fields(repo = "store", operation = "insert_sessions", users_count = sessions.len()))]
    async fn insert_sessions(
        &self,
        server_id: Uuid,
        sessions: &HashMap<Identity, Vec<Session>>,
    ) -> Result<(), StorageError> {
        if sessions.is_empty() {
            return Ok(());
        }
        let server = server_id.to_string();
        let mut tx = self.pool.begin().await?;
        for (id, list) in sessions {
            for s in list {
                let world_times = blob::encode_world_times(&s.world_times)?;
                sqlx::query(
                    "INSERT INTO sessions (uuid, server_uuid, session_start, session_end, player_kills, mob_kills, deaths, world_times)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                )
                .bind(id.to_string())
                .bind(&server)
                .bind(s.started_at)
                .bind(s.ended_at)
                .bind(s.player_kills as i64)
                .bind(s.mob_kills as i64)
                .bind(s.deaths as i64)
                .bind(&world_times)
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, nicknames), fields(repo = "store", operation = "insert_nicknames", users_count = nicknames.len()))]
    async fn insert_nicknames(
        &self,
        server_id: Uuid,
        nicknames: &HashMap<Identity, Vec<String>>,
        last_used: i64,
    ) -> Result<(), StorageError> {
        if nicknames.is_empty() {
            return Ok(());
        }
        let server = server_id.to_string();
        let mut tx = self.pool.begin().await?;
        for (id, names) in nicknames {
            for nickname in names {
                sqlx::query(
                    "INSERT INTO nicknames (uuid, server_uuid, nickname, last_used) VALUES ($1, $2, $3, $4)
                     ON CONFLICT (uuid, server_uuid, nickname) DO UPDATE SET last_used = excluded.last_used",
                )
                .bind(id.to_string())
                .bind(&server)
                .bind(nickname)
                .bind(last_used)
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, geo_info), fields(repo = "store", operation = "insert_geo_info", users_count = geo_info.len()))]
    async fn insert_geo_info(
        &self,
        geo_info: &HashMap<Identity, Vec<GeoInfo>>,
    ) -> Result<(), StorageError> {
        if geo_info.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for (id, list) in geo_info {
            for g in list {
                sqlx::query(
                    "INSERT INTO geo_info (uuid, address, region, last_used) VALUES ($1, $2, $3, $4)
                     ON CONFLICT (uuid, address) DO UPDATE SET region = excluded.region, last_used = excluded.last_used",
                )
                .bind(id.to_string())
                .bind(&g.address)
                .bind(&g.region)
                .bind(g.observed_at)
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, kicks), fields(repo = "store", operation = "insert_kick_counts", users_count = kicks.len()))]
    async fn insert_kick_counts(&self, kicks: &HashMap<Identity, u32>) -> Result<(), StorageError> {
        if kicks.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for (id, times_kicked) in kicks {
            sqlx::query("UPDATE users SET times_kicked = $1 WHERE uuid = $2")
                .bind(*times_kicked as i64)
                .bind(id.to_string())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, samples), fields(repo = "store", operation = "insert_server_samples", samples_count = samples.len()))]
    async fn insert_server_samples(
        &self,
        server_id: Uuid,
        samples: &[ServerSample],
    ) -> Result<(), StorageError> {
        if samples.is_empty() {
            return Ok(());
        }
        let server = server_id.to_string();
        let mut tx = self.pool.begin().await?;
        for s in samples {
            sqlx::query(
                "INSERT INTO tps (server_uuid, date, tps, players_online, cpu_usage, ram_usage, entities, chunks_loaded, free_disk_space)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                 ON CONFLICT (server_uuid, date) DO NOTHING",
            )
            .bind(&server)
            .bind(s.date)
            .bind(s.tps)
            .bind(s.players_online)
            .bind(s.cpu_usage)
            .bind(s.ram_usage)
            .bind(s.entities)
            .bind(s.chunks_loaded)
            .bind(s.free_disk_space)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, usage), fields(repo = "store", operation = "insert_command_usage", commands_count = usage.len()))]
    async fn insert_command_usage(
        &self,
        server_id: Uuid,
        usage: &HashMap<String, u32>,
    ) -> Result<(), StorageError> {
        if usage.is_empty() {
            return Ok(());
        }
        let server = server_id.to_string();
        let mut tx = self.pool.begin().await?;
        for (command, times_used) in usage {
            sqlx::query(
                "INSERT INTO commands (server_uuid, command, times_used) VALUES ($1, $2, $3)
                 ON CONFLICT (server_uuid, command) DO UPDATE SET times_used = times_used + excluded.times_used",
            )
            .bind(&server)
            .bind(command)
            .bind(*times_used as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, summary), fields(repo = "store", operation = "insert_window_summary", window_start = summary.window_start))]
    async fn insert_window_summary(&self, summary: &WindowSummary) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO tps (server_uuid, date, tps, players_online, cpu_usage, ram_usage, entities, chunks_loaded, free_disk_space)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(summary.server_id.to_string())
        .bind(summary.window_start)
        .bind(UNKNOWN_GAUGE as f64)
        .bind(summary.max_players as i64)
        .bind(summary.mean_cpu_load)
        .bind(summary.mean_memory_used as i64)
        .bind(UNKNOWN_GAUGE)
        .bind(UNKNOWN_GAUGE)
        .bind(summary.free_disk_space_mb)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
