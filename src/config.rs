use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub sampler: SamplerSettings,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub geolocation: GeolocationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Identity of this server in the store; summaries and per-server rows are keyed on it.
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_pool_size: u32,
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

fn default_busy_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Several ticks per window; window detection is time-based, not tick-count-based.
    pub tick_interval_ms: u64,
    /// How often to log sampler stats at INFO level.
    pub stats_log_interval_secs: u64,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportConfig {
    /// JSON dump to import once at startup.
    #[serde(default)]
    pub source_path: Option<String>,
    /// Give up waiting on a fan-out after this long; units keep running.
    #[serde(default)]
    pub wait_cap_secs: Option<u64>,
    #[serde(default = "default_conversion_concurrency")]
    pub conversion_concurrency: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            source_path: None,
            wait_cap_secs: None,
            conversion_concurrency: default_conversion_concurrency(),
        }
    }
}

fn default_conversion_concurrency() -> usize {
    32
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeolocationConfig {
    #[serde(default = "default_geolocation_timeout_ms")]
    pub timeout_ms: u64,
    /// address → region.
    #[serde(default)]
    pub regions: HashMap<String, String>,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_geolocation_timeout_ms(),
            regions: HashMap::new(),
        }
    }
}

fn default_geolocation_timeout_ms() -> u64 {
    2_000
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.server.id.is_nil(), "server.id must not be the nil uuid");
        anyhow::ensure!(
            !self.server.name.trim().is_empty(),
            "server.name must be non-empty"
        );
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.max_pool_size > 0,
            "database.max_pool_size must be > 0, got {}",
            self.database.max_pool_size
        );
        anyhow::ensure!(
            self.database.busy_timeout_secs > 0,
            "database.busy_timeout_secs must be > 0, got {}",
            self.database.busy_timeout_secs
        );
        anyhow::ensure!(
            self.sampler.tick_interval_ms > 0,
            "sampler.tick_interval_ms must be > 0, got {}",
            self.sampler.tick_interval_ms
        );
        anyhow::ensure!(
            self.sampler.tick_interval_ms < crate::aggregator::WINDOW.as_millis() as u64,
            "sampler.tick_interval_ms must be shorter than the 60s window, got {}",
            self.sampler.tick_interval_ms
        );
        anyhow::ensure!(
            self.sampler.stats_log_interval_secs > 0,
            "sampler.stats_log_interval_secs must be > 0, got {}",
            self.sampler.stats_log_interval_secs
        );
        if let Some(path) = &self.import.source_path {
            anyhow::ensure!(!path.is_empty(), "import.source_path must be non-empty when set");
        }
        if let Some(cap) = self.import.wait_cap_secs {
            anyhow::ensure!(cap > 0, "import.wait_cap_secs must be > 0, got {}", cap);
        }
        anyhow::ensure!(
            self.import.conversion_concurrency > 0,
            "import.conversion_concurrency must be > 0, got {}",
            self.import.conversion_concurrency
        );
        anyhow::ensure!(
            self.geolocation.timeout_ms > 0,
            "geolocation.timeout_ms must be > 0, got {}",
            self.geolocation.timeout_ms
        );
        Ok(())
    }
}
