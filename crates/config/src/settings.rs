use std::collections::HashMap;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub app: AppSettings,
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub stream: StreamSettings,
    pub stage: StageSettings,
    pub reconciler: ReconcilerSettings,
    pub filter: FilterSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSettings {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub name: String,
    pub max_pool_size: Option<u32>,
    pub min_pool_size: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisSettings {
    pub url: String,
}

/// Consumer-group configuration for the inbound event log.
#[derive(Debug, Deserialize, Clone)]
pub struct StreamSettings {
    pub stream_name: String,
    pub consumer_group: String,
    pub consumer_name: String,
    pub read_count: usize,
    pub block_ms: u64,
    /// Pending entries idle longer than this are reclaimed for redelivery.
    pub reclaim_idle_ms: u64,
    pub reclaim_interval_secs: u64,
    /// A deferred entry is logged at WARN once it has been redelivered
    /// this many times without resolving.
    pub defer_warn_after: u32,
    pub resolver_cache_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StageSettings {
    /// Rolling TTL on a session's staged-segment namespace, refreshed on
    /// every write. Bounds memory for abandoned sessions.
    pub segment_ttl_secs: u64,
    pub speaker_event_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReconcilerSettings {
    pub tick_interval_secs: u64,
    /// A staged segment becomes a commit candidate once it has not been
    /// updated for this long.
    pub immutability_threshold_secs: u64,
    /// An open session with no writes for this long is closed implicitly.
    pub session_idle_grace_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilterSettings {
    pub min_character_length: usize,
    pub min_real_words: usize,
    /// Extra non-informative patterns, appended to the built-in list.
    #[serde(default)]
    pub extra_patterns: Vec<String>,
    /// Per-language stopword lists, keyed by ISO 639-1 code.
    #[serde(default)]
    pub stopwords: HashMap<String, Vec<String>>,
    /// Longest allowed run of a single repeated character; 0 disables the check.
    pub max_char_run: usize,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::default()
                    .separator("__")
                    .prefix("MEETSCRIBE"),
            )
            .set_default("app.host", "0.0.0.0")?
            .set_default("app.port", 8123)?
            .set_default("app.cors_origins", Vec::<String>::new())?
            .set_default("database.url", "mongodb://localhost:27017")?
            .set_default("database.name", "meetscribe")?
            .set_default("redis.url", "redis://127.0.0.1:6379")?
            .set_default("stream.stream_name", "transcription_events")?
            .set_default("stream.consumer_group", "collector_group")?
            .set_default("stream.consumer_name", "collector-main")?
            .set_default("stream.read_count", 10)?
            .set_default("stream.block_ms", 2000)?
            .set_default("stream.reclaim_idle_ms", 60000)?
            .set_default("stream.reclaim_interval_secs", 30)?
            .set_default("stream.defer_warn_after", 5)?
            .set_default("stream.resolver_cache_ttl_secs", 30)?
            .set_default("stage.segment_ttl_secs", 3600)?
            .set_default("stage.speaker_event_ttl_secs", 86400)?
            .set_default("reconciler.tick_interval_secs", 10)?
            .set_default("reconciler.immutability_threshold_secs", 30)?
            .set_default("reconciler.session_idle_grace_secs", 300)?
            .set_default("filter.min_character_length", 3)?
            .set_default("filter.min_real_words", 1)?
            .set_default("filter.max_char_run", 6)?
            .build()?;

        config.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::load().expect("Failed to load default settings")
    }
}
