use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Hub configuration derived from environment variables.
///
/// Variable names match the ones the ingestion worker and the docker-compose
/// file already export, so the same `.env` can be shared between them.
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub bind: String,
    pub port: u16,

    // ── Time-series store ──────────────────────────────────────────
    pub influx_url: String,
    /// API token.  Empty ⇒ no `Authorization` header is sent.
    pub influx_token: String,
    pub influx_org: String,
    pub influx_bucket: String,
    pub store_timeout: Duration,
    /// Extra attempts after the first one for transient failures.
    pub store_retries: u32,

    // ── Snapshot artifacts ─────────────────────────────────────────
    pub static_dir: PathBuf,

    // ── Misc ───────────────────────────────────────────────────────
    /// Zero disables the query cache.
    pub cache_ttl: Duration,
}

fn env_str(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_path(name: &str, default: &str) -> PathBuf {
    PathBuf::from(env_str(name, default))
}

impl HubConfig {
    pub fn from_env() -> Self {
        let influx_url = env_str("INFLUXDB_URL", "http://localhost:8086")
            .trim_end_matches('/')
            .to_string();

        Self {
            bind: env_str("API_BIND", "0.0.0.0"),
            port: env_u16("API_PORT", 8000),
            influx_url,
            influx_token: env_str("INFLUXDB_TOKEN", ""),
            influx_org: env_str("INFLUXDB_ORG", ""),
            influx_bucket: env_str("INFLUXDB_BUCKET", "coin"),
            store_timeout: Duration::from_millis(env_u64("INFLUXDB_TIMEOUT_MS", 10_000).max(1)),
            store_retries: env_u32("INFLUXDB_RETRIES", 3),
            static_dir: env_path("STATIC_DIR", "/app/static_data"),
            cache_ttl: Duration::from_secs(env_u64("QUERY_CACHE_TTL_S", 10)),
        }
    }
}
