use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub struct Config {
    pub host: String,
    pub http_port: u16,
    pub data_dir: String,
    pub redis_url: Option<String>,
    pub run_consumer: bool,
    pub consumer_group: String,
    pub allowed_origins: Vec<String>,
    pub cache: CacheSettings,
}

/// Tunables for the cache consistency layer.
#[derive(Clone, Debug)]
pub struct CacheSettings {
    pub page_ttl: Duration,
    /// How long a populated page stays on the process-local last-known shelf.
    pub stale_page_ttl: Duration,
    pub stale_page_capacity: u64,
    pub status_ttl: Duration,
    pub counter_ttl: Duration,
    pub lock_ttl: Duration,
    pub lock_retry_attempts: u32,
    pub lock_backoff_base: Duration,
    pub lock_backoff_max: Duration,
    pub count_retry_attempts: u32,
    pub applied_marker_ttl: Duration,
    pub store_timeout: Duration,
    pub source_timeout: Duration,
    pub consumer_batch_size: usize,
    pub consumer_poll_interval: Duration,
    pub max_deliveries: u32,
    pub redelivery_backoff: Duration,
    pub reconcile_interval: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            page_ttl: Duration::from_secs(30),
            stale_page_ttl: Duration::from_secs(3600),
            stale_page_capacity: 10_000,
            status_ttl: Duration::from_secs(300),
            counter_ttl: Duration::from_secs(3600),
            lock_ttl: Duration::from_secs(5),
            lock_retry_attempts: 6,
            lock_backoff_base: Duration::from_millis(25),
            lock_backoff_max: Duration::from_millis(400),
            count_retry_attempts: 6,
            applied_marker_ttl: Duration::from_secs(86_400),
            store_timeout: Duration::from_millis(500),
            source_timeout: Duration::from_secs(5),
            consumer_batch_size: 64,
            consumer_poll_interval: Duration::from_secs(1),
            max_deliveries: 5,
            redelivery_backoff: Duration::from_millis(200),
            reconcile_interval: Duration::from_secs(300),
        }
    }
}

impl CacheSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            page_ttl: env_millis("ROSTER_PAGE_TTL_MS", defaults.page_ttl),
            stale_page_ttl: env_millis("ROSTER_STALE_PAGE_TTL_MS", defaults.stale_page_ttl),
            stale_page_capacity: env_parse(
                "ROSTER_STALE_PAGE_CAPACITY",
                defaults.stale_page_capacity,
            ),
            status_ttl: env_millis("ROSTER_STATUS_TTL_MS", defaults.status_ttl),
            counter_ttl: env_millis("ROSTER_COUNTER_TTL_MS", defaults.counter_ttl),
            lock_ttl: env_millis("ROSTER_LOCK_TTL_MS", defaults.lock_ttl),
            lock_retry_attempts: env_parse(
                "ROSTER_LOCK_RETRY_ATTEMPTS",
                defaults.lock_retry_attempts,
            ),
            lock_backoff_base: env_millis(
                "ROSTER_LOCK_BACKOFF_BASE_MS",
                defaults.lock_backoff_base,
            ),
            lock_backoff_max: env_millis("ROSTER_LOCK_BACKOFF_MAX_MS", defaults.lock_backoff_max),
            count_retry_attempts: env_parse(
                "ROSTER_COUNT_RETRY_ATTEMPTS",
                defaults.count_retry_attempts,
            ),
            applied_marker_ttl: env_millis(
                "ROSTER_APPLIED_MARKER_TTL_MS",
                defaults.applied_marker_ttl,
            ),
            store_timeout: env_millis("ROSTER_STORE_TIMEOUT_MS", defaults.store_timeout),
            source_timeout: env_millis("ROSTER_SOURCE_TIMEOUT_MS", defaults.source_timeout),
            consumer_batch_size: env_parse(
                "ROSTER_CONSUMER_BATCH_SIZE",
                defaults.consumer_batch_size,
            ),
            consumer_poll_interval: env_millis(
                "ROSTER_CONSUMER_POLL_INTERVAL_MS",
                defaults.consumer_poll_interval,
            ),
            max_deliveries: env_parse("ROSTER_MAX_DELIVERIES", defaults.max_deliveries),
            redelivery_backoff: env_millis(
                "ROSTER_REDELIVERY_BACKOFF_MS",
                defaults.redelivery_backoff,
            ),
            reconcile_interval: env_millis(
                "ROSTER_RECONCILE_INTERVAL_MS",
                defaults.reconcile_interval,
            ),
        }
    }
}

impl Config {
    const DEFAULT_DATA_DIR: &str = "./data";
    const DEFAULT_CONSUMER_GROUP: &str = "cache-invalidation";

    pub fn from_env() -> Self {
        let host = std::env::var("ROSTER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let http_port = std::env::var("ROSTER_HTTP_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .unwrap_or(8080);
        let redis_url = std::env::var("ROSTER_REDIS_URL").ok();
        if redis_url.is_none() {
            warn!("ROSTER_REDIS_URL not set, cache and lock state will be local to this process");
        }
        Self {
            host,
            http_port,
            data_dir: std::env::var("ROSTER_DATA_DIR")
                .unwrap_or_else(|_| Self::DEFAULT_DATA_DIR.to_string()),
            redis_url,
            run_consumer: env_parse("ROSTER_RUN_CONSUMER", true),
            consumer_group: std::env::var("ROSTER_CONSUMER_GROUP")
                .unwrap_or_else(|_| Self::DEFAULT_CONSUMER_GROUP.to_string()),
            allowed_origins: std::env::var("ROSTER_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            cache: CacheSettings::from_env(),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }
}

fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            warn!("{} has an unparseable value '{}', using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}

fn env_millis(name: &str, default: Duration) -> Duration {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(env_parse(name, default_ms))
}
