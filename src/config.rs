use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GENERATION_TIMEOUT_MS: u64 = 90_000;
const DEFAULT_REFINE_TIMEOUT_MS: u64 = 20_000;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub database_path: PathBuf,
    pub database_max_connections: u32,
    pub batch_size: usize,
    pub generation_timeout: Duration,
    /// Bound on prompt refinement; on expiry the stored prompt is used.
    pub refine_timeout: Duration,
    pub static_dir: PathBuf,
    pub google: Option<GoogleOAuthConfig>,
    pub admin_google_id: Option<String>,
    pub rate_limit: RateLimitSettings,
}

#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub refill_interval: Duration,
    pub burst: u32,
    pub idle_ttl: Duration,
    pub sweep_schedule: String,
    pub trust_proxy: bool,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            refill_interval: Duration::from_secs(3),
            burst: 1,
            idle_ttl: Duration::from_secs(30 * 60),
            sweep_schedule: "0 */10 * * * *".to_string(),
            trust_proxy: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let port = env_string("PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let host = env_string("HOST")
            .and_then(|value| value.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let database_path = env_string("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_database_path);

        let google = match (
            env_string("GOOGLE_CLIENT_ID"),
            env_string("GOOGLE_CLIENT_SECRET"),
            env_string("GOOGLE_REDIRECT_URL"),
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_url)) => Some(GoogleOAuthConfig {
                client_id,
                client_secret,
                redirect_url,
            }),
            _ => None,
        };

        let defaults = RateLimitSettings::default();
        let rate_limit = RateLimitSettings {
            refill_interval: env_u64("GENERATE_RATE_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.refill_interval),
            burst: env_u64("GENERATE_RATE_BURST")
                .and_then(|v| u32::try_from(v).ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.burst),
            idle_ttl: env_u64("RATE_LIMIT_IDLE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_ttl),
            sweep_schedule: env_string("RATE_LIMIT_SWEEP_SCHEDULE")
                .unwrap_or(defaults.sweep_schedule),
            trust_proxy: env_bool("TRUST_PROXY"),
        };

        Self {
            host,
            port,
            log_level,
            database_path,
            database_max_connections: env_u64("DATABASE_MAX_CONNECTIONS")
                .and_then(|v| u32::try_from(v).ok())
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_MAX_CONNECTIONS),
            batch_size: env_u64("EXERCISE_BATCH_SIZE")
                .and_then(|v| usize::try_from(v).ok())
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_BATCH_SIZE),
            generation_timeout: Duration::from_millis(
                env_u64("GENERATION_TIMEOUT_MS").unwrap_or(DEFAULT_GENERATION_TIMEOUT_MS),
            ),
            refine_timeout: Duration::from_millis(
                env_u64("REFINE_TIMEOUT_MS").unwrap_or(DEFAULT_REFINE_TIMEOUT_MS),
            ),
            static_dir: env_string("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("static")),
            google,
            admin_google_id: env_string("GOOGLE_ADMIN_ID"),
            rate_limit,
        }
    }

    /// Configuration for tests and embedded use: no OAuth, no admin, given database file.
    pub fn for_database(database_path: impl Into<PathBuf>) -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            log_level: "info".to_string(),
            database_path: database_path.into(),
            database_max_connections: DEFAULT_MAX_CONNECTIONS,
            batch_size: DEFAULT_BATCH_SIZE,
            generation_timeout: Duration::from_millis(DEFAULT_GENERATION_TIMEOUT_MS),
            refine_timeout: Duration::from_millis(DEFAULT_REFINE_TIMEOUT_MS),
            static_dir: PathBuf::from("static"),
            google: None,
            admin_google_id: None,
            rate_limit: RateLimitSettings::default(),
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("drill-backend")
        .join("exercises.db")
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    env_string(key)?.trim().parse().ok()
}

fn env_bool(key: &str) -> bool {
    let Some(value) = env_string(key) else { return false };
    !matches!(value.trim().to_ascii_lowercase().as_str(), "0" | "false")
}
