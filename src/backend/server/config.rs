/**
 * Server Configuration
 *
 * Loaded from environment variables (a `.env` file is read by the binary
 * before this runs).
 *
 * | Variable | Default |
 * |---|---|
 * | `SERVER_HOST` | `0.0.0.0` |
 * | `SERVER_PORT` | `8000` |
 * | `DATABASE_URL` | unset, in-memory store |
 * | `JWT_SECRET` | required |
 * | `MEDIA_ROOT` | `media` |
 * | `SITE_URL` | `http://localhost:8000` |
 * | `MEDIA_URL` | `/media/` |
 * | `FFMPEG_BIN` | `ffmpeg` |
 * | `FFPROBE_BIN` | `ffprobe` |
 * | `AUDIOWAVEFORM_BIN` | `audiowaveform` |
 * | `TRANSCODE_TIMEOUT_SECS` | `60` |
 * | `WAVEFORM_MAX_SAMPLES` | `256` |
 * | `OUTBOUND_QUEUE_CAPACITY` | `64` |
 * | `DELIVERY_TIMEOUT_SECS` | `10` |
 *
 * # Error Handling
 *
 * A missing `JWT_SECRET` is the only fatal error. Numeric values that fail
 * to parse are logged and replaced by their default.
 */

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::error::BackendError;
use crate::backend::realtime::gateway::DEFAULT_QUEUE_CAPACITY;
use crate::backend::realtime::DEFAULT_SEND_TIMEOUT;
use crate::backend::store::{InMemoryStore, PgStore, Store};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_MEDIA_ROOT: &str = "media";
pub const DEFAULT_SITE_URL: &str = "http://localhost:8000";
pub const DEFAULT_MEDIA_URL: &str = "/media/";
pub const DEFAULT_TRANSCODE_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_WAVEFORM_MAX_SAMPLES: usize = 256;

/// Everything the server needs to start
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// PostgreSQL URL; `None` selects the in-memory store
    pub database_url: Option<String>,
    pub jwt_secret: String,
    /// Directory media references are resolved against
    pub media_root: PathBuf,
    /// Public origin used to build absolute media URLs
    pub site_url: String,
    /// Path media files are served under
    pub media_url: String,
    pub ffmpeg_bin: PathBuf,
    pub ffprobe_bin: PathBuf,
    pub audiowaveform_bin: PathBuf,
    pub transcode_timeout: Duration,
    pub waveform_max_samples: usize,
    pub outbound_queue_capacity: usize,
    /// How long a publish waits on a full queue before evicting the session
    pub delivery_timeout: Duration,
}

impl ServerConfig {
    /// Defaults for everything except the secret
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database_url: None,
            jwt_secret: jwt_secret.into(),
            media_root: PathBuf::from(DEFAULT_MEDIA_ROOT),
            site_url: DEFAULT_SITE_URL.to_string(),
            media_url: DEFAULT_MEDIA_URL.to_string(),
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            ffprobe_bin: PathBuf::from("ffprobe"),
            audiowaveform_bin: PathBuf::from("audiowaveform"),
            transcode_timeout: Duration::from_secs(DEFAULT_TRANSCODE_TIMEOUT_SECS),
            waveform_max_samples: DEFAULT_WAVEFORM_MAX_SAMPLES,
            outbound_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            delivery_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Read the configuration from the process environment
    ///
    /// # Errors
    ///
    /// `BackendError::Config` if `JWT_SECRET` is unset or empty
    pub fn from_env() -> Result<Self, BackendError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BackendError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = var("JWT_SECRET")
            .ok_or_else(|| BackendError::config("JWT_SECRET must be set"))?;
        let mut config = Self::new(jwt_secret);

        if let Some(host) = var("SERVER_HOST") {
            config.host = host;
        }
        config.port = parse_or("SERVER_PORT", var("SERVER_PORT"), DEFAULT_PORT);
        config.database_url = var("DATABASE_URL");
        if let Some(root) = var("MEDIA_ROOT") {
            config.media_root = PathBuf::from(root);
        }
        if let Some(site) = var("SITE_URL") {
            config.site_url = site;
        }
        if let Some(media) = var("MEDIA_URL") {
            config.media_url = media;
        }
        if let Some(bin) = var("FFMPEG_BIN") {
            config.ffmpeg_bin = PathBuf::from(bin);
        }
        if let Some(bin) = var("FFPROBE_BIN") {
            config.ffprobe_bin = PathBuf::from(bin);
        }
        if let Some(bin) = var("AUDIOWAVEFORM_BIN") {
            config.audiowaveform_bin = PathBuf::from(bin);
        }
        config.transcode_timeout = Duration::from_secs(parse_or(
            "TRANSCODE_TIMEOUT_SECS",
            var("TRANSCODE_TIMEOUT_SECS"),
            DEFAULT_TRANSCODE_TIMEOUT_SECS,
        ));
        config.waveform_max_samples = parse_or(
            "WAVEFORM_MAX_SAMPLES",
            var("WAVEFORM_MAX_SAMPLES"),
            DEFAULT_WAVEFORM_MAX_SAMPLES,
        )
        .max(1);
        config.outbound_queue_capacity = parse_or(
            "OUTBOUND_QUEUE_CAPACITY",
            var("OUTBOUND_QUEUE_CAPACITY"),
            DEFAULT_QUEUE_CAPACITY,
        )
        .max(1);
        config.delivery_timeout = Duration::from_secs(
            parse_or(
                "DELIVERY_TIMEOUT_SECS",
                var("DELIVERY_TIMEOUT_SECS"),
                DEFAULT_SEND_TIMEOUT.as_secs(),
            )
            .max(1),
        );

        Ok(config)
    }

    /// Socket address string for the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(key: &str, value: Option<String>, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match value {
        None => default,
        Some(raw) => match raw.parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::warn!("[Server] Invalid {}={:?}, using {}", key, raw, default);
                default
            }
        },
    }
}

/// Open the configured store
///
/// Connects to PostgreSQL and runs migrations when `database_url` is set,
/// otherwise falls back to the in-memory store.
pub async fn load_store(config: &ServerConfig) -> Result<Arc<dyn Store>, BackendError> {
    match &config.database_url {
        Some(url) => {
            tracing::info!("[Server] Connecting to database...");
            let store = PgStore::connect(url).await?;
            tracing::info!("[Server] Database ready, migrations applied");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("[Server] DATABASE_URL not set. Using the in-memory store; data is lost on restart.");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}
