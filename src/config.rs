//! Configuration types for audio-relay

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, path::PathBuf, time::Duration};

/// Environment variable overriding the storage account user
pub const ENV_STORAGE_USER: &str = "AUDIO_RELAY_STORAGE_USER";
/// Environment variable overriding the storage account password
pub const ENV_STORAGE_PASSWORD: &str = "AUDIO_RELAY_STORAGE_PASSWORD";
/// Environment variable overriding the gate store URL
pub const ENV_REDIS_URL: &str = "AUDIO_RELAY_REDIS_URL";

/// Main configuration for [`RelayService`](crate::RelayService)
///
/// Every field has a default, so an empty JSON object is a valid configuration
/// that talks to a local Redis and a local WebDAV server.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Admission gate store
    #[serde(default)]
    pub gate: GateConfig,

    /// Media fetching (staging directory, extractor, retries)
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Remote storage account
    #[serde(default)]
    pub relay: RelayConfig,

    /// Worker pool sizing
    #[serde(default)]
    pub worker: WorkerConfig,

    /// REST API server
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("failed to parse {}: {}", path.display(), e),
            key: None,
        })?;
        Ok(config)
    }

    /// Overlay credentials and endpoints from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Overlay values using an arbitrary variable lookup
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(user) = lookup(ENV_STORAGE_USER) {
            self.relay.username = user;
        }
        if let Some(password) = lookup(ENV_STORAGE_PASSWORD) {
            self.relay.password = password;
        }
        if let Some(url) = lookup(ENV_REDIS_URL) {
            self.gate.redis_url = url;
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.fetch.attempts == 0 {
            return Err(config_error("fetch.attempts must be at least 1", "fetch.attempts"));
        }
        if self.relay.upload_attempts == 0 {
            return Err(config_error(
                "relay.upload_attempts must be at least 1",
                "relay.upload_attempts",
            ));
        }
        if self.relay.default_folder.trim().is_empty() {
            return Err(config_error(
                "relay.default_folder must not be empty",
                "relay.default_folder",
            ));
        }
        if self.worker.max_concurrent_jobs == 0 {
            return Err(config_error(
                "worker.max_concurrent_jobs must be at least 1",
                "worker.max_concurrent_jobs",
            ));
        }
        if self.worker.queue_capacity == 0 {
            return Err(config_error(
                "worker.queue_capacity must be at least 1",
                "worker.queue_capacity",
            ));
        }
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

/// Which store backs the admission gate
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateBackend {
    /// Shared Redis instance (default)
    #[default]
    Redis,
    /// Process-local map, only useful for a single instance or tests
    Memory,
}

/// Admission gate configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GateConfig {
    /// Store implementation (default: redis)
    #[serde(default)]
    pub backend: GateBackend,

    /// Redis connection URL including the database index (default: redis://127.0.0.1:6379/11)
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// How long a gate record lives before it expires (default: 48 hours)
    #[serde(default = "default_retention", with = "duration_serde")]
    pub retention: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            backend: GateBackend::default(),
            redis_url: default_redis_url(),
            retention: default_retention(),
        }
    }
}

/// Media fetch configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Local staging directory for fetched files (default: "data")
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Extraction attempts per link (default: 2)
    #[serde(default = "default_fetch_attempts")]
    pub attempts: u32,

    /// Pause between extraction attempts (default: 9 seconds)
    #[serde(default = "default_fetch_backoff", with = "duration_serde")]
    pub backoff: Duration,

    /// Path to the yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub binary_path: Option<PathBuf>,

    /// Audio container produced by the extractor (default: "mp3")
    #[serde(default = "default_audio_format")]
    pub audio_format: String,

    /// Bitrate used when a job does not specify one (default: "96")
    #[serde(default = "default_bitrate")]
    pub default_bitrate: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            attempts: default_fetch_attempts(),
            backoff: default_fetch_backoff(),
            binary_path: None,
            audio_format: default_audio_format(),
            default_bitrate: default_bitrate(),
        }
    }
}

/// Remote storage configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// WebDAV root of the storage account (default: http://127.0.0.1:8080/remote.php/webdav/)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Account user name
    #[serde(default)]
    pub username: String,

    /// Account password
    #[serde(default)]
    pub password: String,

    /// Folder used when a job leaves the destination empty (default: "temp")
    #[serde(default = "default_folder")]
    pub default_folder: String,

    /// Upload attempts per file (default: 2)
    #[serde(default = "default_upload_attempts")]
    pub upload_attempts: u32,

    /// Pause between upload attempts (default: 18 seconds)
    #[serde(default = "default_upload_backoff", with = "duration_serde")]
    pub upload_backoff: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            username: String::new(),
            password: String::new(),
            default_folder: default_folder(),
            upload_attempts: default_upload_attempts(),
            upload_backoff: default_upload_backoff(),
        }
    }
}

// Hand-written so the password never reaches a log line.
impl std::fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("default_folder", &self.default_folder)
            .field("upload_attempts", &self.upload_attempts)
            .field("upload_backoff", &self.upload_backoff)
            .finish()
    }
}

/// Worker pool configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Jobs running at the same time across all sessions (default: 3)
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Jobs that may wait for a free worker (default: 64)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:5009)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

/// Retry policy shared by the fetch and upload loops
///
/// A fixed pause separates attempts; there is no pause after the last one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,

    /// Pause between two attempts
    pub delay: Duration,
}

impl RetryConfig {
    /// Same pause between every attempt
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

impl FetchConfig {
    /// Retry policy for per-link extraction
    pub fn retry_policy(&self) -> RetryConfig {
        RetryConfig::fixed(self.attempts, self.backoff)
    }
}

impl RelayConfig {
    /// Retry policy for per-file uploads
    pub fn retry_policy(&self) -> RetryConfig {
        RetryConfig::fixed(self.upload_attempts, self.upload_backoff)
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/11".to_string()
}

fn default_retention() -> Duration {
    Duration::from_secs(172_800) // 48 hours
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_fetch_attempts() -> u32 {
    2
}

fn default_fetch_backoff() -> Duration {
    Duration::from_secs(9)
}

fn default_audio_format() -> String {
    "mp3".to_string()
}

fn default_bitrate() -> String {
    "96".to_string()
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080/remote.php/webdav/".to_string()
}

fn default_folder() -> String {
    "temp".to_string()
}

fn default_upload_attempts() -> u32 {
    2
}

fn default_upload_backoff() -> Duration {
    Duration::from_secs(18)
}

fn default_max_concurrent_jobs() -> usize {
    3
}

fn default_queue_capacity() -> usize {
    64
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5009))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_true() -> bool {
    true
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_object_yields_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();

        assert_eq!(config.gate.backend, GateBackend::Redis);
        assert_eq!(config.gate.retention, Duration::from_secs(48 * 3600));
        assert_eq!(config.fetch.attempts, 2);
        assert_eq!(config.fetch.backoff, Duration::from_secs(9));
        assert_eq!(config.fetch.default_bitrate, "96");
        assert_eq!(config.relay.default_folder, "temp");
        assert_eq!(config.relay.upload_attempts, 2);
        assert_eq!(config.relay.upload_backoff, Duration::from_secs(18));
        assert_eq!(config.api.bind_address.port(), 5009);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_durations_are_whole_seconds() {
        let json = r#"{"gate": {"backend": "memory", "retention": 60}, "fetch": {"backoff": 1}}"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.gate.backend, GateBackend::Memory);
        assert_eq!(config.gate.retention, Duration::from_secs(60));
        assert_eq!(config.fetch.backoff, Duration::from_secs(1));

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["gate"]["retention"], 60);
    }

    #[test]
    fn test_negative_duration_rejected() {
        let json = r#"{"relay": {"upload_backoff": -5}}"#;
        assert!(serde_json::from_str::<Config>(json).is_err());
    }

    #[test]
    fn test_env_overlay() {
        let vars: HashMap<&str, &str> = [
            (ENV_STORAGE_USER, "alice@example.com"),
            (ENV_STORAGE_PASSWORD, "hunter2"),
            (ENV_REDIS_URL, "redis://cache:6379/3"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env_from(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.relay.username, "alice@example.com");
        assert_eq!(config.relay.password, "hunter2");
        assert_eq!(config.gate.redis_url, "redis://cache:6379/3");
    }

    #[test]
    fn test_password_redacted_in_debug() {
        let mut config = RelayConfig::default();
        config.password = "hunter2".to_string();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = Config::default();
        config.fetch.attempts = 0;
        match config.validate() {
            Err(Error::Config { key, .. }) => assert_eq!(key.as_deref(), Some("fetch.attempts")),
            other => panic!("expected config error, got {:?}", other),
        }

        let mut config = Config::default();
        config.relay.default_folder = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.worker.max_concurrent_jobs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio-relay.json");
        std::fs::write(&path, r#"{"relay": {"default_folder": "music"}}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.relay.default_folder, "music");

        let missing = Config::load(&dir.path().join("missing.json"));
        assert!(matches!(missing, Err(Error::Config { .. })));
    }

    #[test]
    fn test_retry_policies_are_fixed() {
        let config = Config::default();
        let fetch = config.fetch.retry_policy();
        assert_eq!(fetch.max_attempts, 2);
        assert_eq!(fetch.delay, Duration::from_secs(9));

        let upload = config.relay.retry_policy();
        assert_eq!(upload.max_attempts, 2);
        assert_eq!(upload.delay, Duration::from_secs(18));
    }
}
