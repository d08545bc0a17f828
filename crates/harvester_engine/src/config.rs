use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use harvester_core::Platform;
use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "https://api.apify.com/v2";
pub const DEFAULT_ACTOR_ID: &str = "apify/instagram-scraper";
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Everything one harvest run needs, supplied by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct HarvestConfig {
    pub service: ServiceConfig,
    pub output: OutputLayout,
    #[serde(default)]
    pub download: DownloadSettings,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Forces one platform's field table instead of detecting it per item.
    #[serde(default)]
    pub platform_hint: Option<Platform>,
}

fn default_worker_count() -> usize {
    DEFAULT_WORKER_COUNT
}

impl HarvestConfig {
    /// Defaults with `images/` and `data/` laid out under `base_dir`.
    pub fn default_with_output(base_dir: impl AsRef<Path>, service: ServiceConfig) -> Self {
        Self {
            service,
            output: OutputLayout::under(base_dir),
            download: DownloadSettings::default(),
            retry: RetryPolicy::default(),
            worker_count: DEFAULT_WORKER_COUNT,
            platform_hint: None,
        }
    }
}

/// Remote scraping service connection and polling settings.
#[derive(Clone, Deserialize)]
pub struct ServiceConfig {
    pub api_token: String,
    #[serde(default = "default_actor_id")]
    pub actor_id: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Upper bound on waiting for a run to reach a terminal status.
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
    /// Server-side long-poll per status request (`waitForFinish`).
    #[serde(default = "default_poll_wait_secs")]
    pub poll_wait_secs: u64,
    /// Pause between status requests.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_actor_id() -> String {
    DEFAULT_ACTOR_ID.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_max_wait_secs() -> u64 {
    600
}

fn default_poll_wait_secs() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_request_timeout_secs() -> u64 {
    90
}

impl ServiceConfig {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            actor_id: default_actor_id(),
            base_url: default_base_url(),
            max_wait_secs: default_max_wait_secs(),
            poll_wait_secs: default_poll_wait_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("api_token", &"<redacted>")
            .field("actor_id", &self.actor_id)
            .field("base_url", &self.base_url)
            .field("max_wait_secs", &self.max_wait_secs)
            .field("poll_wait_secs", &self.poll_wait_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Where images and metadata files land.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutputLayout {
    pub images_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl OutputLayout {
    pub fn under(base_dir: impl AsRef<Path>) -> Self {
        let base = base_dir.as_ref();
        Self {
            images_dir: base.join("images"),
            data_dir: base.join("data"),
        }
    }
}

/// HTTP limits for image downloads.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub redirect_limit: usize,
    pub max_bytes: u64,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            redirect_limit: 5,
            max_bytes: 25 * 1024 * 1024,
        }
    }
}

impl DownloadSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Exponential backoff for transient download failures.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): initial × 2^(retry-1), capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(20);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}
