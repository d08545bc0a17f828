use std::time::Instant;

use harvest_logging::{harvest_debug, harvest_info};
use harvester_core::{RawResultItem, ScrapeRequest};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ServiceConfig;

pub type ScrapeResult<T> = std::result::Result<T, ScrapeError>;

/// Job-level failures. Every variant aborts the batch.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("submission rejected: {0}")]
    Submission(String),

    #[error("run {run_id} did not finish within {waited_secs}s")]
    RemoteTimeout { run_id: String, waited_secs: u64 },

    #[error("run {run_id} ended with status {status}")]
    RunFailed { run_id: String, status: String },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Transport(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for ScrapeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ScrapeError::Parse(err.to_string())
        } else {
            ScrapeError::Transport(err.to_string())
        }
    }
}

/// Handle to one submitted remote run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeJob {
    run_id: String,
    dataset_id: String,
    limit: u32,
}

impl ScrapeJob {
    pub fn new(run_id: impl Into<String>, dataset_id: impl Into<String>, limit: u32) -> Self {
        Self {
            run_id: run_id.into(),
            dataset_id: dataset_id.into(),
            limit,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}

/// Remote scraping service: one job per `submit`, collected once.
#[async_trait::async_trait]
pub trait ScrapeService: Send + Sync {
    async fn submit(&self, request: &ScrapeRequest) -> ScrapeResult<ScrapeJob>;

    /// Waits for the job to finish and returns at most `job.limit()` items in
    /// the order the service produced them.
    async fn collect(&self, job: ScrapeJob) -> ScrapeResult<Vec<RawResultItem>>;
}

/// Input accepted by the Apify social scrapers.
#[derive(Debug, Clone, Serialize)]
struct ActorInput<'a> {
    #[serde(rename = "directUrls")]
    direct_urls: &'a [String],
    #[serde(rename = "resultsLimit")]
    results_limit: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiResponse<T> {
    data: T,
}

/// Apify actor run metadata.
#[derive(Debug, Clone, Deserialize)]
struct RunData {
    id: String,
    status: String,
    #[serde(rename = "defaultDatasetId", default)]
    default_dataset_id: String,
}

/// Apify REST client for a single actor.
pub struct ApifyJobClient {
    client: reqwest::Client,
    config: ServiceConfig,
}

impl ApifyJobClient {
    pub fn new(config: ServiceConfig) -> ScrapeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    /// `owner/name` actor ids are addressed as `owner~name` in URLs.
    fn actor_path(&self) -> String {
        self.config.actor_id.replace('/', "~")
    }

    async fn poll_run(&self, run_id: &str, wait_secs: u64) -> ScrapeResult<RunData> {
        let url = format!(
            "{}/actor-runs/{}?waitForFinish={}",
            self.base_url(),
            run_id,
            wait_secs
        );
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.config.api_token)
            .send()
            .await?;
        let resp = check_status(resp).await?;
        let api_resp: ApiResponse<RunData> = resp.json().await?;
        Ok(api_resp.data)
    }
}

async fn check_status(resp: reqwest::Response) -> ScrapeResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(ScrapeError::Auth(format!("status {}: {}", status.as_u16(), body)));
    }
    Err(ScrapeError::Api {
        status: status.as_u16(),
        message: body,
    })
}

#[async_trait::async_trait]
impl ScrapeService for ApifyJobClient {
    async fn submit(&self, request: &ScrapeRequest) -> ScrapeResult<ScrapeJob> {
        if self.config.api_token.trim().is_empty() {
            return Err(ScrapeError::Auth("missing API token".to_string()));
        }
        if request.is_empty() {
            return Err(ScrapeError::Submission("no target URLs".to_string()));
        }

        let input = ActorInput {
            direct_urls: request.urls(),
            results_limit: request.limit(),
        };
        harvest_info!(
            "Starting actor {} for {} URL(s), limit {}",
            self.config.actor_id,
            request.urls().len(),
            request.limit()
        );

        let url = format!("{}/acts/{}/runs", self.base_url(), self.actor_path());
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_token)
            .json(&input)
            .send()
            .await?;

        let resp = check_status(resp).await.map_err(|err| match err {
            ScrapeError::Api { status, message } => {
                ScrapeError::Submission(format!("status {status}: {message}"))
            }
            other => other,
        })?;

        let api_resp: ApiResponse<RunData> = resp.json().await?;
        let run = api_resp.data;
        harvest_info!("Apify run {} started, status {}", run.id, run.status);
        Ok(ScrapeJob::new(run.id, run.default_dataset_id, request.limit()))
    }

    async fn collect(&self, job: ScrapeJob) -> ScrapeResult<Vec<RawResultItem>> {
        let max_wait = self.config.max_wait();
        let started = Instant::now();

        let run = loop {
            let remaining = max_wait.saturating_sub(started.elapsed());
            let wait_secs = remaining.as_secs().min(self.config.poll_wait_secs);
            let run = self.poll_run(job.run_id(), wait_secs).await?;
            match run.status.as_str() {
                "SUCCEEDED" => break run,
                "FAILED" | "ABORTED" | "TIMED-OUT" => {
                    return Err(ScrapeError::RunFailed {
                        run_id: run.id,
                        status: run.status,
                    });
                }
                _ => {
                    if started.elapsed() >= max_wait {
                        return Err(ScrapeError::RemoteTimeout {
                            run_id: run.id,
                            waited_secs: max_wait.as_secs(),
                        });
                    }
                    harvest_debug!("Run {} still {}", run.id, run.status);
                    tokio::time::sleep(self.config.poll_interval()).await;
                }
            }
        };

        // The run response is authoritative for the dataset once it finished.
        let dataset_id = if run.default_dataset_id.is_empty() {
            job.dataset_id().to_string()
        } else {
            run.default_dataset_id
        };
        let url = format!(
            "{}/datasets/{}/items?format=json&clean=true&limit={}",
            self.base_url(),
            dataset_id,
            job.limit()
        );
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.config.api_token)
            .send()
            .await?;
        let resp = check_status(resp).await?;

        let mut items: Vec<RawResultItem> = resp.json().await?;
        items.truncate(job.limit() as usize);
        harvest_info!("Fetched {} item(s) from run {}", items.len(), job.run_id());
        Ok(items)
    }
}
