//! Harvester engine: scrape jobs, image downloads and metadata persistence.
mod config;
mod download;
mod engine;
mod fetch;
mod metadata;
mod orchestrator;
mod persist;
mod progress;
mod scrape;
mod types;

pub use config::{
    DownloadSettings, HarvestConfig, OutputLayout, RetryPolicy, ServiceConfig, DEFAULT_ACTOR_ID,
    DEFAULT_BASE_URL, DEFAULT_WORKER_COUNT,
};
pub use download::AssetDownloader;
pub use engine::EngineHandle;
pub use fetch::{Fetcher, ReqwestFetcher};
pub use metadata::{ImageEntry, ImageEntryStatus, MetadataDocument, MetadataFile, MetadataSerializer};
pub use orchestrator::{Clock, HarvestError, HarvestOrchestrator};
pub use persist::{ensure_output_dir, AtomicFileWriter, ExistingFile, PersistError};
pub use progress::{ChannelProgressSink, NoopProgressSink, ProgressSink};
pub use scrape::{ApifyJobClient, ScrapeError, ScrapeJob, ScrapeResult, ScrapeService};
pub use types::{
    AssetFetchError, DownloadError, FailureKind, FetchError, FetchOutput, HarvestEvent,
    StoredAsset,
};

pub use tokio_util::sync::CancellationToken;
