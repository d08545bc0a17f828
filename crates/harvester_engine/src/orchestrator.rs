use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::join_all;
use harvest_logging::{harvest_error, harvest_info, harvest_warn};
use harvester_core::{
    BatchStage, BatchSummary, CaptureTimestamp, ImageAsset, ImageOutcome, PostReport, PostStage,
    RawResultItem, ResultNormalizer, ScrapeRequest, SequenceIndex,
};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::{HarvestConfig, OutputLayout};
use crate::download::AssetDownloader;
use crate::fetch::ReqwestFetcher;
use crate::metadata::MetadataSerializer;
use crate::progress::{NoopProgressSink, ProgressSink};
use crate::scrape::{ApifyJobClient, ScrapeError, ScrapeService};
use crate::HarvestEvent;

/// Source of capture timestamps, one call per post.
pub type Clock = Arc<dyn Fn() -> CaptureTimestamp + Send + Sync>;

/// Batch-level failures; nothing is written when one of these is returned
/// before processing starts.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error(transparent)]
    Scrape(#[from] ScrapeError),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("harvest cancelled")]
    Cancelled,
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Drives one batch: submit, collect, then normalize, download and serialize
/// every post with per-post failure isolation.
pub struct HarvestOrchestrator {
    scraper: Arc<dyn ScrapeService>,
    downloader: AssetDownloader,
    serializer: MetadataSerializer,
    normalizer: ResultNormalizer,
    images_dir: PathBuf,
    workers: Arc<Semaphore>,
    clock: Clock,
    sink: Arc<dyn ProgressSink>,
}

impl HarvestOrchestrator {
    pub fn new(
        scraper: Arc<dyn ScrapeService>,
        downloader: AssetDownloader,
        output: &OutputLayout,
        worker_count: usize,
    ) -> Self {
        Self {
            scraper,
            downloader,
            serializer: MetadataSerializer::new(output.data_dir.clone()),
            normalizer: ResultNormalizer::new(),
            images_dir: output.images_dir.clone(),
            workers: Arc::new(Semaphore::new(worker_count.max(1))),
            clock: Arc::new(CaptureTimestamp::now),
            sink: Arc::new(NoopProgressSink),
        }
    }

    /// Production wiring: Apify client and reqwest-backed downloads.
    pub fn from_config(config: &HarvestConfig) -> Result<Self, HarvestError> {
        if config.worker_count == 0 {
            return Err(HarvestError::Config(
                "worker_count must be at least 1".to_string(),
            ));
        }
        if config.service.poll_wait_secs >= config.service.request_timeout_secs {
            return Err(HarvestError::Config(format!(
                "poll_wait_secs ({}) must be shorter than request_timeout_secs ({})",
                config.service.poll_wait_secs, config.service.request_timeout_secs
            )));
        }
        let scraper = ApifyJobClient::new(config.service.clone())?;
        let fetcher = ReqwestFetcher::new(&config.download)
            .map_err(|err| HarvestError::Config(err.to_string()))?;
        let downloader = AssetDownloader::new(Arc::new(fetcher), config.retry.clone());
        let normalizer = config
            .platform_hint
            .map(ResultNormalizer::with_platform)
            .unwrap_or_default();

        Ok(
            Self::new(Arc::new(scraper), downloader, &config.output, config.worker_count)
                .with_normalizer(normalizer),
        )
    }

    pub fn with_normalizer(mut self, normalizer: ResultNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Run one batch to completion.
    pub async fn run(&self, request: &ScrapeRequest) -> Result<BatchSummary, HarvestError> {
        self.sink.emit(HarvestEvent::Batch(BatchStage::Submitted));
        let job = self.scraper.submit(request).await?;
        let run_id = job.run_id().to_string();

        self.sink.emit(HarvestEvent::Batch(BatchStage::Collecting));
        let items = self.scraper.collect(job).await?;
        harvest_info!("Run {} returned {} post(s)", run_id, items.len());

        // Sequence indices are fixed here, in arrival order.
        self.sink.emit(HarvestEvent::Batch(BatchStage::Processing));
        let posts = items
            .into_iter()
            .zip(1..)
            .map(|(raw, sequence_index)| self.process_post(sequence_index, raw));
        let reports = join_all(posts).await;

        let summary = BatchSummary::from_reports(run_id, &reports);
        self.sink.emit(HarvestEvent::Batch(BatchStage::Done));
        harvest_info!(
            "Run {} done: {} post(s) written, {} failed, {} image(s) stored, {} failed",
            summary.run_id,
            summary.posts_written,
            summary.posts_failed,
            summary.images_succeeded,
            summary.images_failed
        );
        Ok(summary)
    }

    /// Like [`run`](Self::run), abandoning in-flight work when `cancel` fires.
    ///
    /// A write already handed to the blocking pool runs to its rename; every
    /// other abandoned download drops its temp file, so no partial image or
    /// metadata file is left behind.
    pub async fn run_until_cancelled(
        &self,
        request: &ScrapeRequest,
        cancel: &CancellationToken,
    ) -> Result<BatchSummary, HarvestError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                harvest_warn!("Harvest cancelled; abandoning in-flight work");
                Err(HarvestError::Cancelled)
            }
            result = self.run(request) => result,
        }
    }

    async fn process_post(
        &self,
        sequence_index: SequenceIndex,
        raw: RawResultItem,
    ) -> PostReport {
        let report = self.process_post_stages(sequence_index, raw).await;
        self.emit_post(sequence_index, PostStage::Done);
        self.sink.emit(HarvestEvent::PostFinished {
            sequence_index,
            written: report.is_written(),
        });
        report
    }

    async fn process_post_stages(
        &self,
        sequence_index: SequenceIndex,
        raw: RawResultItem,
    ) -> PostReport {
        self.emit_post(sequence_index, PostStage::Normalizing);
        let timestamp = (self.clock)();
        let record = match self.normalizer.normalize(raw, sequence_index, timestamp) {
            Ok(record) => record,
            Err(err) => {
                harvest_warn!("Skipping post {}: {}", sequence_index, err);
                return PostReport::failed(
                    sequence_index,
                    PostStage::Normalizing,
                    err.to_string(),
                    &[],
                );
            }
        };

        self.emit_post(sequence_index, PostStage::Downloading);
        let assets = record.image_assets();
        if assets.is_empty() {
            harvest_info!("Post {} has no images", sequence_index);
        }
        let outcomes = join_all(assets.into_iter().map(|asset| self.download_image(asset))).await;
        if !outcomes.is_empty() && outcomes.iter().all(|outcome| !outcome.is_success()) {
            harvest_warn!(
                "All {} image(s) of post {} failed to download",
                outcomes.len(),
                sequence_index
            );
        }

        self.emit_post(sequence_index, PostStage::Serializing);
        match self.serializer.write(&record, &outcomes).await {
            Ok(file) => {
                harvest_info!("Wrote {}", file.path.display());
                PostReport::written(sequence_index, file.filename, &outcomes)
            }
            Err(err) => {
                harvest_error!("Metadata for post {} not written: {}", sequence_index, err);
                PostReport::failed(
                    sequence_index,
                    PostStage::Serializing,
                    err.to_string(),
                    &outcomes,
                )
            }
        }
    }

    async fn download_image(&self, asset: ImageAsset) -> ImageOutcome {
        let sequence_index = asset.sequence_index;
        let ordinal = asset.ordinal;

        let outcome = match self.workers.acquire().await {
            Ok(_permit) => {
                let destination = self.images_dir.join(asset.filename());
                match self.downloader.download(&asset.source_url, &destination).await {
                    Ok(stored) => ImageOutcome::stored(asset, stored.bytes, stored.sha256),
                    Err(err) => ImageOutcome::failed(asset, err.to_string()),
                }
            }
            Err(err) => ImageOutcome::failed(asset, err.to_string()),
        };

        self.sink.emit(HarvestEvent::ImageFinished {
            sequence_index,
            ordinal,
            success: outcome.is_success(),
        });
        outcome
    }

    fn emit_post(&self, sequence_index: SequenceIndex, stage: PostStage) {
        self.sink.emit(HarvestEvent::Post {
            sequence_index,
            stage,
        });
    }
}
