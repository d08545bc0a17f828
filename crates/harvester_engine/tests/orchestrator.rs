use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use harvester_core::{BatchStage, CaptureTimestamp, RawResultItem, ScrapeRequest};
use harvester_engine::{
    AssetDownloader, Clock, DownloadSettings, EngineHandle, FetchError, FetchOutput, Fetcher,
    HarvestConfig, HarvestError, HarvestEvent, HarvestOrchestrator, OutputLayout, ProgressSink,
    ReqwestFetcher, RetryPolicy, ScrapeError, ScrapeJob, ScrapeResult, ScrapeService,
    ServiceConfig,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STAMP: &str = "20250102_030405";

fn fixed_clock() -> Clock {
    Arc::new(|| CaptureTimestamp::new(Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap()))
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        initial_backoff_ms: 1,
        max_backoff_ms: 2,
    }
}

fn config(server: &MockServer, base: &Path, token: &str) -> HarvestConfig {
    let service = ServiceConfig {
        base_url: format!("{}/v2", server.uri()),
        max_wait_secs: 5,
        poll_wait_secs: 0,
        poll_interval_ms: 10,
        ..ServiceConfig::new(token)
    };
    HarvestConfig {
        retry: fast_retry(),
        ..HarvestConfig::default_with_output(base, service)
    }
}

async fn mount_apify(server: &MockServer, items: Value) {
    Mock::given(method("POST"))
        .and(path("/v2/acts/apify~instagram-scraper/runs"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "data": {"id": "run-9", "status": "READY", "defaultDatasetId": "ds-9"}
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/actor-runs/run-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"id": "run-9", "status": "SUCCEEDED", "defaultDatasetId": "ds-9"}
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/datasets/ds-9/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(items))
        .mount(server)
        .await;
}

async fn mount_image(server: &MockServer, image_path: &str, status: u16, body: &'static [u8]) {
    Mock::given(method("GET"))
        .and(path(image_path))
        .respond_with(ResponseTemplate::new(status).set_body_bytes(body))
        .mount(server)
        .await;
}

fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Returns canned items without talking to any service.
struct CannedScraper {
    items: Vec<Value>,
    collect_delay: Duration,
}

impl CannedScraper {
    fn new(items: Vec<Value>) -> Self {
        Self {
            items,
            collect_delay: Duration::ZERO,
        }
    }
}

#[async_trait::async_trait]
impl ScrapeService for CannedScraper {
    async fn submit(&self, request: &ScrapeRequest) -> ScrapeResult<ScrapeJob> {
        Ok(ScrapeJob::new("canned-run", "canned-ds", request.limit()))
    }

    async fn collect(&self, job: ScrapeJob) -> ScrapeResult<Vec<RawResultItem>> {
        tokio::time::sleep(self.collect_delay).await;
        Ok(self
            .items
            .iter()
            .take(job.limit() as usize)
            .cloned()
            .map(RawResultItem::new)
            .collect())
    }
}

#[derive(Default)]
struct TestSink {
    events: Mutex<Vec<HarvestEvent>>,
}

impl TestSink {
    fn take(&self) -> Vec<HarvestEvent> {
        self.events.lock().unwrap().drain(..).collect()
    }
}

impl ProgressSink for TestSink {
    fn emit(&self, event: HarvestEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Serves a small image after a pause and records the most fetches seen at once.
#[derive(Default)]
struct OverlapFetcher {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait::async_trait]
impl Fetcher for OverlapFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchOutput, FetchError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(FetchOutput {
            bytes: Bytes::from_static(b"\xff\xd8img"),
            final_url: url.to_string(),
            content_type: Some("image/jpeg".to_string()),
        })
    }
}

fn canned_orchestrator(base: &Path, items: Vec<Value>) -> HarvestOrchestrator {
    let fetcher = ReqwestFetcher::new(&DownloadSettings::default()).unwrap();
    let downloader = AssetDownloader::new(Arc::new(fetcher), fast_retry());
    HarvestOrchestrator::new(
        Arc::new(CannedScraper::new(items)),
        downloader,
        &OutputLayout::under(base),
        4,
    )
    .with_clock(fixed_clock())
}

#[tokio::test]
async fn single_post_with_two_images_is_fully_harvested() {
    harvest_logging::initialize_for_tests();
    let server = MockServer::start().await;
    mount_apify(
        &server,
        json!([{
            "url": "https://platform/p/abc",
            "images": [
                format!("{}/img/1.jpg", server.uri()),
                format!("{}/img/2.jpg", server.uri())
            ]
        }]),
    )
    .await;
    mount_image(&server, "/img/1.jpg", 200, b"\xff\xd8first").await;
    mount_image(&server, "/img/2.jpg", 200, b"\xff\xd8second").await;

    let temp = TempDir::new().unwrap();
    let orchestrator = HarvestOrchestrator::from_config(&config(&server, temp.path(), "token"))
        .unwrap()
        .with_clock(fixed_clock());
    let request = ScrapeRequest::new(["https://platform/p/abc"], 1).unwrap();

    let summary = orchestrator.run(&request).await.unwrap();

    assert_eq!(summary.run_id, "run-9");
    assert_eq!(summary.posts_received, 1);
    assert_eq!(summary.posts_written, 1);
    assert_eq!(summary.images_succeeded, 2);
    assert_eq!(summary.images_failed, 0);

    let images = temp.path().join("images");
    assert_eq!(
        file_names(&images),
        vec![
            format!("post_1_{STAMP}_img1.jpg"),
            format!("post_1_{STAMP}_img2.jpg")
        ]
    );
    assert_eq!(
        fs::read(images.join(format!("post_1_{STAMP}_img2.jpg"))).unwrap(),
        b"\xff\xd8second"
    );

    let metadata = read_json(
        &temp
            .path()
            .join("data")
            .join(format!("post_1_{STAMP}_metadata.json")),
    );
    let statuses: Vec<&str> = metadata["images"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["status"].as_str().unwrap())
        .collect();
    assert_eq!(statuses, vec!["success", "success"]);
}

#[tokio::test]
async fn missing_image_is_recorded_as_failed() {
    let server = MockServer::start().await;
    mount_apify(
        &server,
        json!([{
            "url": "https://platform/p/abc",
            "images": [
                format!("{}/img/ok.jpg", server.uri()),
                format!("{}/img/missing.jpg", server.uri())
            ]
        }]),
    )
    .await;
    mount_image(&server, "/img/ok.jpg", 200, b"\xff\xd8ok").await;
    Mock::given(method("GET"))
        .and(path("/img/missing.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let orchestrator = HarvestOrchestrator::from_config(&config(&server, temp.path(), "token"))
        .unwrap()
        .with_clock(fixed_clock());
    let request = ScrapeRequest::new(["https://platform/p/abc"], 1).unwrap();

    let summary = orchestrator.run(&request).await.unwrap();

    assert_eq!(summary.posts_written, 1);
    assert_eq!(summary.images_succeeded, 1);
    assert_eq!(summary.images_failed, 1);
    assert_eq!(
        file_names(&temp.path().join("images")),
        vec![format!("post_1_{STAMP}_img1.jpg")]
    );

    let metadata = read_json(
        &temp
            .path()
            .join("data")
            .join(format!("post_1_{STAMP}_metadata.json")),
    );
    let images = metadata["images"].as_array().unwrap();
    assert_eq!(images[0]["status"], json!("success"));
    assert_eq!(images[1]["status"], json!("failed"));
    assert_eq!(images[1]["stored_filename"], Value::Null);
    assert_eq!(images[1]["ordinal"], json!(2));
}

#[tokio::test]
async fn invalid_credential_writes_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let orchestrator =
        HarvestOrchestrator::from_config(&config(&server, temp.path(), "revoked")).unwrap();
    let request = ScrapeRequest::new(["https://platform/p/abc"], 1).unwrap();

    let err = orchestrator.run(&request).await.unwrap_err();

    assert!(matches!(err, HarvestError::Scrape(ScrapeError::Auth(_))));
    assert!(!temp.path().join("images").exists());
    assert!(!temp.path().join("data").exists());
}

#[test]
fn long_poll_must_fit_inside_the_request_timeout() {
    let temp = TempDir::new().unwrap();
    let service = ServiceConfig {
        poll_wait_secs: 90,
        request_timeout_secs: 90,
        ..ServiceConfig::new("token")
    };
    let config = HarvestConfig::default_with_output(temp.path(), service);

    let err = HarvestOrchestrator::from_config(&config).err().unwrap();

    assert!(matches!(err, HarvestError::Config(message) if message.contains("poll_wait_secs")));
}

#[tokio::test]
async fn failing_post_does_not_affect_its_neighbours() {
    let server = MockServer::start().await;
    mount_image(&server, "/1.jpg", 200, b"\xff\xd8one").await;
    mount_image(&server, "/3.jpg", 200, b"\xff\xd8three").await;
    Mock::given(method("GET"))
        .and(path("/2.jpg"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let items = vec![
        json!({"url": "https://www.instagram.com/p/1/", "images": [format!("{}/1.jpg", server.uri())]}),
        json!({"url": "https://www.instagram.com/p/2/", "images": [format!("{}/2.jpg", server.uri())]}),
        json!({"url": "https://www.instagram.com/p/3/", "images": [format!("{}/3.jpg", server.uri())]}),
    ];

    let temp = TempDir::new().unwrap();
    // Occupy post 2's metadata path so its serialization fails too.
    let data = temp.path().join("data");
    fs::create_dir_all(data.join(format!("post_2_{STAMP}_metadata.json"))).unwrap();

    let sink = Arc::new(TestSink::default());
    let orchestrator = canned_orchestrator(temp.path(), items).with_sink(sink.clone());
    let request = ScrapeRequest::new(["https://www.instagram.com/p/1/"], 3).unwrap();

    let summary = orchestrator.run(&request).await.unwrap();

    assert_eq!(summary.posts_received, 3);
    assert_eq!(summary.posts_written, 2);
    assert_eq!(summary.posts_failed, 1);
    assert_eq!(summary.failures[0].sequence_index, 2);
    assert_eq!(summary.images_succeeded, 2);
    assert_eq!(summary.images_failed, 1);

    for seq in [1, 3] {
        let metadata = read_json(&data.join(format!("post_{seq}_{STAMP}_metadata.json")));
        assert_eq!(metadata["sequence_index"], json!(seq));
        assert_eq!(metadata["images"][0]["status"], json!("success"));
        assert_eq!(
            metadata["images"][0]["stored_filename"],
            json!(format!("post_{seq}_{STAMP}_img1.jpg"))
        );
    }
    assert_eq!(
        file_names(&temp.path().join("images")),
        vec![
            format!("post_1_{STAMP}_img1.jpg"),
            format!("post_3_{STAMP}_img1.jpg")
        ]
    );

    let events = sink.take();
    let batch_stages: Vec<BatchStage> = events
        .iter()
        .filter_map(|event| match event {
            HarvestEvent::Batch(stage) => Some(*stage),
            _ => None,
        })
        .collect();
    assert_eq!(
        batch_stages,
        vec![
            BatchStage::Submitted,
            BatchStage::Collecting,
            BatchStage::Processing,
            BatchStage::Done
        ]
    );
    assert!(events.contains(&HarvestEvent::PostFinished {
        sequence_index: 2,
        written: false
    }));
}

#[tokio::test]
async fn downloads_never_exceed_the_worker_count() {
    let items: Vec<Value> = (1..=3)
        .map(|post| {
            let images: Vec<String> = (1..=4)
                .map(|n| format!("https://cdn.example/{post}/{n}.jpg"))
                .collect();
            json!({"url": format!("https://platform/p/{post}"), "images": images})
        })
        .collect();
    let fetcher = Arc::new(OverlapFetcher::default());
    let temp = TempDir::new().unwrap();
    let orchestrator = HarvestOrchestrator::new(
        Arc::new(CannedScraper::new(items)),
        AssetDownloader::new(fetcher.clone(), fast_retry()),
        &OutputLayout::under(temp.path()),
        3,
    )
    .with_clock(fixed_clock());
    let request = ScrapeRequest::new(["https://platform/p/1"], 3).unwrap();

    let summary = orchestrator.run(&request).await.unwrap();

    assert_eq!(summary.images_succeeded, 12);
    assert_eq!(file_names(&temp.path().join("images")).len(), 12);
    let peak = fetcher.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "{peak} fetches overlapped with 3 workers");
    assert!(peak > 1, "downloads ran one at a time");
}

#[tokio::test]
async fn non_object_items_are_skipped_and_keep_their_index() {
    let server = MockServer::start().await;
    mount_image(&server, "/b.jpg", 200, b"\xff\xd8b").await;

    let items = vec![
        json!("unexpected string"),
        json!({"url": "https://www.instagram.com/p/b/", "displayUrl": format!("{}/b.jpg", server.uri())}),
    ];

    let temp = TempDir::new().unwrap();
    let summary = canned_orchestrator(temp.path(), items)
        .run(&ScrapeRequest::new(["https://www.instagram.com/p/b/"], 5).unwrap())
        .await
        .unwrap();

    assert_eq!(summary.posts_received, 2);
    assert_eq!(summary.posts_written, 1);
    assert_eq!(summary.failures[0].sequence_index, 1);
    assert_eq!(
        file_names(&temp.path().join("data")),
        vec![format!("post_2_{STAMP}_metadata.json")]
    );
}

#[test]
fn cancelled_batch_writes_nothing() {
    let temp = TempDir::new().unwrap();
    let fetcher = ReqwestFetcher::new(&DownloadSettings::default()).unwrap();
    let scraper = CannedScraper {
        items: vec![json!({"url": "https://www.instagram.com/p/slow/"})],
        collect_delay: Duration::from_secs(30),
    };
    let orchestrator = HarvestOrchestrator::new(
        Arc::new(scraper),
        AssetDownloader::new(Arc::new(fetcher), fast_retry()),
        &OutputLayout::under(temp.path()),
        2,
    );

    let handle = EngineHandle::spawn(
        orchestrator,
        ScrapeRequest::new(["https://www.instagram.com/p/slow/"], 1).unwrap(),
    );
    std::thread::sleep(Duration::from_millis(50));
    handle.cancel();

    assert!(matches!(handle.join(), Err(HarvestError::Cancelled)));
    assert!(!temp.path().join("data").exists());
}

#[test]
fn engine_handle_reports_summary_and_events() {
    let temp = TempDir::new().unwrap();
    let orchestrator = canned_orchestrator(
        temp.path(),
        vec![json!({"url": "https://www.instagram.com/p/text/", "caption": "no images"})],
    );

    let handle = EngineHandle::spawn(
        orchestrator,
        ScrapeRequest::new(["https://www.instagram.com/p/text/"], 1).unwrap(),
    );
    while !handle.is_finished() {
        std::thread::sleep(Duration::from_millis(5));
    }
    let mut events = Vec::new();
    while let Some(event) = handle.try_recv() {
        events.push(event);
    }
    let summary = handle.join().unwrap();

    assert_eq!(summary.run_id, "canned-run");
    assert_eq!(summary.posts_written, 1);
    assert_eq!(summary.images_succeeded + summary.images_failed, 0);
    assert_eq!(events.last(), Some(&HarvestEvent::Batch(BatchStage::Done)));
}
