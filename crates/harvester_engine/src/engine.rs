use std::sync::{mpsc, Arc};
use std::thread;

use harvester_core::{BatchSummary, ScrapeRequest};
use tokio_util::sync::CancellationToken;

use crate::config::HarvestConfig;
use crate::orchestrator::{HarvestError, HarvestOrchestrator};
use crate::progress::ChannelProgressSink;
use crate::HarvestEvent;

/// Runs one harvest batch on a background thread with its own runtime, for
/// callers that are not async.
pub struct EngineHandle {
    event_rx: mpsc::Receiver<HarvestEvent>,
    cancel: CancellationToken,
    worker: thread::JoinHandle<Result<BatchSummary, HarvestError>>,
}

impl EngineHandle {
    pub fn start(config: &HarvestConfig, request: ScrapeRequest) -> Result<Self, HarvestError> {
        let orchestrator = HarvestOrchestrator::from_config(config)?;
        Ok(Self::spawn(orchestrator, request))
    }

    /// Run an already wired orchestrator; its progress sink is replaced by
    /// this handle's event channel.
    pub fn spawn(orchestrator: HarvestOrchestrator, request: ScrapeRequest) -> Self {
        let (event_tx, event_rx) = mpsc::channel();
        let orchestrator = orchestrator.with_sink(Arc::new(ChannelProgressSink::new(event_tx)));
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let worker = thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| HarvestError::Runtime(err.to_string()))?;
            runtime.block_on(orchestrator.run_until_cancelled(&request, &token))
        });

        Self {
            event_rx,
            cancel,
            worker,
        }
    }

    pub fn try_recv(&self) -> Option<HarvestEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Abandon the batch; `join` then reports [`HarvestError::Cancelled`]
    /// unless the batch already finished.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Block until the batch finishes. Events not yet received are dropped.
    pub fn join(self) -> Result<BatchSummary, HarvestError> {
        self.worker
            .join()
            .map_err(|_| HarvestError::Runtime("harvest thread panicked".to_string()))?
    }
}
