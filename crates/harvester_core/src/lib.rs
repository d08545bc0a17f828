//! Harvester core: pure domain model for scraped posts.
//!
//! Nothing in this crate performs IO. The engine crate drives the network and
//! the file system and uses these types to name, normalize and account for
//! every post it processes.
mod naming;
mod normalize;
mod platform;
mod request;
mod stage;
mod summary;

pub use naming::{
    metadata_filename, CaptureTimestamp, ImageAsset, FILE_STAMP_FORMAT, IMAGE_EXTENSION,
};
pub use normalize::{NormalizedRecord, RawResultItem, ResultNormalizer, SchemaError};
pub use platform::{FieldTable, Platform};
pub use request::{RequestError, ScrapeRequest};
pub use stage::{BatchStage, PostStage};
pub use summary::{BatchSummary, ImageOutcome, ImageStatus, PostFailure, PostReport, PostResult};

/// 1-based position of a post within one job's result set.
pub type SequenceIndex = u32;
