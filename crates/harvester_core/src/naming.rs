use std::fmt;

use chrono::{DateTime, Utc};

use crate::SequenceIndex;

/// `YYYYMMDD_HHMMSS`: fixed width so lexical and chronological order agree.
pub const FILE_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

pub const IMAGE_EXTENSION: &str = "jpg";

/// Capture time of a post, fixed once at normalization and shared by every
/// file written for that post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CaptureTimestamp(DateTime<Utc>);

impl CaptureTimestamp {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Filename fragment in [`FILE_STAMP_FORMAT`].
    pub fn file_stamp(&self) -> String {
        self.0.format(FILE_STAMP_FORMAT).to_string()
    }
}

impl fmt::Display for CaptureTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(FILE_STAMP_FORMAT))
    }
}

/// One image of one post, identified by (sequence index, timestamp, ordinal).
///
/// Ordinals are 1-based and come from the image's position in the record, so
/// a failed download never shifts the names of the images after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    pub sequence_index: SequenceIndex,
    pub timestamp: CaptureTimestamp,
    pub ordinal: u32,
    pub source_url: String,
}

impl ImageAsset {
    /// `post_{seq}_{timestamp}_img{ordinal}.jpg`
    pub fn filename(&self) -> String {
        format!(
            "post_{}_{}_img{}.{IMAGE_EXTENSION}",
            self.sequence_index, self.timestamp, self.ordinal
        )
    }
}

/// `post_{seq}_{timestamp}_metadata.json`
pub fn metadata_filename(sequence_index: SequenceIndex, timestamp: &CaptureTimestamp) -> String {
    format!("post_{sequence_index}_{timestamp}_metadata.json")
}
