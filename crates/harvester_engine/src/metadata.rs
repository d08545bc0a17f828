use std::path::PathBuf;

use bytes::Bytes;
use harvester_core::{
    metadata_filename, ImageOutcome, ImageStatus, NormalizedRecord, Platform, SequenceIndex,
};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::persist::{AtomicFileWriter, PersistError};

/// JSON shape of one post's metadata file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataDocument {
    pub sequence_index: SequenceIndex,
    pub timestamp: String,
    pub captured_at: String,
    pub platform: Platform,
    pub post_url: Option<String>,
    pub caption: Option<String>,
    pub author: Option<String>,
    pub images: Vec<ImageEntry>,
    /// Unrecognized source fields, verbatim.
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageEntryStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageEntry {
    pub ordinal: u32,
    pub source_url: String,
    pub stored_filename: Option<String>,
    pub status: ImageEntryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl From<&ImageOutcome> for ImageEntry {
    fn from(outcome: &ImageOutcome) -> Self {
        let base = ImageEntry {
            ordinal: outcome.asset.ordinal,
            source_url: outcome.asset.source_url.clone(),
            stored_filename: None,
            status: ImageEntryStatus::Failed,
            error: None,
            bytes: None,
            sha256: None,
        };
        match &outcome.status {
            ImageStatus::Stored {
                filename,
                bytes,
                sha256,
            } => ImageEntry {
                stored_filename: Some(filename.clone()),
                status: ImageEntryStatus::Success,
                bytes: Some(*bytes),
                sha256: Some(sha256.clone()),
                ..base
            },
            ImageStatus::Failed { reason } => ImageEntry {
                error: Some(reason.clone()),
                ..base
            },
        }
    }
}

impl MetadataDocument {
    pub fn build(record: &NormalizedRecord, outcomes: &[ImageOutcome]) -> Self {
        let mut images: Vec<ImageEntry> = outcomes.iter().map(ImageEntry::from).collect();
        images.sort_by_key(|entry| entry.ordinal);
        Self {
            sequence_index: record.sequence_index,
            timestamp: record.timestamp.file_stamp(),
            captured_at: record.timestamp.as_datetime().to_rfc3339(),
            platform: record.platform,
            post_url: record.post_url.clone(),
            caption: record.caption.clone(),
            author: record.author.clone(),
            images,
            metadata: record.extra.clone(),
        }
    }
}

/// The written metadata file.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataFile {
    pub path: PathBuf,
    pub filename: String,
    pub document: MetadataDocument,
}

/// Writes one JSON metadata file per post.
#[derive(Debug, Clone)]
pub struct MetadataSerializer {
    writer: AtomicFileWriter,
}

impl MetadataSerializer {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            writer: AtomicFileWriter::new(data_dir),
        }
    }

    pub async fn write(
        &self,
        record: &NormalizedRecord,
        outcomes: &[ImageOutcome],
    ) -> Result<MetadataFile, PersistError> {
        let document = MetadataDocument::build(record, outcomes);
        let filename = metadata_filename(record.sequence_index, &record.timestamp);
        let body = serde_json::to_vec_pretty(&document)
            .map_err(|err| PersistError::Io(err.into()))?;
        let path = self
            .writer
            .write_async(filename.clone(), Bytes::from(body))
            .await?;
        Ok(MetadataFile {
            path,
            filename,
            document,
        })
    }
}
