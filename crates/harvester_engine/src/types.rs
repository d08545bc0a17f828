use std::fmt;
use std::path::PathBuf;

use harvester_core::{BatchStage, PostStage, SequenceIndex};
use thiserror::Error;

use crate::persist::PersistError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestEvent {
    Batch(BatchStage),
    Post {
        sequence_index: SequenceIndex,
        stage: PostStage,
    },
    ImageFinished {
        sequence_index: SequenceIndex,
        ordinal: u32,
        success: bool,
    },
    PostFinished {
        sequence_index: SequenceIndex,
        written: bool,
    },
}

/// Bytes of one successful HTTP fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutput {
    pub bytes: bytes::Bytes,
    pub final_url: String,
    pub content_type: Option<String>,
}

/// A downloaded image now on disk under its final name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    pub path: PathBuf,
    pub bytes: u64,
    pub sha256: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    RedirectLimitExceeded,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    EmptyBody,
    Network,
}

impl FailureKind {
    /// Network trouble and server-side errors are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            FailureKind::Network | FailureKind::Timeout => true,
            FailureKind::HttpStatus(code) => (500..600).contains(code),
            FailureKind::InvalidUrl
            | FailureKind::RedirectLimitExceeded
            | FailureKind::TooLarge { .. }
            | FailureKind::EmptyBody => false,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::EmptyBody => write!(f, "empty body"),
            FailureKind::Network => write!(f, "network error"),
        }
    }
}

/// A single image could not be fetched; recorded as failed, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("fetching {url} failed after {attempts} attempt(s): {source}")]
pub struct AssetFetchError {
    pub url: String,
    pub attempts: u32,
    #[source]
    pub source: FetchError,
}

impl AssetFetchError {
    pub fn kind(&self) -> &FailureKind {
        &self.source.kind
    }
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Fetch(#[from] AssetFetchError),
    #[error("storing image failed: {0}")]
    Persist(#[from] PersistError),
}
