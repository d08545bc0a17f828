use crate::naming::ImageAsset;
use crate::stage::PostStage;
use crate::SequenceIndex;

/// Result of one image download attempt sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageStatus {
    Stored {
        filename: String,
        bytes: u64,
        sha256: String,
    },
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOutcome {
    pub asset: ImageAsset,
    pub status: ImageStatus,
}

impl ImageOutcome {
    pub fn stored(asset: ImageAsset, bytes: u64, sha256: impl Into<String>) -> Self {
        let filename = asset.filename();
        Self {
            asset,
            status: ImageStatus::Stored {
                filename,
                bytes,
                sha256: sha256.into(),
            },
        }
    }

    pub fn failed(asset: ImageAsset, reason: impl Into<String>) -> Self {
        Self {
            asset,
            status: ImageStatus::Failed {
                reason: reason.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, ImageStatus::Stored { .. })
    }

    pub fn stored_filename(&self) -> Option<&str> {
        match &self.status {
            ImageStatus::Stored { filename, .. } => Some(filename),
            ImageStatus::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostResult {
    /// Metadata file written; some images may have failed.
    Written {
        metadata_filename: String,
        images_succeeded: usize,
        images_failed: usize,
    },
    /// The post could not be completed at `stage`.
    Failed {
        stage: PostStage,
        reason: String,
        images_succeeded: usize,
        images_failed: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostReport {
    pub sequence_index: SequenceIndex,
    pub result: PostResult,
}

impl PostReport {
    pub fn written(
        sequence_index: SequenceIndex,
        metadata_filename: String,
        outcomes: &[ImageOutcome],
    ) -> Self {
        let (images_succeeded, images_failed) = count_outcomes(outcomes);
        Self {
            sequence_index,
            result: PostResult::Written {
                metadata_filename,
                images_succeeded,
                images_failed,
            },
        }
    }

    pub fn failed(
        sequence_index: SequenceIndex,
        stage: PostStage,
        reason: impl Into<String>,
        outcomes: &[ImageOutcome],
    ) -> Self {
        let (images_succeeded, images_failed) = count_outcomes(outcomes);
        Self {
            sequence_index,
            result: PostResult::Failed {
                stage,
                reason: reason.into(),
                images_succeeded,
                images_failed,
            },
        }
    }

    pub fn is_written(&self) -> bool {
        matches!(self.result, PostResult::Written { .. })
    }

    fn image_counts(&self) -> (usize, usize) {
        match self.result {
            PostResult::Written {
                images_succeeded,
                images_failed,
                ..
            }
            | PostResult::Failed {
                images_succeeded,
                images_failed,
                ..
            } => (images_succeeded, images_failed),
        }
    }
}

fn count_outcomes(outcomes: &[ImageOutcome]) -> (usize, usize) {
    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    (succeeded, outcomes.len() - succeeded)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostFailure {
    pub sequence_index: SequenceIndex,
    pub stage: PostStage,
    pub reason: String,
}

/// Batch-level outcome, produced even when individual posts failed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub run_id: String,
    pub posts_received: usize,
    pub posts_written: usize,
    pub posts_failed: usize,
    pub images_succeeded: usize,
    pub images_failed: usize,
    pub failures: Vec<PostFailure>,
}

impl BatchSummary {
    pub fn from_reports(run_id: impl Into<String>, reports: &[PostReport]) -> Self {
        let mut summary = BatchSummary {
            run_id: run_id.into(),
            posts_received: reports.len(),
            ..BatchSummary::default()
        };
        for report in reports {
            let (ok, failed) = report.image_counts();
            summary.images_succeeded += ok;
            summary.images_failed += failed;
            match &report.result {
                PostResult::Written { .. } => summary.posts_written += 1,
                PostResult::Failed { stage, reason, .. } => {
                    summary.posts_failed += 1;
                    summary.failures.push(PostFailure {
                        sequence_index: report.sequence_index,
                        stage: *stage,
                        reason: reason.clone(),
                    });
                }
            }
        }
        summary.failures.sort_by_key(|failure| failure.sequence_index);
        summary
    }
}
