/// Lifecycle of one harvest batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BatchStage {
    Submitted,
    Collecting,
    Processing,
    Done,
}

impl BatchStage {
    pub fn next(self) -> Option<BatchStage> {
        match self {
            BatchStage::Submitted => Some(BatchStage::Collecting),
            BatchStage::Collecting => Some(BatchStage::Processing),
            BatchStage::Processing => Some(BatchStage::Done),
            BatchStage::Done => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == BatchStage::Done
    }
}

/// Lifecycle of one post inside a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PostStage {
    Normalizing,
    Downloading,
    Serializing,
    Done,
}

impl PostStage {
    pub fn next(self) -> Option<PostStage> {
        match self {
            PostStage::Normalizing => Some(PostStage::Downloading),
            PostStage::Downloading => Some(PostStage::Serializing),
            PostStage::Serializing => Some(PostStage::Done),
            PostStage::Done => None,
        }
    }
}
