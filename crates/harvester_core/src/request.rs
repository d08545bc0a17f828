use std::num::NonZeroU32;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("result limit must be a positive integer")]
    ZeroLimit,
}

/// Caller input for one scrape job: target URLs and a cap on returned items.
///
/// URLs are trimmed and blank entries dropped; duplicates are kept and
/// processed independently. An empty list is representable here and rejected
/// by the client at submission time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeRequest {
    urls: Vec<String>,
    limit: NonZeroU32,
}

impl ScrapeRequest {
    pub fn new<I, S>(urls: I, limit: u32) -> Result<Self, RequestError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let limit = NonZeroU32::new(limit).ok_or(RequestError::ZeroLimit)?;
        let urls = urls
            .into_iter()
            .map(|url| url.as_ref().trim().to_owned())
            .filter(|url| !url.is_empty())
            .collect();
        Ok(Self { urls, limit })
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn limit(&self) -> u32 {
        self.limit.get()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}
