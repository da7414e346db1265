use thiserror::Error;

/// Errors that cross the public `start()`/CLI boundary.
///
/// Everything else (a single fetch failing, a page the scheduler chose not to
/// retry) is logged via `tracing` and folded into a best-effort result; it
/// never becomes an `Err` here.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("start url is not an absolute http(s) url: {0}")]
    InvalidStartUrl(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Fetch(#[from] reqwest::Error),
}
