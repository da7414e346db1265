use std::time::SystemTime;

use url::Url;

use crate::sort_tools::UrlSortTools;

/// What to do after a non-2xx/3xx response. `UseDefaultPolicy` defers to the
/// scheduler's own bounded retry/backoff; a hook that wants different
/// behavior returns `Retry` (no imposed delay, its own call) or `Abort`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    UseDefaultPolicy,
    Retry,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Ok,
    Redirected,
    Error,
    /// No `url_mapping` entry for this path, or skipped via
    /// `can_ignore_if_already_crawled`. Not an error (§7).
    Ignored,
}

pub struct TransformContext<'a> {
    pub come_from_page: &'a Url,
    pub require_relocatable_url: bool,
}

pub struct CacheHitInfo<'a> {
    pub added_date: SystemTime,
    pub source_url: &'a Url,
}

/// Extension points threaded through every stage of a crawl. All methods
/// have no-op/identity defaults, so a caller only overrides what it needs.
/// Methods are `async` (via `async_trait(?Send)`, matching the
/// single-threaded traversal loop) so a hook can itself perform I/O.
#[async_trait::async_trait(?Send)]
pub trait CrawlerHooks {
    async fn on_url(&self, _local_url: &str, _fetch_url: &Url) {}

    async fn on_html(&self, html: String, _local_url: &str, _fetch_url: &Url) -> String {
        html
    }

    async fn transform_url(&self, url: String, _ctx: TransformContext<'_>) -> String {
        url
    }

    async fn can_ignore_if_already_crawled(
        &self,
        _partial_url: &str,
        _info: CacheHitInfo<'_>,
    ) -> bool {
        false
    }

    async fn can_download(&self, _url: &str, _is_resource: bool) -> bool {
        true
    }

    async fn on_invalid_response_code_found(
        &self,
        _url: &Url,
        _retry_count: u32,
        _status: reqwest::StatusCode,
    ) -> RetryDecision {
        RetryDecision::UseDefaultPolicy
    }

    async fn on_page_fully_downloaded(&self, _url: &Url, _outcome: ProcessOutcome) -> bool {
        true
    }

    async fn on_resource_downloaded(&self, _url: &Url, _outcome: ProcessOutcome) {}

    fn sort_pages_to_download(&self, _tools: &mut UrlSortTools) {}
}

/// The hook set used when a caller supplies none of its own.
pub struct NoopHooks;

#[async_trait::async_trait(?Send)]
impl CrawlerHooks for NoopHooks {}
