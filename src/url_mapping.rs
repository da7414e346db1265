use std::sync::Arc;

use url::Url;

/// Lets a caller redirect where a mirrored URL is actually fetched from
/// (e.g. serving it out of a different backing store), and optionally make
/// the scheduler wait on some external readiness signal first.
#[async_trait::async_trait(?Send)]
pub trait UrlMapping {
    async fn resolve(&self, partial_local_path: &str) -> Option<ResolvedMapping>;

    /// Additional origins that should be treated as equivalent to the
    /// output origin when rewriting absolute URLs found in markup.
    fn known_origins(&self) -> Vec<String> {
        Vec::new()
    }
}

pub struct ResolvedMapping {
    pub fetch_url: Url,
    pub wake_up: Option<Arc<dyn WakeUp>>,
}

#[async_trait::async_trait(?Send)]
pub trait WakeUp {
    async fn wake(&self);
}

/// The default mapping: fetch `partial_local_path` from the crawl's source
/// origin (which may differ from the output origin when `new_website_url` is
/// set), with no extra readiness wait.
pub struct IdentityMapping {
    source_origin: Url,
}

impl IdentityMapping {
    pub fn new(source_origin: Url) -> Self {
        Self { source_origin }
    }
}

#[async_trait::async_trait(?Send)]
impl UrlMapping for IdentityMapping {
    async fn resolve(&self, partial_local_path: &str) -> Option<ResolvedMapping> {
        let fetch_url = self
            .source_origin
            .join(partial_local_path.trim_start_matches('/'))
            .ok()?;
        Some(ResolvedMapping {
            fetch_url,
            wake_up: None,
        })
    }
}
