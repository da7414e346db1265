//! The traversal scheduler: a single-threaded cooperative loop that pops one
//! [`UrlGroup`] at a time off a FIFO queue, fetches its page, partitions the
//! references that page admitted into resources and further pages, drains
//! the resources (re-checking the stack as CSS processing admits more), then
//! moves on. See `SPEC_FULL.md` §4.2 for the state machine this implements.

use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use url::Url;

use crate::error::CrawlError;
use crate::hooks::{
    CacheHitInfo, CrawlerHooks, NoopHooks, ProcessOutcome, RetryDecision, TransformContext,
};
use crate::mirror::{build_relocatable_url, MirrorCache};
use crate::rewrite::{apply_html_rewrite, extract_css_urls, extract_html_references, join_srcset};
use crate::sort_tools::UrlSortTools;
use crate::url_mapping::{IdentityMapping, UrlMapping};
use crate::url_pipeline::{CurrentGroupCell, UrlGroup, UrlPipeline};
use crate::urlutil::is_resource_url;

/// Mirrors the `Options` table in `SPEC_FULL.md` §3. Every field here is a
/// recognized option; there is no catch-all bag for ad-hoc configuration.
pub struct Options {
    pub required_prefix: Option<String>,
    pub output_dir: Option<std::path::PathBuf>,
    pub require_relocatable_url: bool,
    pub rewrite_this_urls: Vec<String>,
    pub forbidden_urls: Vec<String>,
    pub scan_this_urls: Vec<String>,
    pub url_mapping: Option<Rc<dyn UrlMapping>>,
    pub new_website_url: Option<Url>,
    pub pause_duration_ms: u64,
    pub hooks: Rc<dyn CrawlerHooks>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            required_prefix: None,
            output_dir: None,
            require_relocatable_url: true,
            rewrite_this_urls: Vec::new(),
            forbidden_urls: Vec::new(),
            scan_this_urls: Vec::new(),
            url_mapping: None,
            new_website_url: None,
            pause_duration_ms: 0,
            hooks: Rc::new(NoopHooks),
        }
    }
}

/// `WebSiteCrawler(source_website, options)` from `SPEC_FULL.md` §6. Owns the
/// seen-set, group queue, and current-group cell exclusively; nothing else
/// touches them (§5 "Shared resources").
pub struct WebSiteCrawler {
    output_origin: Url,
    options: Options,
    pipeline: UrlPipeline,
    current_group: CurrentGroupCell,
    group_queue: VecDeque<UrlGroup>,
    mirror: Option<MirrorCache>,
    url_mapping: Rc<dyn UrlMapping>,
    client: Client,
    is_started: bool,
}

impl WebSiteCrawler {
    pub fn new(source_website: &str, mut options: Options) -> Result<Self, CrawlError> {
        let source_url = Url::parse(source_website)
            .map_err(|_| CrawlError::InvalidStartUrl(source_website.to_string()))?;
        if source_url.scheme() != "http" && source_url.scheme() != "https" {
            return Err(CrawlError::InvalidStartUrl(source_website.to_string()));
        }

        let source_origin = crate::urlutil::origin_url(&source_url);
        let output_origin = match &options.new_website_url {
            Some(new_url) => crate::urlutil::origin_url(new_url),
            None => source_origin.clone(),
        };

        if output_origin != source_origin {
            options
                .rewrite_this_urls
                .push(source_origin.as_str().trim_end_matches('/').to_string());
        }

        let url_mapping: Rc<dyn UrlMapping> = options
            .url_mapping
            .clone()
            .unwrap_or_else(|| Rc::new(IdentityMapping::new(source_origin.clone())));

        let mut rewrite_this_urls = options.rewrite_this_urls.clone();
        rewrite_this_urls.extend(url_mapping.known_origins());

        let current_group: CurrentGroupCell = Rc::new(std::cell::RefCell::new(None));
        let mut pipeline = UrlPipeline::new(
            output_origin.clone(),
            options.required_prefix.clone(),
            rewrite_this_urls,
            Vec::new(),
            current_group.clone(),
        );
        // `forbid_url_from` resolves a root-relative prefix (e.g. `/wp-json`,
        // boundary scenario 6) against the output origin; absolute prefixes
        // pass through unchanged.
        for prefix in &options.forbidden_urls {
            pipeline.forbid_url_from(prefix);
        }

        let mirror = options.output_dir.clone().map(MirrorCache::new);

        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(CrawlError::Fetch)?;

        Ok(Self {
            output_origin,
            options,
            pipeline,
            current_group,
            group_queue: VecDeque::new(),
            mirror,
            url_mapping,
            client,
            is_started: false,
        })
    }

    /// Adds a normalized prefix to the forbidden list at runtime (`SPEC_FULL.md` §6).
    pub fn forbid_url_from(&mut self, url: &str) {
        self.pipeline.forbid_url_from(url);
    }

    /// Begins traversal at `entry_point` (defaults to the output origin).
    /// Returns once the queue drains or a hook halts the loop. A second call
    /// while already started is a no-op (§5 "Reentrancy").
    pub async fn start(&mut self, entry_point: Option<&str>) -> Result<(), CrawlError> {
        if self.is_started {
            return Ok(());
        }
        self.is_started = true;

        let entry = match entry_point {
            Some(raw) => {
                Url::parse(raw).map_err(|_| CrawlError::InvalidStartUrl(raw.to_string()))?
            }
            None => self.output_origin.clone(),
        };

        self.pipeline.mark_seen(entry.as_str());
        let root_group = UrlGroup {
            url: entry,
            stack: Vec::new(),
        };
        *self.current_group.borrow_mut() = Some(root_group);
        let scan_urls = self.options.scan_this_urls.clone();
        for raw in &scan_urls {
            self.pipeline.push_url(raw, false, None);
        }
        let root_group = self
            .current_group
            .borrow_mut()
            .take()
            .expect("root group set above");
        self.group_queue.push_back(root_group);

        while let Some(group) = self.group_queue.pop_front() {
            let keep_going = self.process_group(group).await?;
            if !keep_going {
                break;
            }
        }

        Ok(())
    }

    /// `process_group(g)` from `SPEC_FULL.md` §4.2: fetch the page, enqueue
    /// discovered pages, then drain discovered resources until the stack is
    /// dry (a CSS body can admit more resources mid-drain).
    async fn process_group(&mut self, group: UrlGroup) -> Result<bool, CrawlError> {
        *self.current_group.borrow_mut() = Some(group);
        let page_url = self.current_page_url();

        let page_outcome = self.process_url(page_url.clone()).await?;

        let (mut resource_queue, page_urls) = self.drain_stack_partition();
        self.enqueue_pages(page_urls, true).await;

        while let Some(raw) = resource_queue.pop_front() {
            if let Ok(url) = Url::parse(&raw) {
                if self.options.hooks.can_download(&raw, true).await {
                    let outcome = self.process_url(url.clone()).await?;
                    self.options.hooks.on_resource_downloaded(&url, outcome).await;
                }
            }

            let (more_resources, more_pages) = self.drain_stack_partition();
            resource_queue.extend(more_resources);
            self.enqueue_pages(more_pages, false).await;
        }

        let keep_going = self
            .options
            .hooks
            .on_page_fully_downloaded(&page_url, page_outcome)
            .await;
        self.current_group.borrow_mut().take();
        Ok(keep_going)
    }

    fn current_page_url(&self) -> Url {
        self.current_group
            .borrow()
            .as_ref()
            .expect("current group set while processing")
            .url
            .clone()
    }

    /// Takes whatever is currently on the group's stack and splits it into
    /// resource URLs (fetched inline) and page-like URLs (new groups).
    fn drain_stack_partition(&mut self) -> (VecDeque<String>, Vec<String>) {
        let pending = {
            let mut cell = self.current_group.borrow_mut();
            let group = cell.as_mut().expect("current group set while processing");
            std::mem::take(&mut group.stack)
        };

        let mut resources = VecDeque::new();
        let mut pages = Vec::new();
        for raw in pending {
            match Url::parse(&raw) {
                Ok(url) if is_resource_url(&url) => resources.push_back(raw),
                Ok(_) => pages.push(raw),
                Err(_) => {}
            }
        }
        (resources, pages)
    }

    /// Enqueues page-like URLs as new groups. Only the first batch produced
    /// by a page (`apply_sort = true`) passes through `sort_pages_to_download`;
    /// stragglers admitted while draining resources are appended as found.
    async fn enqueue_pages(&mut self, mut pages: Vec<String>, apply_sort: bool) {
        if pages.is_empty() {
            return;
        }

        if apply_sort && pages.len() > 1 {
            let mut tools = UrlSortTools::new(pages);
            self.options.hooks.sort_pages_to_download(&mut tools);
            pages = tools.result();
        }

        for raw in pages {
            let Ok(url) = Url::parse(&raw) else { continue };
            if !self.options.hooks.can_download(&raw, false).await {
                continue;
            }
            self.group_queue.push_back(UrlGroup {
                url,
                stack: Vec::new(),
            });
        }
    }

    /// `process_url(u)` from `SPEC_FULL.md` §4.2.
    async fn process_url(&mut self, u: Url) -> Result<ProcessOutcome, CrawlError> {
        let partial = self.partial_path(&u);

        let Some(mapping) = self.url_mapping.resolve(&partial).await else {
            return Ok(ProcessOutcome::Ignored);
        };

        if let Some(mirror) = &self.mirror {
            if let Some(entry) = mirror.has_in_cache(&u) {
                let transformed = self.transform_found_url(&u, false).await;
                let info = CacheHitInfo {
                    added_date: entry.added_date,
                    source_url: &u,
                };
                if self
                    .options
                    .hooks
                    .can_ignore_if_already_crawled(&transformed, info)
                    .await
                {
                    return Ok(ProcessOutcome::Ignored);
                }
            }
        }

        if let Some(wake_up) = &mapping.wake_up {
            wake_up.wake().await;
        }

        self.options.hooks.on_url(&partial, &mapping.fetch_url).await;

        if self.options.pause_duration_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.options.pause_duration_ms)).await;
        }

        let mut retry_count: u32 = 0;
        loop {
            let response = self.client.get(mapping.fetch_url.clone()).send().await;
            let response = match response {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!(url = %mapping.fetch_url, error = %err, "fetch failed");
                    return Ok(ProcessOutcome::Error);
                }
            };

            let status = response.status();
            if status == StatusCode::OK {
                return self
                    .handle_success_body(u, mapping.fetch_url.clone(), response)
                    .await;
            }

            if status.is_redirection() {
                if let Some(location) = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|value| value.to_str().ok())
                {
                    self.pipeline.push_url(location, false, None);
                }
                return Ok(ProcessOutcome::Redirected);
            }

            let decision = self
                .options
                .hooks
                .on_invalid_response_code_found(&u, retry_count, status)
                .await;

            match decision {
                RetryDecision::Abort => return Ok(ProcessOutcome::Error),
                RetryDecision::Retry => {
                    retry_count += 1;
                    continue;
                }
                RetryDecision::UseDefaultPolicy => {
                    if retry_count < 3 {
                        let delay_ms = 1000 * retry_count as u64;
                        if delay_ms > 0 {
                            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        }
                        retry_count += 1;
                        continue;
                    }
                    return Ok(ProcessOutcome::Error);
                }
            }
        }
    }

    /// Body handling by `Content-Type`, `SPEC_FULL.md` §4.2 step 9. `fetch_url`
    /// is the upstream URL the body was actually fetched from (`mapping.fetch_url`),
    /// which may differ from `u` (the mirror/output-origin URL) under a custom
    /// `url_mapping` or `new_website_url`.
    async fn handle_success_body(
        &mut self,
        u: Url,
        fetch_url: Url,
        response: reqwest::Response,
    ) -> Result<ProcessOutcome, CrawlError> {
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let partial = self.partial_path(&u);

        if content_type.starts_with("text/html") {
            let body = response.text().await.map_err(CrawlError::Fetch)?;
            let rewritten = self.rewrite_html(&body).await;
            let final_html = self
                .options
                .hooks
                .on_html(rewritten, &partial, &fetch_url)
                .await;
            self.persist(&u, final_html.as_bytes());
        } else if content_type.starts_with("text/css") {
            let body = response.text().await.map_err(CrawlError::Fetch)?;
            self.admit_css_urls(&body, &u);
            self.persist(&u, body.as_bytes());
        } else {
            let body = response.bytes().await.map_err(CrawlError::Fetch)?;
            self.persist(&u, &body);
        }

        Ok(ProcessOutcome::Ok)
    }

    fn persist(&self, url: &Url, body: &[u8]) {
        let Some(mirror) = &self.mirror else { return };
        if let Err(err) = mirror.add_to_cache(url, 200, body) {
            tracing::warn!(%url, error = %err, "failed to persist mirrored file");
        }
    }

    fn admit_css_urls(&mut self, css: &str, css_url: &Url) {
        for raw in extract_css_urls(css) {
            self.pipeline.push_url(&raw, true, Some(css_url));
        }
    }

    /// Two-pass rewrite described in `rewrite.rs`: collect every `href`/`src`/
    /// `srcset` occurrence, resolve each through the URL pipeline and the
    /// `transform_url` hook (both of which may need to run before the second
    /// pass, since admitting a URL can push onto the current group's stack),
    /// then substitute the resolved values back in.
    async fn rewrite_html(&mut self, html: &str) -> String {
        let refs = extract_html_references(html);

        let mut href_final = std::collections::HashMap::new();
        for href_ref in &refs.hrefs {
            if href_final.contains_key(&href_ref.raw) {
                continue;
            }
            let replacement = self.resolve_and_transform(&href_ref.raw).await;
            href_final.insert(href_ref.raw.clone(), replacement);
        }

        let mut srcset_final = std::collections::HashMap::new();
        for srcset_ref in &refs.srcsets {
            if srcset_final.contains_key(&srcset_ref.raw) {
                continue;
            }
            let mut rewritten = Vec::with_capacity(srcset_ref.candidates.len());
            for candidate in &srcset_ref.candidates {
                let replacement = self.resolve_and_transform(&candidate.url).await;
                rewritten.push((replacement, candidate.descriptor.clone()));
            }
            srcset_final.insert(srcset_ref.raw.clone(), join_srcset(&rewritten));
        }

        match apply_html_rewrite(html, &href_final, &srcset_final) {
            Ok(rewritten) => rewritten,
            Err(err) => {
                tracing::warn!(error = %err, "html rewrite failed; serving original body");
                html.to_string()
            }
        }
    }

    /// Admits a raw attribute value and runs it through `transform_url`. An
    /// attribute value the pipeline rejected outright is left untouched, per
    /// invariant 3 in §8 ("explicitly returned unchanged by `transform_url`").
    async fn resolve_and_transform(&mut self, raw: &str) -> String {
        let admitted = self.pipeline.push_url(raw, false, None);
        if admitted.is_empty() {
            // Rejected outright (bad scheme, out of scope, ...): leave the
            // attribute exactly as it was, per invariant 3 in §8.
            return raw.to_string();
        }
        let Ok(url) = Url::parse(&admitted) else {
            return raw.to_string();
        };
        self.transform_found_url(&url, true).await
    }

    /// `transform_found_url(u, relocatable)` from `SPEC_FULL.md` §4.2 step 3
    /// and the `transform_url` hook contract in §6.
    async fn transform_found_url(&self, url: &Url, relocatable: bool) -> String {
        let want_relocatable = relocatable && self.options.require_relocatable_url;
        let current_page = self.pipeline.current_page_url();

        let built = if want_relocatable {
            match &current_page {
                Some(page) => build_relocatable_url(page, url),
                None => crate::mirror::absolute_root_path(url),
            }
        } else {
            crate::mirror::absolute_root_path(url)
        };

        let come_from_page = current_page.unwrap_or_else(|| self.output_origin.clone());
        let ctx = TransformContext {
            come_from_page: &come_from_page,
            require_relocatable_url: want_relocatable,
        };
        self.options.hooks.transform_url(built, ctx).await
    }

    fn partial_path(&self, u: &Url) -> String {
        let origin = self.output_origin.as_str().trim_end_matches('/');
        u.as_str()
            .strip_prefix(origin)
            .map(str::to_string)
            .unwrap_or_else(|| u.as_str().to_string())
    }
}

/// CLI entry point: builds `Options` from parsed flags and runs one crawl.
pub async fn run(args: crate::cli::CrawlArgs) -> Result<(), CrawlError> {
    let new_website_url = match &args.new_website_url {
        Some(raw) => {
            Some(Url::parse(raw).map_err(|_| CrawlError::InvalidStartUrl(raw.clone()))?)
        }
        None => None,
    };

    let options = Options {
        required_prefix: args.required_prefix,
        output_dir: Some(args.out),
        require_relocatable_url: !args.no_relocatable,
        rewrite_this_urls: args.rewrite_this_urls,
        forbidden_urls: args.forbidden_urls,
        scan_this_urls: args.scan_this_urls,
        url_mapping: None,
        new_website_url,
        pause_duration_ms: args.pause_ms,
        hooks: Rc::new(NoopHooks),
    };

    let mut crawler = WebSiteCrawler::new(&args.url, options)?;
    crawler.start(None).await
}
