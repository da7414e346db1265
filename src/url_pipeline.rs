use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use url::Url;

const FORBIDDEN_SCHEMES: &[&str] = &["data", "javascript", "mailto", "tel", "sms", "ftp"];

/// The page currently being processed by the scheduler, and the resource
/// URLs its markup has admitted so far. Shared (not cloned) between the
/// scheduler's traversal loop and the pipeline's `push_url`, since discovering
/// a new URL while rewriting a page must land on *that* page's stack even
/// though the rewrite callback has no other route back into the scheduler.
pub type CurrentGroupCell = Rc<RefCell<Option<UrlGroup>>>;

#[derive(Debug, Clone)]
pub struct UrlGroup {
    pub url: Url,
    pub stack: Vec<String>,
}

/// Implements the URL admission rules described for `clean_up_url`/`push_url`:
/// normalize a raw attribute value into an absolute URL scoped to the mirror,
/// or reject it outright.
pub struct UrlPipeline {
    required_prefix: String,
    required_prefix_2: String,
    output_origin: Url,
    rewrite_this_urls: Vec<String>,
    forbidden_urls: Vec<String>,
    seen: HashSet<String>,
    current_group: CurrentGroupCell,
}

impl UrlPipeline {
    pub fn new(
        output_origin: Url,
        required_prefix: Option<String>,
        rewrite_this_urls: Vec<String>,
        forbidden_urls: Vec<String>,
        current_group: CurrentGroupCell,
    ) -> Self {
        // Scheme-relative (`//host/...`) admission is checked against the
        // scheme-stripped form of whichever prefix governs absolute URLs: a
        // user-supplied `required_prefix`, taken from its first `:` onward, or
        // `//{output_host}` when no `required_prefix` was supplied.
        let required_prefix_2 = match &required_prefix {
            Some(supplied) => match supplied.find(':') {
                Some(idx) => supplied[idx + 1..].to_string(),
                None => supplied.clone(),
            },
            None => format!("//{}", output_origin.host_str().unwrap_or_default()),
        };
        let required_prefix =
            required_prefix.unwrap_or_else(|| output_origin.as_str().to_string());

        Self {
            required_prefix: required_prefix.to_ascii_lowercase(),
            required_prefix_2,
            output_origin,
            rewrite_this_urls,
            forbidden_urls,
            seen: HashSet::new(),
            current_group,
        }
    }

    pub fn current_page_url(&self) -> Option<Url> {
        self.current_group.borrow().as_ref().map(|g| g.url.clone())
    }

    pub fn mark_seen(&mut self, absolute_url: &str) {
        self.seen.insert(absolute_url.to_string());
    }

    pub fn has_seen(&self, absolute_url: &str) -> bool {
        self.seen.contains(absolute_url)
    }

    pub fn forbid_url_from(&mut self, prefix: &str) {
        let normalized = if prefix.contains("://") {
            prefix.to_string()
        } else {
            self.output_origin
                .join(prefix)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| prefix.to_string())
        };
        self.forbidden_urls.push(normalized);
    }

    pub fn is_forbidden(&self, url: &str) -> bool {
        self.forbidden_urls
            .iter()
            .any(|prefix| url == prefix || url.starts_with(prefix.as_str()))
    }

    /// Normalizes `raw` into an absolute URL within the mirror's scope, or
    /// returns `None` if it should be dropped (unsupported scheme, fragment
    /// only, out of scope, ...). `current_url` is the CSS file's URL when
    /// `is_css` is set; a bare (non-CSS) relative reference instead resolves
    /// against the current page being processed, falling back to the output
    /// origin if there is none.
    pub fn clean_up_url(&self, raw: &str, is_css: bool, current_url: Option<&Url>) -> Option<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return None;
        }

        let cleaned = if trimmed.contains("://") {
            self.rewrite_source_site_url(trimmed)
        } else if let Some(query) = trimmed.strip_prefix('?') {
            let page = self.current_page_url()?;
            let mut base = page;
            base.set_query(None);
            base.set_fragment(None);
            format!("{base}?{query}")
        } else if has_forbidden_scheme(trimmed) {
            return None;
        } else if let Some(rest) = trimmed.strip_prefix("//") {
            let candidate = format!("//{rest}");
            if !candidate
                .to_ascii_lowercase()
                .starts_with(&self.required_prefix_2.to_ascii_lowercase())
            {
                return None;
            }
            format!("{}:{}", self.output_origin.scheme(), candidate)
        } else if trimmed.starts_with('/') {
            self.output_origin.join(trimmed).ok()?.to_string()
        } else if is_css {
            current_url?.join(trimmed).ok()?.to_string()
        } else {
            // A bare relative reference in markup resolves against the page
            // that referenced it, not the bare site root (boundary scenario
            // 2: `a.png` on `/p/` admits `/p/a.png`, not `/a.png`).
            let base = self.current_page_url().unwrap_or_else(|| self.output_origin.clone());
            base.join(trimmed).ok()?.to_string()
        };

        let cleaned = cleaned.trim().to_string();
        if !cleaned
            .to_ascii_lowercase()
            .starts_with(&self.required_prefix)
        {
            return None;
        }
        Some(cleaned)
    }

    fn rewrite_source_site_url(&self, absolute: &str) -> String {
        for prefix in &self.rewrite_this_urls {
            if let Some(rest) = absolute.strip_prefix(prefix.as_str()) {
                let mut out = self.output_origin.as_str().trim_end_matches('/').to_string();
                out.push_str(rest);
                return out;
            }
        }
        absolute.to_string()
    }

    /// Cleans `raw`, records it in the seen set, and (unless it is forbidden)
    /// pushes it onto the current group's stack. Returns the cleaned,
    /// absolute URL, or an empty string if it was rejected.
    pub fn push_url(&mut self, raw: &str, is_css: bool, current_url: Option<&Url>) -> String {
        let Some(cleaned) = self.clean_up_url(raw, is_css, current_url) else {
            return String::new();
        };

        if self.seen.contains(&cleaned) {
            return cleaned;
        }
        self.seen.insert(cleaned.clone());

        if self.is_forbidden(&cleaned) {
            return cleaned;
        }

        if let Some(group) = self.current_group.borrow_mut().as_mut() {
            group.stack.push(cleaned.clone());
        }

        cleaned
    }
}

fn has_forbidden_scheme(raw: &str) -> bool {
    let lower = raw.to_ascii_lowercase();
    FORBIDDEN_SCHEMES
        .iter()
        .any(|scheme| lower.starts_with(&format!("{scheme}:")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline(output: &str) -> UrlPipeline {
        UrlPipeline::new(
            Url::parse(output).unwrap(),
            None,
            Vec::new(),
            Vec::new(),
            Rc::new(RefCell::new(None)),
        )
    }

    #[test]
    fn admits_root_relative_href() {
        let p = pipeline("https://site.example/");
        assert_eq!(
            p.clean_up_url("/about", false, None).as_deref(),
            Some("https://site.example/about")
        );
    }

    #[test]
    fn rejects_forbidden_schemes() {
        let p = pipeline("https://site.example/");
        assert_eq!(p.clean_up_url("javascript:void(0)", false, None), None);
        assert_eq!(p.clean_up_url("mailto:a@b.com", false, None), None);
        assert_eq!(p.clean_up_url("data:image/png;base64,AAA", false, None), None);
    }

    #[test]
    fn rejects_fragment_only() {
        let p = pipeline("https://site.example/");
        assert_eq!(p.clean_up_url("#section", false, None), None);
    }

    #[test]
    fn rejects_out_of_scope_absolute_urls() {
        let p = pipeline("https://site.example/");
        assert_eq!(
            p.clean_up_url("https://other.example/x", false, None),
            None
        );
    }

    #[test]
    fn resolves_bare_relative_href_against_current_page_not_bare_origin() {
        let current_group = Rc::new(RefCell::new(Some(UrlGroup {
            url: Url::parse("https://site.example/p/").unwrap(),
            stack: Vec::new(),
        })));
        let p = UrlPipeline::new(
            Url::parse("https://site.example/").unwrap(),
            None,
            Vec::new(),
            Vec::new(),
            current_group,
        );
        assert_eq!(
            p.clean_up_url("a.png", false, None).as_deref(),
            Some("https://site.example/p/a.png")
        );
    }

    #[test]
    fn resolves_css_relative_against_css_file_url() {
        let p = pipeline("https://site.example/");
        let css_url = Url::parse("https://site.example/css/main.css").unwrap();
        assert_eq!(
            p.clean_up_url("../img/x.png", true, Some(&css_url))
                .as_deref(),
            Some("https://site.example/img/x.png")
        );
    }

    #[test]
    fn query_only_href_resolves_against_current_page() {
        let current_group = Rc::new(RefCell::new(Some(UrlGroup {
            url: Url::parse("https://site.example/page?old=1").unwrap(),
            stack: Vec::new(),
        })));
        let p = UrlPipeline::new(
            Url::parse("https://site.example/").unwrap(),
            None,
            Vec::new(),
            Vec::new(),
            current_group,
        );
        assert_eq!(
            p.clean_up_url("?foo=bar", false, None).as_deref(),
            Some("https://site.example/page?foo=bar")
        );
    }

    #[test]
    fn dedup_is_exact_string_match() {
        let current_group = Rc::new(RefCell::new(Some(UrlGroup {
            url: Url::parse("https://site.example/").unwrap(),
            stack: Vec::new(),
        })));
        let mut p = UrlPipeline::new(
            Url::parse("https://site.example/").unwrap(),
            None,
            Vec::new(),
            Vec::new(),
            current_group.clone(),
        );
        p.push_url("/about", false, None);
        p.push_url("/about", false, None);
        p.push_url("/about/", false, None); // distinct string, not deduped
        let stack = &current_group.borrow().as_ref().unwrap().stack;
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn forbidden_url_is_seen_but_not_queued() {
        let current_group = Rc::new(RefCell::new(Some(UrlGroup {
            url: Url::parse("https://site.example/").unwrap(),
            stack: Vec::new(),
        })));
        let mut p = UrlPipeline::new(
            Url::parse("https://site.example/").unwrap(),
            None,
            Vec::new(),
            vec!["https://site.example/admin".to_string()],
            current_group.clone(),
        );
        let cleaned = p.push_url("/admin/secret", false, None);
        assert_eq!(cleaned, "https://site.example/admin/secret");
        assert!(current_group.borrow().as_ref().unwrap().stack.is_empty());
    }
}
