//! Streaming extraction and rewriting of page references: `href`/`src`
//! attributes, `srcset` candidate lists, and CSS `url(...)` targets.
//!
//! Rewriting a page happens in two passes over the same bytes. `lol_html`'s
//! element handlers are plain synchronous closures, but admitting a URL can
//! run a user hook (`transform_url`) that is declared `async` (§5/§9 of the
//! design: hooks may defer). So the passes split cleanly: the first walk is
//! read-only and just collects every `href`/`src`/`srcset` occurrence in
//! document order; the caller (the scheduler) resolves each raw value
//! against the URL pipeline and hooks with `.await` in between; the second
//! walk substitutes the resolved values back in.

use std::collections::HashMap;

use lol_html::html_content::Element;
use lol_html::{HtmlRewriter, Settings, element};
use once_cell::sync::Lazy;
use regex::Regex;

const HREF_SELECTOR: &str = "a[href], link[href]";
const SRC_SELECTOR: &str = "img[src], script[src], iframe[src], source[src]";
const SRCSET_SELECTOR: &str = "img[srcset]";

/// One `href`/`src` occurrence, keyed by its exact original attribute text.
#[derive(Debug, Clone)]
pub struct HrefRef {
    pub raw: String,
}

#[derive(Debug, Clone)]
pub struct SrcsetCandidate {
    pub url: String,
    pub descriptor: String,
}

/// One `srcset` occurrence: the whole attribute plus its parsed candidates.
#[derive(Debug, Clone)]
pub struct SrcsetRef {
    pub raw: String,
    pub candidates: Vec<SrcsetCandidate>,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractedReferences {
    pub hrefs: Vec<HrefRef>,
    pub srcsets: Vec<SrcsetRef>,
}

/// First pass: walks every selector/attribute pair this crate rewrites,
/// without mutating anything, and records each occurrence in the order the
/// tokenizer encountered it.
pub fn extract_html_references(html: &str) -> ExtractedReferences {
    let hrefs_cell = std::cell::RefCell::new(Vec::<HrefRef>::new());
    let srcsets_cell = std::cell::RefCell::new(Vec::<SrcsetRef>::new());

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![
                element!(HREF_SELECTOR, |el| {
                    if let Some(raw) = el.get_attribute("href") {
                        hrefs_cell.borrow_mut().push(HrefRef { raw });
                    }
                    Ok(())
                }),
                element!(SRC_SELECTOR, |el| {
                    if let Some(raw) = el.get_attribute("src") {
                        hrefs_cell.borrow_mut().push(HrefRef { raw });
                    }
                    Ok(())
                }),
                element!(SRCSET_SELECTOR, |el| {
                    if let Some(raw) = el.get_attribute("srcset") {
                        let candidates = parse_srcset(&raw);
                        srcsets_cell.borrow_mut().push(SrcsetRef { raw, candidates });
                    }
                    Ok(())
                }),
            ],
            ..Settings::default()
        },
        |_: &[u8]| {},
    );

    let _ = rewriter.write(html.as_bytes());
    let _ = rewriter.end();
    drop(rewriter);

    ExtractedReferences {
        hrefs: hrefs_cell.into_inner(),
        srcsets: srcsets_cell.into_inner(),
    }
}

/// Splits a `srcset` attribute on top-level commas, then each candidate on
/// its first whitespace run into `(url, descriptor)`. A candidate with no
/// whitespace run (no descriptor, e.g. a bare trailing URL) is dropped
/// silently, per the format's own parsing rule.
fn parse_srcset(raw: &str) -> Vec<SrcsetCandidate> {
    raw.split(',')
        .filter_map(|part| {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                return None;
            }
            let mut split = trimmed.splitn(2, char::is_whitespace);
            let url = split.next()?.to_string();
            let descriptor = split.next().map(str::trim).unwrap_or("").to_string();
            if descriptor.is_empty() {
                return None;
            }
            Some(SrcsetCandidate { url, descriptor })
        })
        .collect()
}

/// Second pass: re-walks `html`, replacing each `href`/`src` occurrence
/// whose raw text is a key in `href_final`, and each `srcset` occurrence
/// whose raw text is a key in `srcset_final`. An occurrence with no
/// matching key is left exactly as it appeared.
pub fn apply_html_rewrite(
    html: &str,
    href_final: &HashMap<String, String>,
    srcset_final: &HashMap<String, String>,
) -> Result<String, lol_html::errors::RewritingError> {
    let mut output = Vec::with_capacity(html.len());

    {
        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: vec![
                    element!(HREF_SELECTOR, |el| {
                        rewrite_attr(el, "href", href_final);
                        Ok(())
                    }),
                    element!(SRC_SELECTOR, |el| {
                        rewrite_attr(el, "src", href_final);
                        Ok(())
                    }),
                    element!(SRCSET_SELECTOR, |el| {
                        rewrite_attr(el, "srcset", srcset_final);
                        Ok(())
                    }),
                ],
                ..Settings::default()
            },
            |c: &[u8]| output.extend_from_slice(c),
        );

        rewriter.write(html.as_bytes())?;
        rewriter.end()?;
    }

    Ok(String::from_utf8_lossy(&output).into_owned())
}

fn rewrite_attr(el: &mut Element, attr: &str, final_by_raw: &HashMap<String, String>) {
    let Some(raw) = el.get_attribute(attr) else {
        return;
    };
    if let Some(replacement) = final_by_raw.get(&raw) {
        let _ = el.set_attribute(attr, replacement);
    }
}

/// Joins rewritten `srcset` candidates back into one attribute value, e.g.
/// `../p/a.png 1x,../p/b.png 2x` (no space after the comma, matching the
/// boundary scenario this format is tested against).
pub fn join_srcset(candidates: &[(String, String)]) -> String {
    candidates
        .iter()
        .map(|(url, descriptor)| format!("{url} {descriptor}"))
        .collect::<Vec<_>>()
        .join(",")
}

static CSS_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^)'"]*?))\s*\)"#).unwrap());

/// Every `url(...)` target in a CSS text, in encounter order, with
/// surrounding quotes stripped. Does not deduplicate; the caller's URL
/// pipeline seen-set handles that.
pub fn extract_css_urls(css: &str) -> Vec<String> {
    CSS_URL_RE
        .captures_iter(css)
        .filter_map(|caps| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().trim().to_string())
        })
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_href_and_src_occurrences_in_order() {
        let html = r#"<a href="/about">About</a><img src="logo.png">"#;
        let refs = extract_html_references(html);
        assert_eq!(refs.hrefs.len(), 2);
        assert_eq!(refs.hrefs[0].raw, "/about");
        assert_eq!(refs.hrefs[1].raw, "logo.png");
    }

    #[test]
    fn extracts_srcset_and_drops_descriptor_less_candidates() {
        let html = r#"<img srcset="a.png 1x, b.png 2x, bare.png">"#;
        let refs = extract_html_references(html);
        assert_eq!(refs.srcsets.len(), 1);
        let candidates = &refs.srcsets[0].candidates;
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].url, "a.png");
        assert_eq!(candidates[0].descriptor, "1x");
        assert_eq!(candidates[1].url, "b.png");
        assert_eq!(candidates[1].descriptor, "2x");
    }

    #[test]
    fn rewrites_matched_href_and_leaves_others_untouched() {
        let html = r#"<a href="/about">About</a><a href="/contact">Contact</a>"#;
        let mut map = HashMap::new();
        map.insert("/about".to_string(), "../about/index.html".to_string());
        let out = apply_html_rewrite(html, &map, &HashMap::new()).unwrap();
        assert!(out.contains(r#"href="../about/index.html""#));
        assert!(out.contains(r#"href="/contact""#));
    }

    #[test]
    fn rewrites_srcset_attribute_whole() {
        let html = r#"<img srcset="a.png 1x, b.png 2x">"#;
        let mut map = HashMap::new();
        map.insert(
            "a.png 1x, b.png 2x".to_string(),
            "../p/a.png 1x,../p/b.png 2x".to_string(),
        );
        let out = apply_html_rewrite(html, &HashMap::new(), &map).unwrap();
        assert!(out.contains(r#"srcset="../p/a.png 1x,../p/b.png 2x""#));
    }

    #[test]
    fn extracts_css_url_targets_with_and_without_quotes() {
        let css = "body { background: url(../img/x.png); } a { background: url('y.png'); }";
        let urls = extract_css_urls(css);
        assert_eq!(urls, vec!["../img/x.png".to_string(), "y.png".to_string()]);
    }

    #[test]
    fn join_srcset_has_no_space_after_comma() {
        let joined = join_srcset(&[
            ("../p/a.png".to_string(), "1x".to_string()),
            ("../p/b.png".to_string(), "2x".to_string()),
        ]);
        assert_eq!(joined, "../p/a.png 1x,../p/b.png 2x");
    }
}
