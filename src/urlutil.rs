use url::Url;

const RESOURCE_EXTENSIONS: &[&str] = &[
    "css", "js", "jpg", "png", "jpeg", "gif", "woff", "woff2", "ttf", "txt", "avif",
];

/// The final `/`-delimited segment of a URL's path, e.g. `"about"` for
/// `/a/about`, or `""` for `/a/`.
pub fn last_path_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

pub fn has_extension(segment: &str) -> bool {
    segment.rfind('.').is_some()
}

/// `is_resource` depends only on the extension of the URL's pathname, per the
/// url-group split: pages have no recognized resource extension, resources do.
pub fn is_resource_url(u: &Url) -> bool {
    let last = last_path_segment(u.path());
    match last.rfind('.') {
        Some(idx) => {
            let ext = last[idx + 1..].to_ascii_lowercase();
            RESOURCE_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

/// `scheme://host[:port]` for `u`, discarding path/query/fragment.
pub fn origin_url(u: &Url) -> Url {
    let mut origin = u.clone();
    origin.set_path("");
    origin.set_query(None);
    origin.set_fragment(None);
    origin
}

/// `u`'s path relative to `origin`'s root, with query/fragment stripped and
/// no leading `/`. Used both for the mirror's on-disk path and for computing
/// relocatable link depth.
pub fn root_relative_raw(u: &Url) -> String {
    u.path().trim_start_matches('/').to_string()
}

/// Same as [`root_relative_raw`], but applies the index-file convention: a
/// trailing `/` or an extensionless last segment resolves to `index.html`.
pub fn root_relative_with_index(u: &Url) -> String {
    let mut path = u.path().to_string();
    if path.ends_with('/') {
        path.push_str("index.html");
    } else {
        let last = last_path_segment(&path);
        if !has_extension(last) {
            path.push_str("/index.html");
        }
    }
    path.trim_start_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_resources_by_extension_only() {
        let css = Url::parse("https://site.example/assets/app.css?x=1").unwrap();
        let page = Url::parse("https://site.example/about").unwrap();
        let page_trailing = Url::parse("https://site.example/about/").unwrap();
        assert!(is_resource_url(&css));
        assert!(!is_resource_url(&page));
        assert!(!is_resource_url(&page_trailing));
    }

    #[test]
    fn index_convention_handles_trailing_slash_and_no_extension() {
        let root = Url::parse("https://site.example/").unwrap();
        let about = Url::parse("https://site.example/about").unwrap();
        let asset = Url::parse("https://site.example/about/x.png").unwrap();
        assert_eq!(root_relative_with_index(&root), "index.html");
        assert_eq!(root_relative_with_index(&about), "about/index.html");
        assert_eq!(root_relative_with_index(&asset), "about/x.png");
    }
}
