use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Context as _;
use url::Url;

use crate::urlutil::{root_relative_raw, root_relative_with_index};

pub struct CacheEntry {
    pub added_date: SystemTime,
    pub file_path: PathBuf,
}

/// The on-disk mirror of a crawled site, rooted under `root_dir/localhost/...`
/// so every stored page and resource sits under one synthetic host directory
/// regardless of the scheme/host/port it was actually fetched from.
pub struct MirrorCache {
    root_dir: PathBuf,
}

impl MirrorCache {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn calc_file_path(&self, url: &Url) -> PathBuf {
        let relative = root_relative_with_index(url);
        let mut path = self.root_dir.join("localhost");
        for segment in relative.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                continue;
            }
            path = path.join(segment);
        }
        path
    }

    pub fn has_in_cache(&self, url: &Url) -> Option<CacheEntry> {
        let file_path = self.calc_file_path(url);
        let metadata = std::fs::metadata(&file_path).ok()?;
        let added_date = metadata.modified().unwrap_or(SystemTime::now());
        Some(CacheEntry {
            added_date,
            file_path,
        })
    }

    pub fn add_to_cache(&self, url: &Url, status: u16, body: &[u8]) -> anyhow::Result<()> {
        if status != 200 {
            return Ok(());
        }

        let file_path = self.calc_file_path(url);
        let parent_dir = file_path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("mirrored path has no parent: {}", file_path.display()))?;
        std::fs::create_dir_all(parent_dir)
            .with_context(|| format!("create mirror dir: {}", parent_dir.display()))?;
        std::fs::write(&file_path, body)
            .with_context(|| format!("write mirrored file: {}", file_path.display()))?;
        Ok(())
    }
}

/// `url_tool_build_filesystem_url`: rewrites `target` into a path relative to
/// `current_page_url`'s mirrored file, so the output tree can be opened from
/// `file://` without a server.
pub fn build_relocatable_url(current_page_url: &Url, target: &Url) -> String {
    let p = root_relative_with_index(target);
    let c_with_index = root_relative_with_index(current_page_url);
    if c_with_index.is_empty() || c_with_index == p {
        return p;
    }

    let c_raw = root_relative_raw(current_page_url);
    let depth = if c_raw.is_empty() {
        0
    } else {
        let segment_count = c_raw.split('/').count();
        if c_raw.ends_with('/') {
            segment_count.saturating_sub(1)
        } else {
            segment_count
        }
    };

    format!("{}{p}", "../".repeat(depth))
}

pub fn absolute_root_path(target: &Url) -> String {
    format!("/{}", root_relative_with_index(target))
}
