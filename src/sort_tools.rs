/// Exposed to `sort_pages_to_download` so a hook can reorder, filter, or
/// pin pages within a group without touching the scheduler's own queue
/// plumbing.
pub struct UrlSortTools {
    kept: Vec<String>,
    removed_before: Vec<String>,
    removed_after: Vec<String>,
}

impl UrlSortTools {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            kept: urls,
            removed_before: Vec::new(),
            removed_after: Vec::new(),
        }
    }

    /// Removes every URL matching `predicate` from the kept list, returning
    /// them in their original relative order.
    pub fn remove<F: Fn(&str) -> bool>(&mut self, predicate: F) -> Vec<String> {
        let mut removed = Vec::new();
        self.kept.retain(|url| {
            if predicate(url) {
                removed.push(url.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn sort_asc(&mut self) {
        self.kept.sort();
    }

    pub fn add_removed_before(&mut self, urls: Vec<String>) {
        self.removed_before.extend(urls);
    }

    pub fn add_removed_after(&mut self, urls: Vec<String>) {
        self.removed_after.extend(urls);
    }

    pub fn result(self) -> Vec<String> {
        let mut out = self.removed_before;
        out.extend(self.kept);
        out.extend(self.removed_after);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_then_requeue_before_and_after() {
        let mut tools = UrlSortTools::new(vec![
            "/c".to_string(),
            "/a".to_string(),
            "/login".to_string(),
            "/b".to_string(),
        ]);
        let removed = tools.remove(|u| u == "/login");
        tools.sort_asc();
        tools.add_removed_before(removed);

        assert_eq!(tools.result(), vec!["/login", "/a", "/b", "/c"]);
    }

    #[test]
    fn untouched_list_round_trips() {
        let tools = UrlSortTools::new(vec!["/a".to_string(), "/b".to_string()]);
        assert_eq!(tools.result(), vec!["/a", "/b"]);
    }
}
