use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use tracing::debug;

/// Sorted projection of the usernames held by the store.
///
/// Rebuilt in full after every insert or delete; readers always see a
/// complete snapshot because the new vector is built aside and swapped in.
pub struct NameIndex {
    names: ArcSwap<Vec<String>>,
}

impl Default for NameIndex {
    fn default() -> Self { Self::new() }
}

impl NameIndex {
    pub fn new() -> Self {
        Self { names: ArcSwap::from_pointee(Vec::new()) }
    }

    /// Replace the index with the sorted, de-duplicated `keys`.
    pub fn rebuild<'a, I>(&self, keys: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut names: Vec<String> = keys.into_iter().cloned().collect();
        names.sort_unstable();
        names.dedup();
        self.names.store(Arc::new(names));
    }

    pub fn snapshot(&self) -> Arc<Vec<String>> {
        self.names.load_full()
    }

    pub fn len(&self) -> usize {
        self.names.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Case-sensitive substring scan in ascending order, stopping after `limit` hits.
    pub fn search(&self, needle: &str, limit: Option<usize>) -> Vec<String> {
        let names = self.names.load();
        let hits = names.iter().filter(|n| n.contains(needle)).cloned();
        match limit {
            Some(max) => hits.take(max).collect(),
            None => hits.collect(),
        }
    }

    /// Name listing as exposed to callers.
    ///
    /// An empty `search` returns every name. Otherwise at most `page_size`
    /// matches are returned, any negative `page_size` meaning no cap.
    /// `page` is accepted but page slicing is not implemented.
    pub fn lookup_names(&self, search: &str, _page: i64, page_size: i64) -> Vec<String> {
        if search.is_empty() {
            return self.snapshot().as_ref().clone();
        }
        let limit = usize::try_from(page_size).ok();
        let started = Instant::now();
        let hits = self.search(search, limit);
        debug!(search, hits = hits.len(), elapsed = ?started.elapsed(), "name search");
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(names: &[&str]) -> NameIndex {
        let owned: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        let idx = NameIndex::new();
        idx.rebuild(owned.iter());
        idx
    }

    #[test]
    fn rebuild_sorts_and_dedups() {
        let idx = index_of(&["carol", "alice", "bob", "alice"]);
        assert_eq!(*idx.snapshot(), vec!["alice", "bob", "carol"]);
        assert_eq!(idx.len(), 3);
    }

    #[test]
    fn old_snapshot_survives_rebuild() {
        let idx = index_of(&["a", "b"]);
        let before = idx.snapshot();
        idx.rebuild(std::iter::empty());
        assert_eq!(before.len(), 2);
        assert!(idx.is_empty());
    }

    #[test]
    fn empty_search_ignores_page_size() {
        let idx = index_of(&["b", "a", "c"]);
        assert_eq!(idx.lookup_names("", 3, 1), vec!["a", "b", "c"]);
        assert_eq!(idx.lookup_names("", -1, -1).len(), 3);
    }

    #[test]
    fn substring_search_is_case_sensitive_and_capped() {
        let idx = index_of(&["testA", "xtest", "Test", "other", "test2"]);
        assert_eq!(idx.lookup_names("test", -1, -1), vec!["test2", "testA", "xtest"]);
        assert_eq!(idx.lookup_names("test", 0, 2), vec!["test2", "testA"]);
        assert_eq!(idx.lookup_names("test", 0, -7).len(), 3);
        assert!(idx.lookup_names("test", 0, 0).is_empty());
        assert!(idx.lookup_names("nomatch", -1, -1).is_empty());
    }
}
