//! Element bookkeeping for one session.

use crate::protocol::{Bound, ElementKind, ElementRecord};
use indexmap::IndexMap;
use tokio::sync::watch;

/// Insertion-ordered store of the elements created in this session.
///
/// Keys come from a monotonic counter, so removing an element never frees
/// its key for reuse. The counter is published on a watch channel for
/// callers that need to wait for a number of elements to exist.
#[derive(Debug)]
pub struct ElementStore {
    elements: IndexMap<String, ElementRecord>,
    created: u64,
    created_tx: watch::Sender<u64>,
}

impl ElementStore {
    pub fn new() -> Self {
        let (created_tx, _) = watch::channel(0);
        Self {
            elements: IndexMap::new(),
            created: 0,
            created_tx,
        }
    }

    /// Create and insert an element, returning the stored record.
    pub fn create(&mut self, kind: ElementKind, content: String) -> &ElementRecord {
        let key = format!("{}-{}", kind.as_str(), self.created);
        self.created += 1;
        self.created_tx.send_replace(self.created);

        let record = ElementRecord {
            key: key.clone(),
            kind,
            bound: Bound::default(),
            content,
        };
        let (index, _) = self.elements.insert_full(key, record);
        &self.elements[index]
    }

    pub fn get(&self, key: &str) -> Option<&ElementRecord> {
        self.elements.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.elements.contains_key(key)
    }

    /// Remove an element, keeping the order of the rest.
    pub fn remove(&mut self, key: &str) -> Option<ElementRecord> {
        self.elements.shift_remove(key)
    }

    /// Elements currently held, in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &ElementRecord> {
        self.elements.values()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Number of elements ever created, including removed ones.
    pub fn created(&self) -> u64 {
        self.created
    }

    /// Watch the created count.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.created_tx.subscribe()
    }
}

impl Default for ElementStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ordinal(key: &str) -> u64 {
        key.rsplit_once('-').unwrap().1.parse().unwrap()
    }

    #[test]
    fn test_keys_are_kind_and_ordinal() {
        let mut store = ElementStore::new();
        assert_eq!(store.create(ElementKind::Basic, "a".into()).key, "basic-0");
        assert_eq!(store.create(ElementKind::View, "b".into()).key, "view-1");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_keys_never_reused_after_removal() {
        let mut store = ElementStore::new();
        let mut keys = Vec::new();
        for i in 0..5 {
            let key = store.create(ElementKind::Basic, i.to_string()).key.clone();
            keys.push(key.clone());
            if i % 2 == 0 {
                assert!(store.remove(&key).is_some());
            }
        }
        let ordinals: Vec<u64> = keys.iter().map(|k| ordinal(k)).collect();
        assert!(ordinals.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(store.created(), 5);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_insertion_order_survives_removal() {
        let mut store = ElementStore::new();
        store.create(ElementKind::Basic, "a".into());
        store.create(ElementKind::Basic, "b".into());
        store.create(ElementKind::Basic, "c".into());
        store.remove("basic-1");
        let contents: Vec<&str> = store.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "c"]);
    }

    #[test]
    fn test_unknown_key() {
        let mut store = ElementStore::new();
        assert!(store.remove("basic-9").is_none());
        assert!(!store.contains("basic-9"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_sees_created_count() {
        let mut store = ElementStore::new();
        let mut rx = store.subscribe();
        store.create(ElementKind::Basic, "a".into());
        store.create(ElementKind::View, "https://example.com".into());
        let count = *rx.wait_for(|n| *n >= 2).await.unwrap();
        assert_eq!(count, 2);
    }
}
