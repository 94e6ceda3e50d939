//! Reference in-memory store.

use dashmap::DashMap;

use super::{CacheStore, Lookup};

/// Thread-safe map-backed store. Entries live until deleted; eviction is
/// the embedding application's concern.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            entries: DashMap::new(),
        }
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Lookup {
        match self.entries.get(key) {
            Some(blob) => Lookup::Hit(blob.value().clone()),
            None => Lookup::Miss,
        }
    }

    fn set(&self, key: &str, blob: Vec<u8>) {
        self.entries.insert(key.to_owned(), blob);
    }

    fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete() {
        let store = MemoryStore::new();
        assert!(matches!(store.get("k"), Lookup::Miss));

        store.set("k", vec![1, 2, 3]);
        assert_eq!(store.len(), 1);
        assert!(matches!(store.get("k"), Lookup::Hit(blob) if blob == vec![1, 2, 3]));

        store.set("k", vec![4]);
        assert_eq!(store.len(), 1);
        assert!(matches!(store.get("k"), Lookup::Hit(blob) if blob == vec![4]));

        store.delete("k");
        assert!(store.is_empty());
    }
}
