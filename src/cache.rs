use std::cell::Cell;

use crate::utils::MyHash;

struct Entry<K, V> {
    key: K,
    value: V,
}

/// Direct-mapped computed table: a newer entry simply evicts the older one.
pub struct Cache<K, V> {
    data: Vec<Option<Entry<K, V>>>,
    bitmask: u64,
    hits: Cell<usize>,
    misses: Cell<usize>,
}

impl<K, V> Cache<K, V>
where
    K: MyHash + Eq,
{
    /// Create a new table of size `2^bits`.
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 31, "Bits should be in the range 0..=31");

        let size = 1 << bits;
        let bitmask = (size - 1) as u64;

        Self {
            data: std::iter::repeat_with(|| None).take(size).collect(),
            bitmask,
            hits: Cell::new(0),
            misses: Cell::new(0),
        }
    }

    /// Get the number of cache hits.
    pub fn hits(&self) -> usize {
        self.hits.get()
    }
    /// Get the number of cache misses.
    pub fn misses(&self) -> usize {
        self.misses.get()
    }

    fn index(&self, key: &K) -> usize {
        (key.hash() & self.bitmask) as usize
    }

    /// Get the cached result.
    pub fn get(&self, key: &K) -> Option<&V> {
        match &self.data[self.index(key)] {
            Some(entry) if entry.key == *key => {
                self.hits.set(self.hits.get() + 1);
                Some(&entry.value)
            }
            _ => {
                self.misses.set(self.misses.get() + 1);
                None
            }
        }
    }

    /// Insert a result into the cache.
    pub fn insert(&mut self, key: K, value: V) {
        let index = self.index(&key);
        self.data[index] = Some(Entry { key, value });
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::utils::pairing2;

    #[derive(Debug, Eq, PartialEq)]
    struct Key(u64, u64);

    impl MyHash for Key {
        fn hash(&self) -> u64 {
            pairing2(self.0, self.1)
        }
    }

    #[test]
    fn test_cache() {
        let mut cache = Cache::<Key, i32>::new(3);

        cache.insert(Key(1, 2), 3);
        cache.insert(Key(2, 3), 1);

        assert_eq!(cache.get(&Key(1, 2)), Some(&3));
        assert_eq!(cache.get(&Key(2, 3)), Some(&1));
        assert_eq!(cache.get(&Key(2, 1)), None);
        assert_eq!(cache.hits(), 2);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_cache_evicts_on_collision() {
        let mut cache = Cache::<Key, i32>::new(0);
        cache.insert(Key(1, 2), 3);
        cache.insert(Key(4, 5), 6);
        assert_eq!(cache.get(&Key(1, 2)), None);
        assert_eq!(cache.get(&Key(4, 5)), Some(&6));
    }
}
