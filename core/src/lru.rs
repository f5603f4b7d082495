//! Fixed-capacity least-recently-used cache.
//!
//! A doubly linked list threaded through a slab of nodes (indices instead of
//! pointers) plus a key -> slot map. The head is the most recently used entry,
//! the tail the next to be evicted. Both `get` and `put` refresh recency, so
//! callers sharing a cache across threads must wrap it in a single lock.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

pub struct LruCache<K, V> {
    capacity: usize,
    map: HashMap<K, usize>,
    slots: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V> {
    /// A cache of capacity 0 never retains anything.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            map: HashMap::with_capacity(capacity.min(1024)),
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
        }
    }

    pub fn capacity(&self) -> usize { self.capacity }

    pub fn len(&self) -> usize { self.map.len() }

    pub fn is_empty(&self) -> bool { self.map.is_empty() }

    /// Looks up `key` and marks it most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.move_to_front(idx);
        self.slots[idx].as_ref().map(|n| &n.value)
    }

    /// Membership test that leaves recency untouched.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Inserts or replaces `key`, marking it most recently used. Returns the
    /// evicted entry, if the insert pushed the cache over capacity.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        if self.capacity == 0 {
            return Some((key, value));
        }
        if let Some(&idx) = self.map.get(&key) {
            if let Some(node) = self.slots[idx].as_mut() {
                node.value = value;
            }
            self.move_to_front(idx);
            return None;
        }

        let node = Node { key: key.clone(), value, prev: None, next: None };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        self.map.insert(key, idx);
        self.push_front(idx);

        if self.map.len() > self.capacity {
            return self.pop_back();
        }
        None
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Vec<&K> {
        let mut out = Vec::with_capacity(self.len());
        let mut cur = self.head;
        while let Some(idx) = cur {
            let node = self.slots[idx].as_ref().expect("linked slot is occupied");
            out.push(&node.key);
            cur = node.next;
        }
        out
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node<K, V> {
        self.slots[idx].as_mut().expect("linked slot is occupied")
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.node_mut(idx);
            let links = (node.prev, node.next);
            node.prev = None;
            node.next = None;
            links
        };
        match prev {
            Some(p) => self.node_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev = prev,
            None => self.tail = prev,
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let node = self.node_mut(idx);
            node.prev = None;
            node.next = old_head;
        }
        if let Some(h) = old_head {
            self.node_mut(h).prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.push_front(idx);
    }

    fn pop_back(&mut self) -> Option<(K, V)> {
        let idx = self.tail?;
        self.unlink(idx);
        let node = self.slots[idx].take()?;
        self.free.push(idx);
        self.map.remove(&node.key);
        Some((node.key, node.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_put() {
        let mut cache = LruCache::new(2);
        cache.put("a", 1);
        cache.put("b", 2);
        let evicted = cache.put("c", 3);
        assert_eq!(evicted, Some(("a", 1)));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(&2));
        assert_eq!(cache.get("c"), Some(&3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn get_refreshes_recency() {
        let mut cache = LruCache::new(2);
        cache.put("a", 1);
        cache.put("b", 2);
        assert_eq!(cache.get("a"), Some(&1));
        cache.put("c", 3);
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert_eq!(cache.keys(), vec![&"c", &"a"]);
    }

    #[test]
    fn put_existing_key_replaces_and_refreshes() {
        let mut cache = LruCache::new(2);
        cache.put("a", 1);
        cache.put("b", 2);
        assert_eq!(cache.put("a", 10), None);
        cache.put("c", 3);
        assert_eq!(cache.get("a"), Some(&10));
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn slots_are_reused_after_eviction() {
        let mut cache = LruCache::new(3);
        for i in 0..100 {
            cache.put(i, i * 2);
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.keys(), vec![&99, &98, &97]);
        assert!(cache.slots.len() <= 4);
    }

    #[test]
    fn capacity_one_and_zero() {
        let mut one = LruCache::new(1);
        one.put("a", 1);
        one.put("b", 2);
        assert_eq!(one.get("a"), None);
        assert_eq!(one.get("b"), Some(&2));

        let mut zero = LruCache::new(0);
        assert_eq!(zero.put("a", 1), Some(("a", 1)));
        assert!(zero.is_empty());
    }

    #[test]
    fn string_keys_lookup_by_str() {
        let mut cache: LruCache<String, Vec<u32>> = LruCache::new(4);
        cache.put("rust lang".to_string(), vec![1, 2]);
        assert_eq!(cache.get("rust lang"), Some(&vec![1, 2]));
        cache.clear();
        assert!(cache.get("rust lang").is_none());
    }
}
