//! Source-partitioned LRU cache of live scraper instances.
//!
//! Two intrusive doubly-linked lists share one arena of nodes: a global
//! list ordered by recency across all sources (head = oldest, tail =
//! newest) and, per source, a local list with the same ordering. `get`
//! detaches the newest entry of a source's local list (and its paired
//! global node); `insert` appends to both tails and evicts the global
//! head when `max_size` is exceeded. The cache itself never awaits —
//! eviction hands the caller the displaced value so an async `close()`
//! can run outside the lock.

use parking_lot::Mutex;
use std::collections::HashMap;

struct Node<T> {
    scraper: Option<T>,
    source: String,
    global_prev: Option<usize>,
    global_next: Option<usize>,
    local_prev: Option<usize>,
    local_next: Option<usize>,
}

struct Inner<T> {
    arena: Vec<Option<Node<T>>>,
    free: Vec<usize>,
    global_head: Option<usize>,
    global_tail: Option<usize>,
    // source -> (local_head, local_tail)
    source_ends: HashMap<String, (usize, usize)>,
    count: usize,
    max_size: usize,
}

impl<T> Inner<T> {
    fn alloc(&mut self, node: Node<T>) -> usize {
        if let Some(idx) = self.free.pop() {
            self.arena[idx] = Some(node);
            idx
        } else {
            self.arena.push(Some(node));
            self.arena.len() - 1
        }
    }

    fn free_idx(&mut self, idx: usize) -> Node<T> {
        let node = self.arena[idx].take().expect("freeing a live node");
        self.free.push(idx);
        node
    }

    fn push_global_tail(&mut self, idx: usize) {
        let prev_tail = self.global_tail;
        if let Some(prev) = prev_tail {
            self.arena[prev].as_mut().unwrap().global_next = Some(idx);
        } else {
            self.global_head = Some(idx);
        }
        let node = self.arena[idx].as_mut().unwrap();
        node.global_prev = prev_tail;
        node.global_next = None;
        self.global_tail = Some(idx);
    }

    fn detach_global(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.arena[idx].as_ref().unwrap();
            (node.global_prev, node.global_next)
        };
        match prev {
            Some(p) => self.arena[p].as_mut().unwrap().global_next = next,
            None => self.global_head = next,
        }
        match next {
            Some(n) => self.arena[n].as_mut().unwrap().global_prev = prev,
            None => self.global_tail = prev,
        }
    }

    fn push_local_tail(&mut self, source: &str, idx: usize) {
        let entry = self.source_ends.get(source).copied();
        if let Some((head, tail)) = entry {
            self.arena[tail].as_mut().unwrap().local_next = Some(idx);
            self.arena[idx].as_mut().unwrap().local_prev = Some(tail);
            self.arena[idx].as_mut().unwrap().local_next = None;
            self.source_ends.insert(source.to_string(), (head, idx));
        } else {
            self.arena[idx].as_mut().unwrap().local_prev = None;
            self.arena[idx].as_mut().unwrap().local_next = None;
            self.source_ends.insert(source.to_string(), (idx, idx));
        }
    }

    fn detach_local(&mut self, source: &str, idx: usize) {
        let (prev, next) = {
            let node = self.arena[idx].as_ref().unwrap();
            (node.local_prev, node.local_next)
        };
        match prev {
            Some(p) => self.arena[p].as_mut().unwrap().local_next = next,
            None => {
                if let Some(n) = next {
                    let (_, tail) = self.source_ends[source];
                    self.source_ends.insert(source.to_string(), (n, tail));
                }
            }
        }
        match next {
            Some(n) => self.arena[n].as_mut().unwrap().local_prev = prev,
            None => {
                if let Some(p) = prev {
                    let (head, _) = self.source_ends[source];
                    self.source_ends.insert(source.to_string(), (head, p));
                }
            }
        }
        if prev.is_none() && next.is_none() {
            self.source_ends.remove(source);
        }
    }

    fn evict_oldest(&mut self) -> Option<T> {
        let idx = self.global_head?;
        let source = self.arena[idx].as_ref().unwrap().source.clone();
        self.detach_global(idx);
        self.detach_local(&source, idx);
        self.count -= 1;
        let node = self.free_idx(idx);
        node.scraper
    }
}

pub struct ScraperLruCache<T> {
    inner: Mutex<Inner<T>>,
}

impl<T> ScraperLruCache<T> {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                arena: Vec::new(),
                free: Vec::new(),
                global_head: None,
                global_tail: None,
                source_ends: HashMap::new(),
                count: 0,
                max_size,
            }),
        }
    }

    /// Number of live entries currently held by the cache.
    pub fn len(&self) -> usize {
        self.inner.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return the newest cached scraper for `source`, if any.
    /// The instance becomes exclusive to the caller.
    pub fn get(&self, source: &str) -> Option<T> {
        let mut inner = self.inner.lock();
        let (_, tail) = *inner.source_ends.get(source)?;
        inner.detach_global(tail);
        inner.detach_local(source, tail);
        inner.count -= 1;
        let node = inner.free_idx(tail);
        node.scraper
    }

    /// Insert a scraper for `source`. If the cache exceeds `max_size` as a
    /// result, the globally oldest entry is evicted and returned so the
    /// caller can close it.
    pub fn insert(&self, source: &str, scraper: T) -> Option<T> {
        let mut inner = self.inner.lock();
        let node = Node {
            scraper: Some(scraper),
            source: source.to_string(),
            global_prev: None,
            global_next: None,
            local_prev: None,
            local_next: None,
        };
        let idx = inner.alloc(node);
        inner.push_global_tail(idx);
        inner.push_local_tail(source, idx);
        inner.count += 1;

        if inner.count > inner.max_size {
            inner.evict_oldest()
        } else {
            None
        }
    }

    /// Remove and return every cached entry, oldest-global-first. Used on
    /// process shutdown so the caller can `close()` each one; after this
    /// call the cache is empty.
    pub fn drain(&self) -> Vec<T> {
        let mut inner = self.inner.lock();
        let mut drained = Vec::with_capacity(inner.count);
        while let Some(scraper) = inner.evict_oldest() {
            drained.push(scraper);
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_on_empty_source_returns_none() {
        let cache: ScraperLruCache<u32> = ScraperLruCache::new(4);
        assert!(cache.get("amazon").is_none());
    }

    #[test]
    fn insert_then_get_returns_same_instance_and_restores_count() {
        let cache = ScraperLruCache::new(4);
        assert!(cache.insert("amazon", 1u32).is_none());
        assert_eq!(cache.len(), 1);
        let got = cache.get("amazon");
        assert_eq!(got, Some(1));
        assert_eq!(cache.len(), 0);
        assert!(cache.get("amazon").is_none());
    }

    #[test]
    fn eviction_removes_globally_oldest() {
        let cache = ScraperLruCache::new(2);
        assert!(cache.insert("a", "scraper-a").is_none());
        assert!(cache.insert("b", "scraper-b").is_none());
        let evicted = cache.insert("c", "scraper-c");
        assert_eq!(evicted, Some("scraper-a"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("b"), Some("scraper-b"));
        assert_eq!(cache.get("c"), Some("scraper-c"));
    }

    #[test]
    fn local_lengths_sum_to_global_count() {
        let cache = ScraperLruCache::new(10);
        cache.insert("a", 1);
        cache.insert("a", 2);
        cache.insert("b", 3);
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("a"), Some(2));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("b"), Some(3));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn drain_empties_the_cache_oldest_first() {
        let cache = ScraperLruCache::new(10);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 3);
        assert_eq!(cache.drain(), vec![1, 2, 3]);
        assert_eq!(cache.len(), 0);
        assert!(cache.get("a").is_none());
    }
}
