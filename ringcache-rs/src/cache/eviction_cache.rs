use fnv::FnvHashMap;

use crate::cache::policy::{EvictionPolicy, PolicyKind};

/// Returns the number of bytes a value accounts for in a cache budget.
pub trait ByteSize {
    /// Returns the size of the value in bytes.
    ///
    /// The budget of a cache is computed as the sum of the key length and this size for each
    /// entry, so this should represent the payload and not the bookkeeping of the value.
    fn byte_size(&self) -> usize;
}

impl ByteSize for String {
    fn byte_size(&self) -> usize {
        self.len()
    }
}

impl ByteSize for Vec<u8> {
    fn byte_size(&self) -> usize {
        self.len()
    }
}

/// Invoked with key and value of each entry which leaves the cache.
pub type EvictionCallback<V> = Box<dyn FnMut(&str, &V) + Send>;

/// Provides a byte budgeted cache with a pluggable replacement policy.
///
/// A cache behaves just like a **Map** as long as its budget suffices. Once the total size of
/// all keys and values exceeds **max_memory**, entries are evicted in the order determined by
/// the [EvictionPolicy](crate::cache::EvictionPolicy) until the budget is met again. A budget of
/// **0** disables eviction altogether.
///
/// The entry which has just been written is never chosen as victim while making room for
/// itself. Therefore an entry which alone exceeds the budget evicts everything else and then
/// stays, leaving the cache over budget until the next write.
///
/// Note that a cache is not thread safe. Use a [GuardedCache](crate::cache::GuardedCache) to
/// share one.
///
/// # Examples
/// ```
/// # use ringcache::cache::{EvictionCache, PolicyKind};
/// // A cache which can hold 24 bytes of keys and values...
/// let mut lru = EvictionCache::new(24, PolicyKind::Lru);
///
/// lru.put("key1".to_owned(), "value1".to_owned());
/// lru.put("key2".to_owned(), "value2".to_owned());
/// assert_eq!(lru.len(), 2);
///
/// // ..reading key1 makes key2 the least recently used entry...
/// assert_eq!(lru.get("key1").unwrap(), "value1");
///
/// // ..which is therefore evicted to make room for key3.
/// lru.put("key3".to_owned(), "value3".to_owned());
/// assert_eq!(lru.get("key2"), None);
/// assert_eq!(lru.len(), 2);
/// assert_eq!(lru.allocated_memory(), 20);
/// ```
pub struct EvictionCache<V: ByteSize> {
    max_memory: usize,
    allocated_memory: usize,
    reads: usize,
    hits: usize,
    writes: usize,
    entries: FnvHashMap<String, Entry<V>>,
    policy: Box<dyn EvictionPolicy>,
    on_evicted: Option<EvictionCallback<V>>,
}

struct Entry<V: ByteSize> {
    mem_size: usize,
    value: V,
}

impl<V: ByteSize> EvictionCache<V> {
    /// Creates a new cache with the given budget (in bytes) using the given policy.
    pub fn new(max_memory: usize, policy: PolicyKind) -> Self {
        EvictionCache::with_policy(max_memory, policy.create())
    }

    /// Creates a new cache using a custom policy.
    pub fn with_policy(max_memory: usize, policy: Box<dyn EvictionPolicy>) -> Self {
        EvictionCache {
            max_memory,
            allocated_memory: 0,
            reads: 0,
            hits: 0,
            writes: 0,
            entries: FnvHashMap::default(),
            policy,
            on_evicted: None,
        }
    }

    /// Installs a callback which is invoked for every entry leaving the cache.
    ///
    /// This covers evictions and explicit removals, but neither replacing the value of an
    /// existing key nor [flush](EvictionCache::flush).
    ///
    /// # Examples
    /// ```
    /// # use ringcache::cache::{EvictionCache, PolicyKind};
    /// # use std::sync::{Arc, Mutex};
    /// let evicted = Arc::new(Mutex::new(Vec::new()));
    /// let log = evicted.clone();
    ///
    /// let mut fifo = EvictionCache::new(8, PolicyKind::Fifo);
    /// fifo.set_on_evicted(move |key: &str, _: &String| log.lock().unwrap().push(key.to_owned()));
    ///
    /// fifo.put("a".to_owned(), "1234".to_owned());
    /// fifo.put("b".to_owned(), "1234".to_owned());
    /// assert_eq!(evicted.lock().unwrap().as_slice(), ["a"]);
    /// ```
    pub fn set_on_evicted(&mut self, callback: impl FnMut(&str, &V) + Send + 'static) {
        self.on_evicted = Some(Box::new(callback));
    }

    /// Stores the given value for the given key.
    ///
    /// If the key is already present, its value is replaced and the policy is notified about
    /// the update. Afterwards, entries are evicted until the budget is met (see above).
    pub fn put(&mut self, key: String, value: V) {
        let mem_size = key.len() + value.byte_size();
        self.writes += 1;

        match self.entries.get_mut(&key) {
            Some(entry) => {
                self.allocated_memory = self.allocated_memory - entry.mem_size + mem_size;
                entry.mem_size = mem_size;
                entry.value = value;
                self.policy.on_update(&key);
            }
            None => {
                self.allocated_memory += mem_size;
                self.policy.on_insert(&key);
                let _ = self.entries.insert(key.clone(), Entry { mem_size, value });
            }
        }

        self.enforce_constraints(Some(&key));
    }

    fn enforce_constraints(&mut self, protected: Option<&str>) {
        while self.max_memory > 0 && self.allocated_memory > self.max_memory {
            let victim = match self.policy.victim(protected) {
                Some(victim) => victim.to_owned(),
                None => return,
            };

            let _ = self.evict(&victim);
        }
    }

    /// Returns the value which has previously been stored for the given key or **None** if
    /// no value is present.
    ///
    /// A hit is reported to the policy (e.g. LRU treats the entry as most recently used).
    pub fn get(&mut self, key: &str) -> Option<&V> {
        self.reads += 1;

        match self.entries.get(key) {
            Some(entry) => {
                self.hits += 1;
                self.policy.on_read(key);
                Some(&entry.value)
            }
            None => None,
        }
    }

    /// Determines if a value is present for the given key without touching the policy.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Removes the entry for the given key if present.
    ///
    /// # Examples
    /// ```
    /// # use ringcache::cache::{EvictionCache, PolicyKind};
    /// let mut lfu = EvictionCache::new(0, PolicyKind::Lfu);
    ///
    /// lfu.put("Foo".to_owned(), "Bar".to_owned());
    /// assert_eq!(lfu.remove("Foo"), Some("Bar".to_owned()));
    /// assert_eq!(lfu.get("Foo"), None);
    ///
    /// // Removing an absent key is a no-op...
    /// assert_eq!(lfu.remove("Foo"), None);
    /// ```
    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.evict(key).map(|(_, value)| value)
    }

    /// Evicts exactly one entry as chosen by the policy and returns it.
    ///
    /// Returns **None** if the cache is empty.
    pub fn remove_oldest(&mut self) -> Option<(String, V)> {
        let victim = self.policy.victim(None)?.to_owned();
        self.evict(&victim)
    }

    fn evict(&mut self, key: &str) -> Option<(String, V)> {
        let (key, entry) = self.entries.remove_entry(key)?;
        self.allocated_memory -= entry.mem_size;
        self.policy.on_remove(&key);

        if let Some(callback) = self.on_evicted.as_mut() {
            callback(&key, &entry.value);
        }

        Some((key, entry.value))
    }

    /// Removes all entries in this cache.
    ///
    /// Note that this will also zero all metrics (reads, writes, cache hits) and will not
    /// invoke the eviction callback.
    pub fn flush(&mut self) {
        self.entries.clear();
        self.policy.clear();
        self.allocated_memory = 0;
        self.reads = 0;
        self.writes = 0;
        self.hits = 0;
    }

    /// Returns the number of entries in the cache.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Determines if the cache is completely empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the name of the policy in use.
    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Returns the budget of this cache in bytes (**0** means unbounded).
    pub fn max_memory(&self) -> usize {
        self.max_memory
    }

    /// Changes the budget of this cache.
    ///
    /// Shrinking the budget immediately evicts entries until the new budget is met.
    pub fn set_max_memory(&mut self, max_memory: usize) {
        self.max_memory = max_memory;
        self.enforce_constraints(None);
    }

    /// Returns the sum of the sizes of all keys and values in bytes.
    pub fn allocated_memory(&self) -> usize {
        self.allocated_memory
    }

    /// Returns the cache hit rate in percent.
    ///
    /// Note that all metrics are reset when **flush()** is called.
    pub fn hit_rate(&self) -> f32 {
        match self.reads {
            0 => 0.,
            n => self.hits as f32 / n as f32 * 100.,
        }
    }

    /// Returns the total number of reads performed on this cache since the last flush.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Returns the number of reads which found a value since the last flush.
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Returns the total number of writes performed on this cache since the last flush.
    pub fn writes(&self) -> usize {
        self.writes
    }

    #[cfg(test)]
    fn assert_consistent(&self) {
        assert_eq!(self.policy.len(), self.entries.len());
        if let Some(victim) = self.policy.victim(None) {
            assert_eq!(self.entries.contains_key(victim), true);
        }
        let total: usize = self.entries.values().map(|entry| entry.mem_size).sum();
        assert_eq!(total, self.allocated_memory);
    }
}
