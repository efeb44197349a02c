use std::fmt::{Display, Formatter};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use crate::cache::{ByteView, EvictionCache, PolicyKind};

/// Shares one [EvictionCache] of [ByteView] values between threads.
///
/// The underlying cache is only constructed by the first [add](GuardedCache::add). Reads before
/// that never construct it and simply report a miss. Once constructed, every operation runs
/// under one exclusive lock, so that all adds and gets are linearized.
///
/// # Examples
/// ```
/// # use ringcache::cache::{ByteView, GuardedCache, PolicyKind};
/// let cache = GuardedCache::new(1024, PolicyKind::Lru);
/// assert_eq!(cache.get("Tom"), None);
/// assert_eq!(cache.is_initialized(), false);
///
/// cache.add("Tom", ByteView::from("630"));
/// assert_eq!(cache.get("Tom").unwrap().as_slice(), b"630");
/// assert_eq!(cache.stats().entries, 1);
/// ```
pub struct GuardedCache {
    max_memory: usize,
    policy: PolicyKind,
    cache: OnceLock<Mutex<EvictionCache<ByteView>>>,
}

/// Contains a snapshot of the metrics of a [GuardedCache].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CacheStats {
    /// The number of entries.
    pub entries: usize,
    /// The number of bytes occupied by keys and values.
    pub allocated_memory: usize,
    /// The budget in bytes (0 = unbounded).
    pub max_memory: usize,
    /// The number of reads since the last flush.
    pub reads: usize,
    /// The number of successful reads since the last flush.
    pub hits: usize,
    /// The number of writes since the last flush.
    pub writes: usize,
    /// The replacement policy in use.
    pub policy: PolicyKind,
}

impl CacheStats {
    /// Returns the hit rate in percent.
    pub fn hit_rate(&self) -> f32 {
        match self.reads {
            0 => 0.,
            n => self.hits as f32 / n as f32 * 100.,
        }
    }
}

impl Display for CacheStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} entries, {} of {}, {}, {} reads, {:.1}% hits, {} writes",
            self.entries,
            crate::fmt::format_size(self.allocated_memory),
            match self.max_memory {
                0 => "unbounded".to_owned(),
                n => crate::fmt::format_size(n),
            },
            self.policy,
            self.reads,
            self.hit_rate(),
            self.writes
        )
    }
}

impl GuardedCache {
    /// Creates a new guarded cache. Budget and policy are fixed for its whole lifetime.
    pub fn new(max_memory: usize, policy: PolicyKind) -> Self {
        GuardedCache {
            max_memory,
            policy,
            cache: OnceLock::new(),
        }
    }

    /// Stores the given value, constructing the underlying cache if necessary.
    pub fn add(&self, key: impl Into<String>, value: ByteView) {
        let cache = self
            .cache
            .get_or_init(|| Mutex::new(EvictionCache::new(self.max_memory, self.policy)));

        lock(cache).put(key.into(), value);
    }

    /// Returns the value stored for the given key.
    ///
    /// Returns **None** right away if nothing has ever been added.
    pub fn get(&self, key: &str) -> Option<ByteView> {
        let cache = self.cache.get()?;
        let mut cache = lock(cache);
        cache.get(key).cloned()
    }

    /// Determines if the underlying cache has been constructed.
    pub fn is_initialized(&self) -> bool {
        self.cache.get().is_some()
    }

    /// Returns a snapshot of the cache metrics.
    pub fn stats(&self) -> CacheStats {
        match self.cache.get() {
            Some(cache) => {
                let cache = lock(cache);
                CacheStats {
                    entries: cache.len(),
                    allocated_memory: cache.allocated_memory(),
                    max_memory: cache.max_memory(),
                    reads: cache.reads(),
                    hits: cache.hits(),
                    writes: cache.writes(),
                    policy: self.policy,
                }
            }
            None => CacheStats {
                max_memory: self.max_memory,
                policy: self.policy,
                ..Default::default()
            },
        }
    }
}

// A panic while holding the lock cannot leave the cache half updated in a way later calls
// would trip over, as every mutation keeps index and policy in sync before returning.
fn lock(cache: &Mutex<EvictionCache<ByteView>>) -> MutexGuard<'_, EvictionCache<ByteView>> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::cache::{ByteView, GuardedCache, PolicyKind};

    #[test]
    fn reads_before_the_first_write_do_not_construct_the_cache() {
        let cache = GuardedCache::new(0, PolicyKind::Fifo);
        assert_eq!(cache.get("Tom"), None);
        assert_eq!(cache.get("Tom"), None);
        assert_eq!(cache.is_initialized(), false);
        assert_eq!(cache.stats().reads, 0);
        assert_eq!(cache.stats().policy, PolicyKind::Fifo);

        cache.add("Tom", ByteView::from("630"));
        assert_eq!(cache.is_initialized(), true);
        assert_eq!(cache.get("Tom"), Some(ByteView::from("630")));
    }

    #[test]
    fn the_budget_applies_to_the_guarded_cache() {
        let cache = GuardedCache::new(12, PolicyKind::Lru);
        cache.add("Tom", ByteView::from("630"));
        cache.add("Sam", ByteView::from("567"));
        cache.add("Jack", ByteView::from("589"));

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.allocated_memory, 7);
        assert_eq!(stats.max_memory, 12);
        assert_eq!(cache.get("Jack").unwrap().to_string(), "589");
    }

    #[test]
    fn concurrent_writers_and_readers_are_serialized() {
        let cache = Arc::new(GuardedCache::new(0, PolicyKind::Lfu));

        let threads: Vec<_> = (0..8)
            .map(|thread| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        let key = format!("{}-{}", thread, i);
                        let _ = cache.get(&key);
                        cache.add(key.clone(), ByteView::from(key.as_str()));
                        assert_eq!(cache.get(&key).unwrap().to_string(), key);
                    }
                })
            })
            .collect();

        for thread in threads {
            thread.join().unwrap();
        }

        let stats = cache.stats();
        assert_eq!(stats.entries, 2000);
        assert_eq!(stats.writes, 2000);
        assert_eq!(stats.hits, 2000);
    }
}
