//! Provides the replacement policies which can be plugged into an
//! [EvictionCache](crate::cache::EvictionCache).
//!
//! A policy only keeps track of keys. It is notified about every insert, access, update and
//! removal performed by the cache and names the next victim once the cache has to shrink. The
//! cache itself owns the values and does all the byte accounting.
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use fnv::FnvHashMap;
use linked_hash_map::LinkedHashMap;

/// Tracks the eviction order of the keys stored in a cache.
///
/// Implementations must keep exactly the set of keys which the cache reported via
/// [on_insert](EvictionPolicy::on_insert) minus the ones reported via
/// [on_remove](EvictionPolicy::on_remove).
pub trait EvictionPolicy: Send {
    /// Returns the short name of this policy, as used in the config.
    fn name(&self) -> &'static str;

    /// Invoked once a key has been added to the cache.
    fn on_insert(&mut self, key: &str);

    /// Invoked for each cache hit.
    fn on_read(&mut self, key: &str);

    /// Invoked if the value of an existing key has been replaced.
    fn on_update(&mut self, key: &str);

    /// Invoked once a key has left the cache (by eviction or deletion).
    fn on_remove(&mut self, key: &str);

    /// Names the next key to evict.
    ///
    /// If **protected** is given, this key must not be selected. The cache uses this to keep a
    /// freshly written entry alive while making room for it.
    fn victim(&self, protected: Option<&str>) -> Option<&str>;

    /// Returns the number of tracked keys.
    fn len(&self) -> usize;

    /// Determines if no keys are tracked.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets all keys.
    fn clear(&mut self);
}

/// Enumerates the available policies.
///
/// # Examples
/// ```
/// # use ringcache::cache::PolicyKind;
/// assert_eq!("lfu".parse::<PolicyKind>().unwrap(), PolicyKind::Lfu);
/// assert_eq!("FIFO".parse::<PolicyKind>().unwrap(), PolicyKind::Fifo);
/// assert_eq!("random".parse::<PolicyKind>().is_err(), true);
/// assert_eq!(PolicyKind::default().to_string(), "lru");
/// ```
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum PolicyKind {
    /// Evicts the least recently used entry.
    #[default]
    Lru,

    /// Evicts the earliest inserted entry, reads and updates don't change the order.
    Fifo,

    /// Evicts the least frequently used entry, the earliest inserted one on ties.
    Lfu,
}

impl PolicyKind {
    /// Creates a new, empty policy of this kind.
    pub fn create(self) -> Box<dyn EvictionPolicy> {
        match self {
            PolicyKind::Lru => Box::<Lru>::default(),
            PolicyKind::Fifo => Box::<Fifo>::default(),
            PolicyKind::Lfu => Box::<Lfu>::default(),
        }
    }
}

impl FromStr for PolicyKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(PolicyKind::Lru),
            "fifo" => Ok(PolicyKind::Fifo),
            "lfu" => Ok(PolicyKind::Lfu),
            _ => Err(anyhow::anyhow!(
                "Unknown eviction policy '{}'. Use 'lru', 'fifo' or 'lfu'.",
                value
            )),
        }
    }
}

impl Display for PolicyKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyKind::Lru => write!(f, "lru"),
            PolicyKind::Fifo => write!(f, "fifo"),
            PolicyKind::Lfu => write!(f, "lfu"),
        }
    }
}

/// Least recently used: reads and updates move a key to the "newest" end.
#[derive(Default)]
pub struct Lru {
    order: LinkedHashMap<String, ()>,
}

impl EvictionPolicy for Lru {
    fn name(&self) -> &'static str {
        "lru"
    }

    fn on_insert(&mut self, key: &str) {
        let _ = self.order.insert(key.to_owned(), ());
    }

    fn on_read(&mut self, key: &str) {
        let _ = self.order.get_refresh(key);
    }

    fn on_update(&mut self, key: &str) {
        let _ = self.order.get_refresh(key);
    }

    fn on_remove(&mut self, key: &str) {
        let _ = self.order.remove(key);
    }

    fn victim(&self, protected: Option<&str>) -> Option<&str> {
        first_unprotected(self.order.keys(), protected)
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn clear(&mut self) {
        self.order.clear();
    }
}

/// First in, first out: only the initial insert determines the position of a key.
#[derive(Default)]
pub struct Fifo {
    order: LinkedHashMap<String, ()>,
}

impl EvictionPolicy for Fifo {
    fn name(&self) -> &'static str {
        "fifo"
    }

    fn on_insert(&mut self, key: &str) {
        let _ = self.order.insert(key.to_owned(), ());
    }

    fn on_read(&mut self, _key: &str) {}

    fn on_update(&mut self, _key: &str) {}

    fn on_remove(&mut self, key: &str) {
        let _ = self.order.remove(key);
    }

    fn victim(&self, protected: Option<&str>) -> Option<&str> {
        first_unprotected(self.order.keys(), protected)
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn clear(&mut self) {
        self.order.clear();
    }
}

/// Sort key of an LFU entry: the use count first, the insertion sequence second.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Rank {
    uses: u64,
    sequence: u64,
}

/// Least frequently used.
///
/// Each key starts with a use count of one, which is incremented on every read and update.
/// The victim is the key with the lowest count. Among equal counts, the key inserted first
/// loses. Updating a value doesn't change its insertion sequence.
#[derive(Default)]
pub struct Lfu {
    ranks: FnvHashMap<String, Rank>,
    order: BTreeMap<Rank, String>,
    next_sequence: u64,
}

impl Lfu {
    /// Returns the current use count of the given key.
    pub fn uses(&self, key: &str) -> Option<u64> {
        self.ranks.get(key).map(|rank| rank.uses)
    }

    fn touch(&mut self, key: &str) {
        if let Some(rank) = self.ranks.get_mut(key) {
            if let Some(owned_key) = self.order.remove(&*rank) {
                rank.uses += 1;
                let _ = self.order.insert(*rank, owned_key);
            }
        }
    }
}

impl EvictionPolicy for Lfu {
    fn name(&self) -> &'static str {
        "lfu"
    }

    fn on_insert(&mut self, key: &str) {
        let rank = Rank {
            uses: 1,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;

        if let Some(previous) = self.ranks.insert(key.to_owned(), rank) {
            let _ = self.order.remove(&previous);
        }
        let _ = self.order.insert(rank, key.to_owned());
    }

    fn on_read(&mut self, key: &str) {
        self.touch(key);
    }

    fn on_update(&mut self, key: &str) {
        self.touch(key);
    }

    fn on_remove(&mut self, key: &str) {
        if let Some(rank) = self.ranks.remove(key) {
            let _ = self.order.remove(&rank);
        }
    }

    fn victim(&self, protected: Option<&str>) -> Option<&str> {
        first_unprotected(self.order.values(), protected)
    }

    fn len(&self) -> usize {
        self.ranks.len()
    }

    fn clear(&mut self) {
        self.ranks.clear();
        self.order.clear();
    }
}

fn first_unprotected<'a>(
    mut keys: impl Iterator<Item = &'a String>,
    protected: Option<&str>,
) -> Option<&'a str> {
    keys.find(|key| Some(key.as_str()) != protected)
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use crate::cache::policy::{EvictionPolicy, Fifo, Lfu, Lru};

    #[test]
    fn lru_refreshes_on_read_and_update() {
        let mut lru = Lru::default();
        lru.on_insert("a");
        lru.on_insert("b");
        lru.on_insert("c");
        assert_eq!(lru.victim(None), Some("a"));

        lru.on_read("a");
        assert_eq!(lru.victim(None), Some("b"));

        lru.on_update("b");
        assert_eq!(lru.victim(None), Some("c"));
        assert_eq!(lru.victim(Some("c")), Some("a"));
    }

    #[test]
    fn fifo_ignores_reads_and_updates() {
        let mut fifo = Fifo::default();
        fifo.on_insert("a");
        fifo.on_insert("b");
        fifo.on_read("a");
        fifo.on_update("a");
        assert_eq!(fifo.victim(None), Some("a"));

        fifo.on_remove("a");
        assert_eq!(fifo.victim(None), Some("b"));
        assert_eq!(fifo.victim(Some("b")), None);
        assert_eq!(fifo.len(), 1);
    }

    #[test]
    fn lfu_prefers_rarely_used_and_then_old_keys() {
        let mut lfu = Lfu::default();
        lfu.on_insert("a");
        lfu.on_insert("b");
        lfu.on_insert("c");

        // All keys have been used once, so the oldest one loses...
        assert_eq!(lfu.victim(None), Some("a"));

        lfu.on_read("a");
        lfu.on_read("a");
        lfu.on_update("b");
        assert_eq!(lfu.uses("a"), Some(3));
        assert_eq!(lfu.uses("b"), Some(2));
        assert_eq!(lfu.victim(None), Some("c"));

        lfu.on_remove("c");
        assert_eq!(lfu.victim(None), Some("b"));
        assert_eq!(lfu.victim(Some("b")), Some("a"));
        assert_eq!(lfu.uses("c"), None);

        lfu.clear();
        assert_eq!(lfu.is_empty(), true);
        assert_eq!(lfu.victim(None), None);
    }
}
