//! Provides the local, byte budgeted caches of a node.
//!
//! The heart of this module is the [EvictionCache], a single threaded map which keeps the sum
//! of the sizes of its keys and values below a given budget. Which entry has to go once the
//! budget is exceeded is decided by an [EvictionPolicy]:
//!
//! * [Lru] evicts the entry which has not been read or written for the longest time.
//! * [Fifo] evicts the entry which has been inserted first, no matter how often it was used.
//! * [Lfu] evicts the entry with the fewest reads and writes, the oldest one on ties.
//!
//! Each cache group owns a [GuardedCache], which holds an `EvictionCache<ByteView>` behind a
//! lock and only constructs it once the first value is added.
mod byte_view;
mod eviction_cache;
mod guarded;
mod policy;

pub use byte_view::ByteView;
pub use eviction_cache::{ByteSize, EvictionCache, EvictionCallback};
pub use guarded::{CacheStats, GuardedCache};
pub use policy::{EvictionPolicy, Fifo, Lfu, Lru, PolicyKind};
