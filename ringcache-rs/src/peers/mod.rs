//! Connects a node to the other nodes of its cluster.
//!
//! The [PeerPool] keeps the current set of peers: a [HashRing](crate::ring::HashRing) which names
//! the owner of each key plus one [PeerClient] per peer. Given a key, it either hands out the
//! client of the remote owner or reports that the key is local (the node owns it itself, or no
//! peers are known at all).
//!
//! The peer set is replaced as a whole, either by the config (**peers.members**) or by the DNS
//! based [discovery]. Readers always observe a complete old or a complete new set.
//!
//! # Example
//! ```
//! # use std::time::Duration;
//! # use ringcache::peers::{PeerGetter, PeerPicker, PeerPool};
//! let pool = PeerPool::new("http://10.0.0.1:8001", "/_ringcache/", 50, Duration::from_secs(5));
//!
//! // Without peers, every key is local...
//! assert_eq!(pool.pick_peer("Tom").is_none(), true);
//!
//! // With only ourselves as member, still every key is local...
//! pool.set_peers(&["http://10.0.0.1:8001"]);
//! assert_eq!(pool.pick_peer("Tom").is_none(), true);
//!
//! // ..whereas a key owned by a remote node yields its client.
//! pool.set_peers(&["http://10.0.0.2:8001"]);
//! assert_eq!(pool.pick_peer("Tom").unwrap().peer(), "http://10.0.0.2:8001");
//! ```
use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::ByteView;
use crate::error::CacheError;

mod client;
pub mod discovery;
mod pool;
mod protocol;

pub use client::{http_client, HttpClient, PeerClient};
pub use pool::{install, PeerPool, DEFAULT_BASE_PATH, DEFAULT_REPLICAS};
pub use protocol::{FetchRequest, FetchResponse};

/// Names the peer which owns a key.
pub trait PeerPicker: Send + Sync {
    /// Returns the getter of the remote owner of the given key.
    ///
    /// Returns **None** if the key is owned by this node or if no peers are known. In this case
    /// the caller has to load the value itself.
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>>;
}

/// Fetches values from a single remote peer.
#[async_trait]
pub trait PeerGetter: Send + Sync {
    /// Returns the base URL of the peer.
    fn peer(&self) -> &str;

    /// Fetches the value of the given key within the given group.
    ///
    /// Fails with [CacheError::Network], [CacheError::RemoteStatus] or [CacheError::Decode].
    /// Nothing is retried.
    async fn fetch(&self, group: &str, key: &str) -> Result<ByteView, CacheError>;
}
