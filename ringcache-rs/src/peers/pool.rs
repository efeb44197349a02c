use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use fnv::FnvHashMap;
use hyper::Uri;
use tokio::sync::broadcast::error::RecvError;
use yaml_rust::Yaml;

use crate::config::{Config, Handle};
use crate::peers::{http_client, HttpClient, PeerClient, PeerGetter, PeerPicker};
use crate::platform::Platform;
use crate::ring::HashRing;

/// The path prefix below which peers serve each other.
pub const DEFAULT_BASE_PATH: &str = "/_ringcache/";

/// The number of virtual nodes per peer unless configured otherwise.
pub const DEFAULT_REPLICAS: usize = 50;

/// Tracks the peers of a node and picks the owner of a key.
///
/// The ring and the clients are kept as one immutable snapshot. [set_peers](PeerPool::set_peers)
/// builds a new snapshot and swaps it in, so that a concurrent pick either sees the old or the
/// new cluster, but never a ring of one and the clients of the other.
pub struct PeerPool {
    self_url: String,
    base_path: String,
    replicas: usize,
    timeout: Duration,
    client: HttpClient,
    peers: ArcSwap<PeerSet>,
}

struct PeerSet {
    members: Vec<String>,
    ring: HashRing,
    clients: FnvHashMap<String, Arc<PeerClient>>,
}

impl PeerPool {
    /// Creates a pool without peers.
    ///
    /// **self_url** is the base URL under which this node is listed as peer. Keys owned by it
    /// are never fetched remotely.
    pub fn new(self_url: &str, base_path: &str, replicas: usize, timeout: Duration) -> Self {
        PeerPool {
            self_url: self_url.to_owned(),
            base_path: base_path.to_owned(),
            replicas,
            timeout,
            client: http_client(),
            peers: ArcSwap::from_pointee(PeerSet {
                members: Vec::new(),
                ring: HashRing::new(replicas, None),
                clients: FnvHashMap::default(),
            }),
        }
    }

    /// Returns the base URL of this node.
    pub fn self_url(&self) -> &str {
        &self.self_url
    }

    /// Returns the path prefix of all peer requests.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Replaces the whole set of peers.
    ///
    /// The list should contain this node itself, otherwise this node owns no keys. Duplicate
    /// entries are placed on the ring twice.
    pub fn set_peers<P: AsRef<str>>(&self, peers: &[P]) {
        let members: Vec<String> = peers.iter().map(|peer| peer.as_ref().to_owned()).collect();

        let mut ring = HashRing::new(self.replicas, None);
        ring.add(&members);

        let clients = members
            .iter()
            .map(|peer| {
                let client =
                    PeerClient::new(peer, &self.base_path, self.timeout, self.client.clone());
                (peer.clone(), Arc::new(client))
            })
            .collect();

        log::info!("Updating peers: {}", members.join(", "));
        self.peers.store(Arc::new(PeerSet {
            members,
            ring,
            clients,
        }));
    }

    /// Returns the current peers in the order in which they were supplied.
    pub fn members(&self) -> Vec<String> {
        self.peers.load().members.clone()
    }

    /// Renders a human readable listing of all peers, sorted by their URL.
    ///
    /// # Example
    /// ```
    /// # use std::time::Duration;
    /// # use ringcache::peers::PeerPool;
    /// let pool = PeerPool::new("http://10.0.0.1:8001", "/_ringcache/", 50, Duration::from_secs(5));
    /// pool.set_peers(&["http://10.0.0.2:8001", "http://cache.local", "not a url"]);
    ///
    /// assert_eq!(
    ///     pool.listing(),
    ///     "Peer: http://10.0.0.2:8001, IP: 10.0.0.2, Port: 8001\n\
    ///      Peer: http://cache.local, Host: cache.local\n\
    ///      Peer: not a url (invalid URL)\n"
    /// );
    /// ```
    pub fn listing(&self) -> String {
        let mut members = self.members();
        members.sort();

        let mut result = String::new();
        for peer in members {
            result.push_str(&describe(&peer));
            result.push('\n');
        }

        result
    }

    /// Re-applies **peers.members** from the given config.
    ///
    /// Nothing happens if the setting is absent or lists the current peers.
    pub fn apply_config(&self, config: &Handle) {
        if let Yaml::Array(entries) = config.query("peers.members") {
            let members: Vec<String> = entries
                .iter()
                .filter_map(|entry| entry.as_str())
                .map(str::to_owned)
                .collect();

            if members != self.peers.load().members {
                self.set_peers(&members);
            }
        }
    }
}

fn describe(peer: &str) -> String {
    match peer.parse::<Uri>() {
        Ok(uri) => match (uri.host(), uri.port_u16()) {
            (Some(host), Some(port)) => format!("Peer: {}, IP: {}, Port: {}", peer, host, port),
            (Some(host), None) => format!("Peer: {}, Host: {}", peer, host),
            _ => format!("Peer: {} (invalid URL)", peer),
        },
        Err(_) => format!("Peer: {} (invalid URL)", peer),
    }
}

impl PeerPicker for PeerPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>> {
        let peers = self.peers.load();
        let owner = peers.ring.get(key)?;
        if owner == self.self_url {
            return None;
        }

        log::debug!("Pick peer {} for {}", owner, key);
        peers
            .clients
            .get(owner)
            .map(|client| client.clone() as Arc<dyn PeerGetter>)
    }
}

/// Creates the **PeerPool** of the given platform and keeps it in sync with the config.
///
/// The pool reads **peers.self**, **peers.base_path**, **peers.replicas** and **peers.timeout**
/// once. **peers.members** is re-applied on each config change. If
/// **peers.discovery.service** is set, the members are additionally refreshed via DNS, see
/// [discovery](crate::peers::discovery).
pub fn install(platform: &Arc<Platform>) -> Arc<PeerPool> {
    let config = platform.find::<Config>();
    let pool = Arc::new(match &config {
        Some(config) => from_config(&config.current()),
        None => PeerPool::new(
            "http://localhost:8001",
            DEFAULT_BASE_PATH,
            DEFAULT_REPLICAS,
            Duration::from_secs(5),
        ),
    });
    platform.register::<PeerPool>(pool.clone());

    if let Some(config) = config {
        pool.apply_config(&config.current());
        watch_config(platform.clone(), config, pool.clone());
    }

    crate::peers::discovery::install(platform.clone(), pool.clone());

    pool
}

fn from_config(config: &Handle) -> PeerPool {
    let port = config.query("server.port").as_i64().unwrap_or(8001);
    let self_url = config.string_or("peers.self", format!("http://localhost:{}", port));
    let base_path = config.string_or("peers.base_path", DEFAULT_BASE_PATH);
    let replicas = match config.query("peers.replicas").as_i64() {
        Some(replicas) if replicas > 0 => replicas as usize,
        _ => DEFAULT_REPLICAS,
    };
    let timeout = config
        .duration_or("peers.timeout", Duration::from_secs(5))
        .unwrap_or_else(|error| {
            log::error!("{:#} - using 5s as peer timeout.", error);
            Duration::from_secs(5)
        });

    log::info!(
        "This node is {} (base path: {}, {} replicas, timeout: {})",
        self_url,
        base_path,
        replicas,
        crate::fmt::format_duration(timeout)
    );

    PeerPool::new(&self_url, &base_path, replicas, timeout)
}

fn watch_config(platform: Arc<Platform>, config: Arc<Config>, pool: Arc<PeerPool>) {
    let mut notifier = config.notifier();
    crate::spawn!(async move {
        while platform.is_running() {
            match notifier.recv().await {
                Ok(_) | Err(RecvError::Lagged(_)) => pool.apply_config(&config.current()),
                Err(RecvError::Closed) => return,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::builder::Builder;
    use crate::config::Config;
    use crate::peers::{PeerPicker, PeerPool};
    use crate::ring::HashRing;

    const SELF: &str = "http://10.0.0.1:8001";
    const OTHER: &str = "http://10.0.0.2:8001";

    fn pool() -> PeerPool {
        PeerPool::new(SELF, "/_ringcache/", 50, Duration::from_secs(1))
    }

    #[test]
    fn keys_owned_by_this_node_are_local() {
        let pool = pool();
        pool.set_peers(&[SELF, OTHER]);

        let mut ring = HashRing::new(50, None);
        ring.add(&[SELF, OTHER]);

        let mut local = 0;
        for i in 0..200 {
            let key = format!("key-{}", i);
            match pool.pick_peer(&key) {
                Some(getter) => {
                    assert_eq!(ring.get(&key), Some(OTHER));
                    assert_eq!(getter.peer(), OTHER);
                }
                None => {
                    assert_eq!(ring.get(&key), Some(SELF));
                    local += 1;
                }
            }
        }

        assert_eq!(local > 0 && local < 200, true);
    }

    #[test]
    fn the_peer_set_is_replaced_as_a_whole() {
        let pool = pool();
        pool.set_peers(&[OTHER]);
        assert_eq!(pool.pick_peer("Tom").unwrap().peer(), OTHER);

        pool.set_peers(&[SELF]);
        assert_eq!(pool.members(), vec![SELF.to_owned()]);
        assert_eq!(pool.pick_peer("Tom").is_none(), true);

        let empty: [&str; 0] = [];
        pool.set_peers(&empty);
        assert_eq!(pool.pick_peer("Tom").is_none(), true);
        assert_eq!(pool.listing(), "");
    }

    #[test]
    fn concurrent_picks_always_see_a_complete_peer_set() {
        let pool = std::sync::Arc::new(pool());
        pool.set_peers(&[OTHER]);

        let reader = {
            let pool = pool.clone();
            std::thread::spawn(move || {
                for i in 0..10_000 {
                    // Each pick either finds the remote client of the old set or nothing at all
                    // in the new set. Never a ring member without a client...
                    if let Some(getter) = pool.pick_peer(&format!("key-{}", i)) {
                        assert_eq!(getter.peer(), OTHER);
                    }
                }
            })
        };

        for _ in 0..200 {
            pool.set_peers(&[SELF]);
            pool.set_peers(&[OTHER]);
        }

        reader.join().unwrap();
    }

    #[test]
    fn members_follow_the_config() {
        crate::testing::test_async(async {
            let platform = Builder::new().enable_config().build().await;
            let config = platform.require::<Config>();
            config
                .load_from_string(
                    "
peers:
    self: http://10.0.0.1:8001
    replicas: 10
    members: [ 'http://10.0.0.1:8001', 'http://10.0.0.2:8001' ]
",
                    None,
                )
                .unwrap();

            let pool = crate::peers::install(&platform);
            assert_eq!(pool.self_url(), SELF);
            assert_eq!(pool.base_path(), "/_ringcache/");
            assert_eq!(pool.members(), vec![SELF.to_owned(), OTHER.to_owned()]);

            config
                .load_from_string(
                    "
peers:
    members: [ 'http://10.0.0.3:8001' ]
",
                    None,
                )
                .unwrap();

            let mut attempts = 0;
            while pool.members() != vec!["http://10.0.0.3:8001".to_owned()] {
                attempts += 1;
                assert_eq!(attempts < 100, true);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }

            platform.terminate();
        });
    }
}
