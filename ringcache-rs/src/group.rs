//! Provides named cache groups and the registry which resolves them.
//!
//! A [Group] is a named dataset with its own [Loader] and its own local [GuardedCache]. A lookup
//! tries three sources in turn:
//!
//! 1. the local cache of the group,
//! 2. the peer owning the key (if peers are registered and the owner is another node),
//! 3. the loader of the group.
//!
//! Values obtained from a peer are not cached locally, as the owner already caches them. Values
//! computed by the loader are. If fetching from a peer fails, the failure is logged and the
//! group falls back to its loader, so that a broken peer degrades performance but not
//! correctness.
//!
//! # Example
//! ```
//! # use ringcache::cache::{ByteView, PolicyKind};
//! # use ringcache::group::{GroupRegistry, LoaderFn};
//! # #[tokio::main]
//! # async fn main() {
//! let registry = GroupRegistry::new();
//! let _ = registry.create(
//!     "scores",
//!     2 << 10,
//!     PolicyKind::Lru,
//!     LoaderFn::new(|key: &str| match key {
//!         "Tom" => Ok(ByteView::from("630")),
//!         _ => Err(anyhow::anyhow!("{} not exist", key)),
//!     }),
//! );
//!
//! assert_eq!(registry.get("scores", "Tom").await.unwrap().to_string(), "630");
//! assert_eq!(registry.get("scores", "Kate").await.is_err(), true);
//! assert_eq!(registry.get("ages", "Tom").await.is_err(), true);
//! # }
//! ```
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use async_trait::async_trait;
use fnv::FnvHashMap;
use tokio::sync::broadcast::error::RecvError;
use yaml_rust::Yaml;

use crate::cache::{ByteView, CacheStats, GuardedCache, PolicyKind};
use crate::config::{Config, Handle};
use crate::error::CacheError;
use crate::peers::{PeerPicker, PeerPool};
use crate::platform::Platform;

/// The budget of a configured group which doesn't specify **max_memory**.
pub const DEFAULT_MAX_MEMORY: usize = 64 * 1024 * 1024;

/// Computes the value of a key on a true cache miss (e.g. by querying a database).
#[async_trait]
pub trait Loader: Send + Sync {
    /// Loads the value of the given key.
    async fn load(&self, key: &str) -> anyhow::Result<ByteView>;
}

/// Adapts a synchronous closure into a [Loader].
pub struct LoaderFn<F> {
    loader: F,
}

impl<F> LoaderFn<F>
where
    F: Fn(&str) -> anyhow::Result<ByteView> + Send + Sync,
{
    /// Wraps the given closure.
    pub fn new(loader: F) -> Self {
        LoaderFn { loader }
    }
}

#[async_trait]
impl<F> Loader for LoaderFn<F>
where
    F: Fn(&str) -> anyhow::Result<ByteView> + Send + Sync,
{
    async fn load(&self, key: &str) -> anyhow::Result<ByteView> {
        (self.loader)(key)
    }
}

/// Serves values from a fixed map.
///
/// This is the loader of all groups defined in the config, which list their data inline.
#[derive(Default)]
pub struct MapLoader {
    values: FnvHashMap<String, ByteView>,
}

impl MapLoader {
    /// Creates a loader serving the given key value pairs.
    pub fn new<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<ByteView>,
    {
        MapLoader {
            values: values
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    /// Returns the number of known keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Determines if no values are known.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[async_trait]
impl Loader for MapLoader {
    async fn load(&self, key: &str) -> anyhow::Result<ByteView> {
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("{} not exist", key))
    }
}

/// Represents a named, independently loaded and cached dataset.
pub struct Group {
    name: String,
    loader: Box<dyn Loader>,
    main_cache: GuardedCache,
    peers: OnceLock<Arc<dyn PeerPicker>>,
}

impl Group {
    /// Creates a new group whose local cache uses the given budget (0 = unbounded) and policy.
    pub fn new(
        name: impl Into<String>,
        max_memory: usize,
        policy: PolicyKind,
        loader: impl Loader + 'static,
    ) -> Self {
        Group {
            name: name.into(),
            loader: Box::new(loader),
            main_cache: GuardedCache::new(max_memory, policy),
            peers: OnceLock::new(),
        }
    }

    /// Returns the name of this group.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Connects this group to the cluster.
    ///
    /// This can only be done once. Further calls fail with [CacheError::Configuration].
    pub fn register_peers(&self, peers: Arc<dyn PeerPicker>) -> Result<(), CacheError> {
        self.peers.set(peers).map_err(|_| {
            CacheError::Configuration(format!(
                "Peers of group {} have already been registered",
                self.name
            ))
        })
    }

    /// Returns the value of the given key.
    ///
    /// See the [module docs](crate::group) for the order in which sources are consulted.
    pub async fn get(&self, key: &str) -> Result<ByteView, CacheError> {
        if key.is_empty() {
            return Err(CacheError::Configuration("key is required".to_owned()));
        }

        if let Some(value) = self.main_cache.get(key) {
            log::debug!("[{}] Cache hit for {}", self.name, key);
            return Ok(value);
        }

        if let Some(peer) = self.peers.get().and_then(|peers| peers.pick_peer(key)) {
            match peer.fetch(&self.name, key).await {
                Ok(value) => return Ok(value),
                Err(error) => log::warn!(
                    "[{}] Failed to fetch {} from {}: {} - loading locally.",
                    self.name,
                    key,
                    peer.peer(),
                    error
                ),
            }
        }

        self.load_locally(key).await
    }

    async fn load_locally(&self, key: &str) -> Result<ByteView, CacheError> {
        log::debug!("[{}] Loading {}...", self.name, key);
        let value = self.loader.load(key).await.map_err(CacheError::Load)?;
        self.main_cache.add(key, value.clone());

        Ok(value)
    }

    /// Returns the metrics of the local cache.
    pub fn stats(&self) -> CacheStats {
        self.main_cache.stats()
    }
}

/// Keeps all groups of a node by name.
#[derive(Default)]
pub struct GroupRegistry {
    groups: Mutex<FnvHashMap<String, Arc<Group>>>,
}

impl GroupRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        GroupRegistry::default()
    }

    fn groups(&self) -> MutexGuard<'_, FnvHashMap<String, Arc<Group>>> {
        self.groups.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates and registers a new group, replacing any group of the same name.
    pub fn create(
        &self,
        name: &str,
        max_memory: usize,
        policy: PolicyKind,
        loader: impl Loader + 'static,
    ) -> Arc<Group> {
        self.register(Group::new(name, max_memory, policy, loader))
    }

    /// Registers the given group, replacing any group of the same name.
    pub fn register(&self, group: Group) -> Arc<Group> {
        let group = Arc::new(group);
        let _ = self.groups().insert(group.name.clone(), group.clone());

        group
    }

    /// Resolves the group with the given name.
    pub fn find(&self, name: &str) -> Option<Arc<Group>> {
        self.groups().get(name).cloned()
    }

    /// Returns the names of all groups in alphabetical order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups().keys().cloned().collect();
        names.sort();

        names
    }

    /// Looks up the given key within the given group.
    ///
    /// Fails with [CacheError::NotFound] if there is no such group.
    pub async fn get(&self, group: &str, key: &str) -> Result<ByteView, CacheError> {
        match self.find(group) {
            Some(group) => group.get(key).await,
            None => Err(CacheError::NotFound(format!("no such group: {}", group))),
        }
    }
}

/// Creates the **GroupRegistry** of the given platform and fills it from the config.
///
/// Each entry below **groups** defines a group served by a [MapLoader]:
///
/// ```yaml
/// groups:
///     scores:
///         max_memory: 2k
///         policy: lfu
///         data:
///             Tom: 630
///             Jack: 589
///             Sam: 567
/// ```
///
/// Groups appearing in a later config are added; existing groups are kept as they are. If a
/// **PeerPool** is present, all groups fetch from the cluster.
pub fn install(platform: &Arc<Platform>) -> Arc<GroupRegistry> {
    let registry = Arc::new(GroupRegistry::new());
    platform.register::<GroupRegistry>(registry.clone());

    if let Some(config) = platform.find::<Config>() {
        apply_config(platform, &registry, &config.current());

        let platform = platform.clone();
        let registry = registry.clone();
        let mut notifier = config.notifier();
        crate::spawn!(async move {
            while platform.is_running() {
                match notifier.recv().await {
                    Ok(_) | Err(RecvError::Lagged(_)) => {
                        apply_config(&platform, &registry, &config.current())
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        });
    }

    registry
}

fn apply_config(platform: &Platform, registry: &GroupRegistry, config: &Handle) {
    let groups = match config.query("groups") {
        Yaml::Hash(groups) => groups,
        _ => return,
    };

    for (name, settings) in groups {
        let name = match name.as_str() {
            Some(name) => name,
            None => continue,
        };
        if registry.find(name).is_some() {
            continue;
        }

        match group_from_config(name, settings) {
            Ok(group) => {
                if let Some(pool) = platform.find::<PeerPool>() {
                    let _ = group.register_peers(pool);
                }
                log::info!(
                    "Created group {} ({} budget, {})",
                    name,
                    crate::fmt::format_size(group.stats().max_memory),
                    group.stats().policy
                );
                let _ = registry.register(group);
            }
            Err(error) => log::error!("Cannot create group {}: {:#}", name, error),
        }
    }
}

fn group_from_config(name: &str, settings: &Yaml) -> anyhow::Result<Group> {
    let max_memory = match &settings["max_memory"] {
        Yaml::String(size) => crate::fmt::parse_size(size)?,
        Yaml::Integer(size) => usize::try_from(*size)?,
        Yaml::BadValue | Yaml::Null => DEFAULT_MAX_MEMORY,
        other => return Err(anyhow::anyhow!("Invalid max_memory: {:?}", other)),
    };

    let policy = match settings["policy"].as_str() {
        Some(policy) => policy.parse()?,
        None => PolicyKind::default(),
    };

    let data = match &settings["data"] {
        Yaml::Hash(data) => data
            .iter()
            .filter_map(|(key, value)| Some((scalar(key)?, scalar(value)?)))
            .collect(),
        _ => Vec::new(),
    };

    Ok(Group::new(name, max_memory, policy, MapLoader::new(data)))
}

fn scalar(value: &Yaml) -> Option<String> {
    match value {
        Yaml::String(value) | Yaml::Real(value) => Some(value.clone()),
        Yaml::Integer(value) => Some(value.to_string()),
        Yaml::Boolean(value) => Some(value.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use hyper::StatusCode;

    use crate::builder::Builder;
    use crate::cache::{ByteView, PolicyKind};
    use crate::config::Config;
    use crate::error::CacheError;
    use crate::group::{Group, GroupRegistry, LoaderFn, MapLoader};
    use crate::peers::{PeerGetter, PeerPicker};
    use crate::testing::test_async;

    struct FixedPeer {
        value: Option<&'static str>,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl PeerGetter for FixedPeer {
        fn peer(&self) -> &str {
            "http://10.0.0.2:8001"
        }

        async fn fetch(&self, _group: &str, _key: &str) -> Result<ByteView, CacheError> {
            let _ = self.fetches.fetch_add(1, Ordering::SeqCst);
            match self.value {
                Some(value) => Ok(ByteView::from(value)),
                None => Err(CacheError::RemoteStatus(StatusCode::INTERNAL_SERVER_ERROR)),
            }
        }
    }

    struct FixedPicker {
        peer: Arc<FixedPeer>,
    }

    impl PeerPicker for FixedPicker {
        fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>> {
            if key.starts_with("remote") {
                Some(self.peer.clone())
            } else {
                None
            }
        }
    }

    fn scores(loads: Arc<AtomicUsize>) -> Group {
        Group::new(
            "scores",
            2 << 10,
            PolicyKind::Lru,
            LoaderFn::new(move |key: &str| {
                let _ = loads.fetch_add(1, Ordering::SeqCst);
                match key {
                    "Tom" | "remote-Tom" => Ok(ByteView::from("630")),
                    _ => Err(anyhow::anyhow!("{} not exist", key)),
                }
            }),
        )
    }

    #[test]
    fn values_are_loaded_once_and_then_cached() {
        test_async(async {
            let loads = Arc::new(AtomicUsize::new(0));
            let group = scores(loads.clone());

            assert_eq!(group.get("Tom").await.unwrap().to_string(), "630");
            assert_eq!(group.get("Tom").await.unwrap().to_string(), "630");
            assert_eq!(loads.load(Ordering::SeqCst), 1);
            assert_eq!(group.stats().entries, 1);
            assert_eq!(group.stats().hits, 1);
        });
    }

    #[test]
    fn invalid_keys_and_failing_loaders_are_reported() {
        test_async(async {
            let group = scores(Arc::new(AtomicUsize::new(0)));

            match group.get("").await {
                Err(CacheError::Configuration(_)) => (),
                other => panic!("Unexpected result: {:?}", other),
            }
            match group.get("Kate").await {
                Err(CacheError::Load(error)) => assert_eq!(error.to_string(), "Kate not exist"),
                other => panic!("Unexpected result: {:?}", other),
            }
            assert_eq!(group.stats().entries, 0);
        });
    }

    #[test]
    fn remote_values_are_fetched_but_not_cached() {
        test_async(async {
            let loads = Arc::new(AtomicUsize::new(0));
            let group = scores(loads.clone());
            let peer = Arc::new(FixedPeer {
                value: Some("589"),
                fetches: AtomicUsize::new(0),
            });
            group
                .register_peers(Arc::new(FixedPicker { peer: peer.clone() }))
                .unwrap();

            assert_eq!(group.get("remote-Jack").await.unwrap().to_string(), "589");
            assert_eq!(group.get("remote-Jack").await.unwrap().to_string(), "589");
            assert_eq!(peer.fetches.load(Ordering::SeqCst), 2);
            assert_eq!(loads.load(Ordering::SeqCst), 0);
            assert_eq!(group.stats().entries, 0);

            // Keys owned by this node are still loaded locally...
            assert_eq!(group.get("Tom").await.unwrap().to_string(), "630");
            assert_eq!(loads.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn failing_peers_fall_back_to_the_loader() {
        test_async(async {
            let loads = Arc::new(AtomicUsize::new(0));
            let group = scores(loads.clone());
            let peer = Arc::new(FixedPeer {
                value: None,
                fetches: AtomicUsize::new(0),
            });
            group
                .register_peers(Arc::new(FixedPicker { peer: peer.clone() }))
                .unwrap();

            assert_eq!(group.get("remote-Tom").await.unwrap().to_string(), "630");
            assert_eq!(peer.fetches.load(Ordering::SeqCst), 1);
            assert_eq!(loads.load(Ordering::SeqCst), 1);

            // The loaded value is cached, so the peer isn't asked again...
            assert_eq!(group.get("remote-Tom").await.unwrap().to_string(), "630");
            assert_eq!(peer.fetches.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn peers_can_only_be_registered_once() {
        let group = scores(Arc::new(AtomicUsize::new(0)));
        let peer = Arc::new(FixedPeer {
            value: None,
            fetches: AtomicUsize::new(0),
        });

        assert_eq!(
            group
                .register_peers(Arc::new(FixedPicker { peer: peer.clone() }))
                .is_ok(),
            true
        );
        match group.register_peers(Arc::new(FixedPicker { peer })) {
            Err(CacheError::Configuration(_)) => (),
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[test]
    fn the_registry_resolves_groups_by_name() {
        test_async(async {
            let registry = GroupRegistry::new();
            let _ = registry.register(scores(Arc::new(AtomicUsize::new(0))));
            let _ = registry.create(
                "ages",
                0,
                PolicyKind::Fifo,
                MapLoader::new(vec![("Tom", "23")]),
            );

            assert_eq!(registry.names(), vec!["ages".to_owned(), "scores".to_owned()]);
            assert_eq!(registry.get("ages", "Tom").await.unwrap().to_string(), "23");
            assert_eq!(registry.get("scores", "Tom").await.unwrap().to_string(), "630");
            match registry.get("heights", "Tom").await {
                Err(CacheError::NotFound(_)) => (),
                other => panic!("Unexpected result: {:?}", other),
            }

            // Re-creating a group replaces it...
            let _ = registry.create("ages", 0, PolicyKind::Lfu, MapLoader::default());
            assert_eq!(registry.get("ages", "Tom").await.is_err(), true);
        });
    }

    #[test]
    fn groups_are_created_from_the_config() {
        test_async(async {
            let platform = Builder::new().enable_config().build().await;
            platform
                .require::<Config>()
                .load_from_string(
                    "
groups:
    scores:
        max_memory: 2k
        policy: lfu
        data:
            Tom: 630
            Jack: 589
            Sam: 567
    broken:
        policy: random
",
                    None,
                )
                .unwrap();

            let registry = crate::group::install(&platform);
            assert_eq!(registry.names(), vec!["scores".to_owned()]);

            let scores = registry.find("scores").unwrap();
            assert_eq!(scores.stats().max_memory, 2048);
            assert_eq!(scores.stats().policy, PolicyKind::Lfu);
            assert_eq!(registry.get("scores", "Jack").await.unwrap().to_string(), "589");
            assert_eq!(registry.get("scores", "Kate").await.is_err(), true);

            platform.terminate();
        });
    }
}
