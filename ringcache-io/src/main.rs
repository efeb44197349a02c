use std::sync::Arc;

use ringcache::builder::Builder;
use ringcache::cache::PolicyKind;
use ringcache::group::{GroupRegistry, MapLoader};
use ringcache::peers::PeerPool;
use ringcache::server::Server;

#[tokio::main]
async fn main() {
    // Build a platform and enable all features...
    let platform = Builder::new().enable_all().build().await;

    // Serve the demo dataset unless the config defines groups of its own...
    let registry = platform.require::<GroupRegistry>();
    if registry.names().is_empty() {
        log::info!("No groups configured - serving the demo group 'scores'.");
        let scores = registry.create(
            "scores",
            2 << 10,
            PolicyKind::Lru,
            MapLoader::new(vec![("Tom", "630"), ("Jack", "589"), ("Sam", "567")]),
        );
        let pool: Arc<PeerPool> = platform.require::<PeerPool>();
        if let Err(error) = scores.register_peers(pool) {
            log::error!("{}", error);
        }
    }

    platform.require::<Server>().event_loop().await;
}
