//! Refreshes the peer list by resolving a DNS name.
//!
//! In container environments (e.g. a headless service in kubernetes or a docker compose
//! service), a single DNS name resolves to the addresses of all nodes. If
//! **peers.discovery.service** is set, this name is resolved every
//! **peers.discovery.interval** (default: 10s) and each address is turned into a peer URL
//! `http://<ip>:<peers.discovery.port>` (default port: 8001). The resulting list is sorted and
//! applied via [PeerPool::set_peers](crate::peers::PeerPool::set_peers) whenever it differs from
//! the current members of the pool. Note that **peers.self** has to match one of the discovered
//! URLs, otherwise this node owns no keys.
//!
//! ```yaml
//! peers:
//!     self: http://10.0.0.1:8001
//!     discovery:
//!         service: ringcache
//!         port: 8001
//!         interval: 10s
//! ```
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::config::Config;
use crate::peers::PeerPool;
use crate::platform::Platform;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_PORT: u16 = 8001;

/// Resolves the given service name into a sorted list of peer URLs.
pub async fn resolve(service: &str, port: u16) -> anyhow::Result<Vec<String>> {
    let addresses = tokio::net::lookup_host((service, port))
        .await
        .with_context(|| format!("Failed to resolve peers via {}", service))?;

    let mut peers: Vec<String> = addresses
        .map(|address| format!("http://{}", address))
        .collect();
    peers.sort();
    peers.dedup();

    Ok(peers)
}

/// Resolves the given service and applies the result to the pool if it differs from its
/// current members.
///
/// Returns **true** if the peer set has been replaced. An empty lookup result never replaces
/// the current peers.
pub async fn refresh(pool: &PeerPool, service: &str, port: u16) -> anyhow::Result<bool> {
    let peers = resolve(service, port).await?;
    if peers.is_empty() {
        return Ok(false);
    }

    let mut current = pool.members();
    current.sort();
    if peers == current {
        return Ok(false);
    }

    log::info!("Discovered peers via {}: {}", service, peers.join(", "));
    if !lists_self(pool, &peers) {
        log::warn!(
            "This node ({}) is not among the peers discovered via {}. \
             Check peers.self, otherwise all keys are fetched from other nodes.",
            pool.self_url(),
            service
        );
    }
    pool.set_peers(&peers);

    Ok(true)
}

fn lists_self(pool: &PeerPool, peers: &[String]) -> bool {
    peers.iter().any(|peer| peer == pool.self_url())
}

/// Forks the discovery task for the given pool.
///
/// The task re-reads its settings on every tick, so that discovery can be enabled, disabled
/// or pointed elsewhere by a config change.
pub fn install(platform: Arc<Platform>, pool: Arc<PeerPool>) {
    crate::spawn!(async move {
        while platform.is_running() {
            let (service, port, interval) = match platform.find::<Config>() {
                Some(config) => settings(&config),
                None => (None, DEFAULT_PORT, DEFAULT_INTERVAL),
            };

            if let Some(service) = service {
                log::debug!("Resolving peers via {}...", service);
                if let Err(error) = refresh(&pool, &service, port).await {
                    log::error!("{:#}", error);
                }
            }

            tokio::time::sleep(interval).await;
        }
    });
}

fn settings(config: &Config) -> (Option<String>, u16, Duration) {
    let handle = config.current();
    let service = handle
        .query("peers.discovery.service")
        .as_str()
        .filter(|service| !service.is_empty())
        .map(str::to_owned);
    let port = handle
        .query("peers.discovery.port")
        .as_i64()
        .and_then(|port| u16::try_from(port).ok())
        .unwrap_or(DEFAULT_PORT);
    let interval = handle
        .duration_or("peers.discovery.interval", DEFAULT_INTERVAL)
        .unwrap_or_else(|error| {
            log::error!("{:#} - using 10s as discovery interval.", error);
            DEFAULT_INTERVAL
        });

    (service, port, interval.max(Duration::from_millis(100)))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::config::Config;
    use crate::peers::discovery::{lists_self, refresh, resolve, settings};
    use crate::peers::PeerPool;
    use crate::testing::test_async;

    #[test]
    fn local_names_resolve_into_peer_urls() {
        test_async(async {
            let peers = resolve("localhost", 8001).await.unwrap();
            assert_eq!(peers.is_empty(), false);
            for peer in &peers {
                assert_eq!(peer.starts_with("http://"), true);
                assert_eq!(peer.ends_with(":8001"), true);
            }
        });
    }

    fn local_pool() -> PeerPool {
        PeerPool::new(
            "http://127.0.0.1:8001",
            "/_ringcache/",
            10,
            Duration::from_secs(1),
        )
    }

    #[test]
    fn unchanged_lookups_are_not_re_applied() {
        test_async(async {
            let pool = local_pool();

            assert_eq!(refresh(&pool, "localhost", 8001).await.unwrap(), true);
            assert_eq!(pool.members(), resolve("localhost", 8001).await.unwrap());
            assert_eq!(refresh(&pool, "localhost", 8001).await.unwrap(), false);
        });
    }

    #[test]
    fn lookups_are_re_applied_after_the_peers_were_replaced() {
        test_async(async {
            let pool = local_pool();
            let discovered = resolve("localhost", 8001).await.unwrap();

            assert_eq!(refresh(&pool, "localhost", 8001).await.unwrap(), true);
            pool.set_peers(&["http://10.9.9.9:8001"]);
            assert_eq!(refresh(&pool, "localhost", 8001).await.unwrap(), true);
            assert_eq!(pool.members(), discovered);
        });
    }

    #[test]
    fn a_self_url_outside_the_discovered_peers_is_detected() {
        let pool = local_pool();
        let discovered = vec![
            "http://127.0.0.1:8001".to_owned(),
            "http://127.0.0.2:8001".to_owned(),
        ];
        assert_eq!(lists_self(&pool, &discovered), true);

        let pool = PeerPool::new(
            "http://localhost:8001",
            "/_ringcache/",
            10,
            Duration::from_secs(1),
        );
        assert_eq!(lists_self(&pool, &discovered), false);
    }

    #[test]
    fn unknown_names_are_reported() {
        test_async(async {
            assert_eq!(resolve("no-such-host.invalid", 8001).await.is_err(), true);
        });
    }

    #[test]
    fn settings_are_read_from_the_config() {
        let config = Config::new("unused.yml");
        config
            .load_from_string(
                "peers:\n  discovery:\n    service: ringcache\n    port: 9001\n    interval: 2s",
                None,
            )
            .unwrap();
        assert_eq!(
            settings(&config),
            (Some("ringcache".to_owned()), 9001, Duration::from_secs(2))
        );

        config.load_from_string("peers: {}", None).unwrap();
        assert_eq!(settings(&config), (None, 8001, Duration::from_secs(10)));
    }
}
