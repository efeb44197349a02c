//! Provides a builder which sets up the components of a node.
//!
//! All parts of a node (logging, signal handling, config, peers, groups and the server) are
//! optional, so that tests and embedding applications can pick what they need.
//!
//! # Example
//! Setting up a node with all features enabled:
//! ```no_run
//! # use ringcache::builder::Builder;
//! # use ringcache::server::Server;
//! #[tokio::main]
//! async fn main() {
//!     let platform = Builder::new().enable_all().build().await;
//!
//!     // Register custom groups here...
//!
//!     platform.require::<Server>().event_loop().await;
//! }
//! ```
use std::sync::Arc;

use crate::platform::Platform;
use crate::{init_logging, RINGCACHE_REVISION, RINGCACHE_VERSION};

/// Initializes a node by creating and installing the selected components.
///
/// # Example
/// Setting up a node which serves only programmatically registered groups:
/// ```
/// # use ringcache::builder::Builder;
/// # use ringcache::cache::PolicyKind;
/// # use ringcache::group::{GroupRegistry, MapLoader};
/// # #[tokio::main]
/// # async fn main() {
/// let platform = Builder::new().enable_groups().build().await;
///
/// let registry = platform.require::<GroupRegistry>();
/// let _ = registry.create("scores", 0, PolicyKind::Lru, MapLoader::new(vec![("Tom", "630")]));
/// assert_eq!(registry.get("scores", "Tom").await.unwrap().to_string(), "630");
/// # }
/// ```
#[derive(Default)]
pub struct Builder {
    setup_logging: bool,
    enable_signals: bool,
    setup_config: bool,
    setup_peers: bool,
    setup_groups: bool,
    setup_server: bool,
}

impl Builder {
    /// Creates a new builder with all components disabled.
    pub fn new() -> Self {
        Builder::default()
    }

    /// Enables all features.
    ///
    /// Note that components added in a library update will then also be enabled by default.
    pub fn enable_all(mut self) -> Self {
        self.setup_logging = true;
        self.enable_signals = true;
        self.setup_config = true;
        self.setup_peers = true;
        self.setup_groups = true;
        self.setup_server = true;

        self
    }

    /// Enables the setup of the logging system.
    ///
    /// This initializes **simplelog** to log to stdout, which is all that is needed when
    /// running in a container.
    pub fn enable_logging(mut self) -> Self {
        self.setup_logging = true;
        self
    }

    /// Disables the setup of the logging system after [enable_all()](Builder::enable_all).
    pub fn disable_logging(mut self) -> Self {
        self.setup_logging = false;
        self
    }

    /// Installs a signal listener which terminates the node on **CTRL-C** or **SIGHUP**.
    ///
    /// For more details see: [signals](crate::signals)
    pub fn enable_signals(mut self) -> Self {
        self.enable_signals = true;
        self
    }

    /// Disables the signal listener after [enable_all()](Builder::enable_all).
    pub fn disable_signals(mut self) -> Self {
        self.enable_signals = false;
        self
    }

    /// Installs [Config](crate::config::Config) and loads **config/settings.yml**.
    pub fn enable_config(mut self) -> Self {
        self.setup_config = true;
        self
    }

    /// Disables the config after [enable_all()](Builder::enable_all).
    pub fn disable_config(mut self) -> Self {
        self.setup_config = false;
        self
    }

    /// Installs a [PeerPool](crate::peers::PeerPool) along with the peer discovery.
    pub fn enable_peers(mut self) -> Self {
        self.setup_peers = true;
        self
    }

    /// Disables the peer pool after [enable_all()](Builder::enable_all). The node then serves
    /// all keys itself.
    pub fn disable_peers(mut self) -> Self {
        self.setup_peers = false;
        self
    }

    /// Installs a [GroupRegistry](crate::group::GroupRegistry) holding all groups of the config.
    pub fn enable_groups(mut self) -> Self {
        self.setup_groups = true;
        self
    }

    /// Disables the group registry after [enable_all()](Builder::enable_all).
    pub fn disable_groups(mut self) -> Self {
        self.setup_groups = false;
        self
    }

    /// Creates and installs a [Server](crate::server::Server).
    ///
    /// Note that the event loop still has to be invoked manually via
    /// `platform.require::<Server>().event_loop().await`.
    pub fn enable_server(mut self) -> Self {
        self.setup_server = true;
        self
    }

    /// Disables the server after [enable_all()](Builder::enable_all).
    pub fn disable_server(mut self) -> Self {
        self.setup_server = false;
        self
    }

    /// Builds the [Platform](crate::platform::Platform) with all enabled components registered.
    pub async fn build(self) -> Arc<Platform> {
        let platform = Platform::new();

        if self.setup_logging {
            init_logging();
        }

        log::info!(
            "||. RINGCACHE (v {} - rev {}) running on {} core(s) in {} CPU(s)",
            RINGCACHE_VERSION,
            RINGCACHE_REVISION,
            num_cpus::get(),
            num_cpus::get_physical()
        );

        if self.enable_signals {
            crate::signals::install(platform.clone());
        }

        if self.setup_config {
            crate::config::install(platform.clone()).await;
        }

        if self.setup_peers {
            let _ = crate::peers::install(&platform);
        }

        if self.setup_groups {
            let _ = crate::group::install(&platform);
        }

        if self.setup_server {
            let _ = crate::server::Server::install(&platform);
        }

        platform
    }
}
