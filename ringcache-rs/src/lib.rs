//! Ringcache is a distributed, in-memory key-value cache.
//!
//! # Introduction
//! Each node keeps a bounded local cache of recently used values per **group** (a named dataset
//! with its own loader). On a local miss, the key is mapped onto a consistent hash ring which
//! deterministically names the peer owning that key. If this is another node, the value is
//! fetched from it via a tiny HTTP + protobuf protocol. Only the owner (or a node without peers)
//! invokes the loader, so that each value is computed once per cluster rather than once per node.
//! There is no central coordinator and no replication: the ring alone decides where a key lives.
//!
//! # Modules
//! * **cache**: A byte-budgeted eviction cache with pluggable policies (LRU, FIFO, LFU) and the
//!   lock-guarded, lazily constructed wrapper used per group. See [crate::cache].
//! * **ring**: The consistent hash ring with virtual nodes. See [crate::ring].
//! * **peers**: The wire protocol, the client used to fetch from a peer and the pool which
//!   picks the owning peer for a key. See [crate::peers].
//! * **group**: Named cache groups, their loaders and the registry resolving them. See
//!   [crate::group].
//! * **server**: The HTTP endpoint answering peer fetches, the client API and introspection
//!   requests. See [crate::server].
//!
//! # Using Ringcache
//! The [Builder](builder::Builder) sets up all components within a
//! [Platform](platform::Platform). The distribution binary **ringcache-io** does exactly this and
//! reads its groups and peers from **config/settings.yml**.
#![deny(
    missing_docs,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces
)]
use simplelog::{format_description, ConfigBuilder, LevelFilter, SimpleLogger};
use std::sync::Once;

pub mod builder;
pub mod cache;
pub mod config;
pub mod error;
pub mod fmt;
pub mod group;
pub mod peers;
pub mod platform;
pub mod ring;
pub mod server;
pub mod signals;

/// Contains the version of the Ringcache library.
pub const RINGCACHE_VERSION: &str = "DEVELOPMENT-SNAPSHOT";

/// Contains the git commit hash of the Ringcache build being used.
pub const RINGCACHE_REVISION: &str = "NO-REVISION";

/// Initializes the logging system.
///
/// Note that most probably the simplest way is to use a [Builder](builder::Builder) to set up the
/// framework, which will also set up logging if enabled.
pub fn init_logging() {
    static INIT_LOGGING: Once = Once::new();

    // Tests build several platforms within one process, therefore this must be idempotent...
    INIT_LOGGING.call_once(|| {
        if let Err(error) = SimpleLogger::init(
            LevelFilter::Debug,
            ConfigBuilder::new()
                .set_time_format_custom(format_description!(
                    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]"
                ))
                .set_thread_level(LevelFilter::Trace)
                .set_target_level(LevelFilter::Error)
                .set_location_level(LevelFilter::Trace)
                .build(),
        ) {
            eprintln!("Failed to initialize logging system: {}", error);
        }
    });
}

/// Provides a simple macro to execute an async block within `tokio::spawn`.
///
/// The join handle is dropped right away, as all tasks spawned this way watch the platform
/// state themselves.
///
/// # Example
/// ```rust
/// # #[macro_use] extern crate ringcache;
/// # #[tokio::main]
/// # async fn main() {
/// spawn!(async move {
///     // perform some async stuff here...
/// });
/// # }
/// ```
#[macro_export]
macro_rules! spawn {
    ($e:expr) => {{
        std::mem::drop(tokio::spawn($e));
    }};
}
