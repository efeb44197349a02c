//! Contains the node configuration.
//!
//! The configuration is read from **config/settings.yml**. The file is watched for changes and
//! reloaded once its modification date moves forward. Components which depend on settings (the
//! server socket, the peer list, the discovery task) attach themselves to
//! [Config::notifier](Config::notifier) and re-apply the config once a change is broadcast, so
//! that a cluster can be reshaped without restarting its nodes.
//!
//! The **Config** itself can be obtained from the **Platform** once and kept around. A
//! [Handle] obtained via **Config::current()** however is a snapshot and should only be used
//! for a single pass of reading settings.
//!
//! # Examples
//!
//! Reading a setting:
//! ```
//! # use ringcache::builder::Builder;
//! # use ringcache::config::Config;
//! # #[tokio::main]
//! # async fn main() {
//! # let platform = Builder::new().enable_config().build().await;
//! let config = platform.require::<Config>();
//! config.load_from_string("peers:\n  replicas: 100", None).unwrap();
//!
//! let replicas = config.current().query("peers.replicas").as_i64().unwrap_or(50);
//! assert_eq!(replicas, 100);
//! # }
//! ```
//!
//! Attaching a change listener:
//! ```no_run
//! # use ringcache::builder::Builder;
//! # use ringcache::config::Config;
//! # #[tokio::main]
//! # async fn main() {
//! # let platform = Builder::new().enable_config().build().await;
//! let config = platform.require::<Config>();
//! let mut notifier = config.notifier();
//! tokio::spawn(async move {
//!     while notifier.recv().await.is_ok() {
//!         log::info!("Re-reading the peer list...");
//!     }
//! });
//! # }
//! ```
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Context;
use arc_swap::ArcSwap;
use yaml_rust::{Yaml, YamlLoader};

use crate::platform::Platform;

/// Provides access to the node configuration.
///
/// Most probably a config instance is installed by the [Builder](crate::builder::Builder) and
/// can be obtained via `platform.require::<Config>()`.
pub struct Config {
    filename: String,
    tx: tokio::sync::broadcast::Sender<()>,
    config: ArcSwap<(Yaml, Option<SystemTime>)>,
}

/// Represents the change listener.
///
/// The message itself carries no information. Once one is received, the config has changed
/// and needs to be re-processed.
pub type ChangeNotifier = tokio::sync::broadcast::Receiver<()>;

/// Represents a snapshot of the currently loaded configuration.
pub struct Handle {
    config: Arc<(Yaml, Option<SystemTime>)>,
}

impl Config {
    /// Creates a new config reading the given file.
    ///
    /// Note that this will neither load the file nor watch it. This is done by [install].
    pub fn new(file: &str) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(1);
        Config {
            filename: file.to_owned(),
            config: ArcSwap::new(Arc::new((Yaml::Hash(Default::default()), None))),
            tx,
        }
    }

    /// Obtains a change notifier which receives a message once the config changed.
    pub fn notifier(&self) -> ChangeNotifier {
        self.tx.subscribe()
    }

    /// Obtains a handle to the currently loaded configuration.
    pub fn current(&self) -> Handle {
        Handle {
            config: self.config.load_full(),
        }
    }

    /// Determines the last modified date of the config file on disk.
    ///
    /// Within docker the file might be an unmounted volume, which shows up as directory.
    /// Therefore only regular files count.
    #[cfg(not(test))]
    async fn last_modified(&self) -> Option<SystemTime> {
        tokio::fs::metadata(&self.filename)
            .await
            .ok()
            .filter(|meta| meta.is_file())
            .and_then(|meta| meta.modified().ok())
    }

    /// Reads the underlying file.
    ///
    /// Note that this is normally called by the framework and should not be invoked manually.
    pub async fn load(&self) -> anyhow::Result<()> {
        log::info!("Loading config file {}...", &self.filename);

        match tokio::fs::metadata(&self.filename).await {
            Ok(metadata) if metadata.is_file() => (),
            _ => {
                log::info!("Config file doesn't exist or is not a file - using defaults.");
                return Ok(());
            }
        }

        let config_data = tokio::fs::read_to_string(&self.filename)
            .await
            .with_context(|| format!("Cannot load config file {}", &self.filename))?;

        let last_modified = tokio::fs::metadata(&self.filename)
            .await
            .ok()
            .and_then(|metadata| metadata.modified().ok());

        self.load_from_string(config_data.as_str(), last_modified)
    }

    /// Loads a configuration from the given string instead of a file.
    ///
    /// A document which cannot be parsed is rejected and the previous config stays active.
    ///
    /// # Example
    ///
    /// ```
    /// # use ringcache::config::Config;
    /// let config = Config::new("somefile.yml");
    /// config.load_from_string("
    /// server:
    ///     port: 8002
    /// ", None).unwrap();
    ///
    /// assert_eq!(config.current().query("server.port").as_i64().unwrap(), 8002);
    ///
    /// assert_eq!(config.load_from_string("server: 'broken", None).is_err(), true);
    /// assert_eq!(config.current().query("server.port").as_i64().unwrap(), 8002);
    /// ```
    pub fn load_from_string(
        &self,
        data: &str,
        last_modified: Option<SystemTime>,
    ) -> anyhow::Result<()> {
        let mut docs = YamlLoader::load_from_str(data).map_err(|error| {
            anyhow::anyhow!("Cannot parse config file {}: {}", &self.filename, error)
        })?;

        let doc = match docs.drain(..).next() {
            Some(doc @ Yaml::Hash(_)) => doc,
            _ => Yaml::Hash(Default::default()),
        };

        self.config.store(Arc::new((doc, last_modified)));

        // Notify all listeners - we ignore if there are none...
        let _ = self.tx.send(());

        Ok(())
    }
}

impl Handle {
    /// Provides access to the root of the currently loaded configuration.
    pub fn config(&self) -> &Yaml {
        &self.config.0
    }

    /// Navigates along the given dotted path, e.g. **"peers.discovery.service"**.
    ///
    /// Returns **Yaml::BadValue** if any part of the path is missing.
    pub fn query(&self, query: impl AsRef<str>) -> &Yaml {
        query
            .as_ref()
            .split('.')
            .fold(&self.config.0, |node, key| &node[key])
    }

    /// Reads a string setting, falling back to the given default if it is absent.
    pub fn string_or(&self, query: impl AsRef<str>, default: impl Into<String>) -> String {
        match self.query(query) {
            Yaml::String(value) => value.clone(),
            Yaml::Integer(value) => value.to_string(),
            Yaml::Real(value) => value.clone(),
            _ => default.into(),
        }
    }

    /// Reads a duration setting like **5s** or **500ms**, falling back to the given default if
    /// it is absent.
    ///
    /// A plain number is interpreted as milliseconds. An unparseable value is reported as error.
    pub fn duration_or(
        &self,
        query: impl AsRef<str>,
        default: Duration,
    ) -> anyhow::Result<Duration> {
        match self.query(query.as_ref()) {
            Yaml::String(value) => crate::fmt::parse_duration(value)
                .with_context(|| format!("Invalid setting {}", query.as_ref())),
            Yaml::Integer(value) if *value >= 0 => Ok(Duration::from_millis(*value as u64)),
            Yaml::BadValue | Yaml::Null => Ok(default),
            other => Err(anyhow::anyhow!(
                "Invalid setting {}: expected a duration but got {:?}",
                query.as_ref(),
                other
            )),
        }
    }
}

/// Creates and installs a **Config** for the given platform.
///
/// This reads **config/settings.yml** and also installs a change listener for this file. Note
/// that this listener only watches the "last modified" date of the file and doesn't perform a
/// structural comparison. Each config user must therefore cope with partial changes.
pub async fn install(platform: Arc<Platform>) {
    let path = Path::new("config").to_path_buf();
    if let Err(error) = tokio::fs::create_dir_all(path.clone()).await {
        log::warn!(
            "Failed to create config base directory {}: {}",
            path.to_string_lossy(),
            error
        )
    }

    let config = Arc::new(Config::new("config/settings.yml"));
    platform.register::<Config>(config.clone());

    if let Err(error) = config.load().await {
        log::error!("{:#}", error);
    }

    run_config_change_monitor(platform, config);
}

#[cfg(test)]
fn run_config_change_monitor(_platform: Arc<Platform>, _config: Arc<Config>) {
    // No automatic updates during testing...
}

#[cfg(not(test))]
fn run_config_change_monitor(platform: Arc<Platform>, config: Arc<Config>) {
    crate::spawn!(async move {
        while platform.is_running() {
            tokio::time::sleep(Duration::from_secs(2)).await;

            let last_modified = config.last_modified().await;
            let last_loaded = config.config.load().1;

            // Reload if a file is present and newer than the one previously loaded...
            if last_modified.is_some() && (last_loaded.is_none() || last_modified > last_loaded) {
                match config.load().await {
                    Ok(_) => log::info!("Node configuration was re-loaded."),
                    Err(error) => log::error!("Failed to re-load node config: {:#}", error),
                }
            }
        }
    });
}
