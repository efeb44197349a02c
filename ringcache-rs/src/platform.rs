//! Provides the registry which holds all central components of a node.
//!
//! Instead of ambient globals, every component (the config, the peer pool, the group registry,
//! the server) is registered here as **Arc<T>** and looked up by type. The platform also carries
//! the central **is_running** flag which turns *false* once
//! [Platform::terminate](Platform::terminate) is invoked. Long running tasks (the accept loop,
//! the config watcher, the discovery task) poll this flag and wind down.
//!
//! Once terminated, the registry is cleared so that all components are dropped. Code which
//! might run after shutdown therefore uses [Platform::find](Platform::find) and handles **None**.
//!
//! # Examples
//!
//! ```
//! # use std::sync::Arc;
//! # use ringcache::platform::Platform;
//! # use ringcache::group::GroupRegistry;
//! let platform = Platform::new();
//! platform.register::<GroupRegistry>(Arc::new(GroupRegistry::new()));
//!
//! assert_eq!(platform.require::<GroupRegistry>().names().is_empty(), true);
//! assert_eq!(platform.is_running(), true);
//!
//! platform.terminate();
//! assert_eq!(platform.find::<GroupRegistry>().is_none(), true);
//! assert_eq!(platform.is_running(), false);
//! ```
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Services = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

/// Keeps all central components of a node in a single place.
pub struct Platform {
    services: Mutex<Services>,
    is_running: AtomicBool,
}

impl Platform {
    /// Creates a new, running platform without any components.
    pub fn new() -> Arc<Self> {
        Arc::new(Platform {
            services: Mutex::new(HashMap::new()),
            is_running: AtomicBool::new(true),
        })
    }

    fn services(&self) -> MutexGuard<'_, Services> {
        self.services.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a component, replacing any previously registered one of the same type.
    pub fn register<T>(&self, service: Arc<T>)
    where
        T: Any + Send + Sync,
    {
        let _ = self.services().insert(TypeId::of::<T>(), service);
    }

    /// Tries to resolve a previously registered component.
    pub fn find<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.services()
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.clone().downcast::<T>().ok())
    }

    /// Resolves a previously registered component.
    ///
    /// # Panics
    /// Panics if the component isn't available, which is a setup error of the node. This also
    /// happens once the platform has been terminated.
    ///
    /// ```should_panic
    /// # use ringcache::platform::Platform;
    /// # use ringcache::server::Server;
    /// let platform = Platform::new();
    /// platform.require::<Server>();
    /// ```
    pub fn require<T>(&self) -> Arc<T>
    where
        T: Any + Send + Sync,
    {
        if !self.is_running() {
            panic!(
                "A required component ({}) has been requested but the node is already shutting down!",
                std::any::type_name::<T>()
            )
        }

        match self.find::<T>() {
            Some(service) => service,
            None => panic!(
                "A required component ({}) was not available in the platform registry!",
                std::any::type_name::<T>()
            ),
        }
    }

    /// Determines if the platform is still running.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Terminates the platform.
    ///
    /// This releases all components and toggles [is_running()](Platform::is_running) to
    /// **false**.
    pub fn terminate(&self) {
        self.services().clear();
        self.is_running.store(false, Ordering::Release);
    }
}
