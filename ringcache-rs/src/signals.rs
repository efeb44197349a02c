//! Terminates the platform on CTRL+C or SIGHUP.
//!
//! Once [Platform::terminate](crate::platform::Platform::terminate) ran, the server stops
//! accepting connections and the background tasks (config watcher, peer discovery) end.
use std::sync::Arc;

use tokio::signal::unix::SignalKind;

use crate::platform::Platform;

/// Forks a task which awaits either **CTRL+C** or **SIGHUP** and then terminates the platform.
pub fn install(platform: Arc<Platform>) {
    crate::spawn!(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        let mut sig_hup = match tokio::signal::unix::signal(SignalKind::hangup()) {
            Ok(signal) => signal,
            Err(error) => {
                log::error!("Cannot listen for SIGHUP: {}", error);
                if ctrl_c.await.is_ok() {
                    log::info!("Received CTRL-C. Shutting down...");
                    platform.terminate();
                }
                return;
            }
        };

        tokio::select! {
            _ = ctrl_c => {
                log::info!("Received CTRL-C. Shutting down...");
                platform.terminate();
            },
            _ = sig_hup.recv() => {
                log::info!("Received SIGHUP. Shutting down...");
                platform.terminate();
            }
        }
    });
}
