//! Contains the HTTP endpoint of a node.
//!
//! Opens a server socket on the configured port (**server.port**, 8001 as fallback) bound to the
//! configured IP (**server.host**, 0.0.0.0 as fallback) and serves these routes:
//!
//! * `GET {base_path}{group}/{key}`: answers a peer fetch with the protobuf encoded
//!   [FetchResponse](crate::peers::FetchResponse). Group and key are percent encoded.
//! * `GET {base_path}peers`: lists the current peers as plain text.
//! * `GET {base_path}groups`: lists all groups along with their cache metrics.
//! * `GET /api?group={group}&key={key}`: the lookup for clients, answering the raw value. The
//!   group can be omitted if the node only serves a single one.
//!
//! The base path is **peers.base_path** (`/_ringcache/` by default).
//!
//! The server periodically retries to bind its socket, so that a new instance can be started
//! while the old one bleeds out and the port is handed through with minimal downtime. It also
//! listens to config changes and moves to another host or port if these settings change.
//!
//! # Example
//!
//! ```no_run
//! use ringcache::builder::Builder;
//! use ringcache::config::Config;
//! use ringcache::server::Server;
//!
//! #[tokio::main]
//! async fn main() {
//!     let platform = Builder::new().enable_all().build().await;
//!
//!     // Run on a different port than a production node...
//!     platform.require::<Config>().load_from_string("
//!         server:
//!             port: 1503
//!     ", None);
//!
//!     platform.require::<Server>().event_loop().await;
//! }
//! ```
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::Http;
use hyper::service::service_fn;
use hyper::{Body, Request, Response, StatusCode};
use prost::Message;
use tokio::net::{TcpListener, TcpStream};

use crate::cache::ByteView;
use crate::config::{ChangeNotifier, Config};
use crate::error::CacheError;
use crate::group::GroupRegistry;
use crate::peers::{FetchRequest, FetchResponse, PeerPool};
use crate::platform::Platform;
use crate::spawn;

/// Specifies the timeout when waiting for a new incoming connection.
///
/// When waiting for a new connection we need to interrupt this every once in a while so that
/// we can check if the platform has been shut down.
const CONNECT_WAIT_TIMEOUT: Duration = Duration::from_millis(500);

const DEFAULT_PORT: i64 = 8001;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const OCTET_STREAM: &str = "application/octet-stream";

/// Represents the HTTP server of a node.
pub struct Server {
    running: AtomicBool,
    current_address: Mutex<Option<String>>,
    platform: Arc<Platform>,
}

impl Server {
    /// Creates and installs a **Server** into the given **Platform**.
    ///
    /// Note that this will not start the server. This has to be done manually via
    /// [event_loop](Server::event_loop), most probably in the main task.
    pub fn install(platform: &Arc<Platform>) -> Arc<Self> {
        let server = Arc::new(Server {
            running: AtomicBool::new(false),
            current_address: Mutex::new(None),
            platform: platform.clone(),
        });

        platform.register::<Server>(server.clone());

        server
    }

    fn current_address(&self) -> MutexGuard<'_, Option<String>> {
        self.current_address
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Determines if the server socket should keep listening for incoming connections.
    ///
    /// In contrast to **Platform::is_running** this doesn't control the shutdown. It is toggled
    /// to false once the configured address changed, so that **server_loop** exits and the
    /// **event_loop** binds a socket for the new address.
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Determines the server address based on the current configuration.
    fn address(&self) -> String {
        self.platform
            .find::<Config>()
            .map(|config| {
                let handle = config.current();
                format!(
                    "{}:{}",
                    handle.query("server.host").as_str().unwrap_or("0.0.0.0"),
                    handle
                        .query("server.port")
                        .as_i64()
                        .filter(|port| port > &0 && port <= &(u16::MAX as i64))
                        .unwrap_or(DEFAULT_PORT)
                )
            })
            .unwrap_or_else(|| format!("0.0.0.0:{}", DEFAULT_PORT))
    }

    /// Starts the event loop in a separate task.
    ///
    /// This is most probably used by test scenarios where the tests itself run in the main task.
    pub fn fork(server: &Arc<Server>) {
        let cloned_server = server.clone();
        spawn!(async move {
            cloned_server.event_loop().await;
        });
    }

    /// Starts the event loop in a separate task and waits until the socket is bound.
    ///
    /// Just like **fork** this is intended to be used in test environments.
    pub async fn fork_and_await(server: &Arc<Server>) {
        Server::fork(server);

        while server.current_address().is_none() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Binds the server socket and serves incoming connections until the platform terminates.
    ///
    /// Once the [server_loop](Server::server_loop) returns, either the platform is no longer
    /// running and we exit, or the config has changed and we bind to the new address.
    pub async fn event_loop(&self) {
        let mut address = String::new();
        let mut last_bind_error_reported = Instant::now();

        while self.platform.is_running() {
            if !self.is_running() {
                address = self.address();
                self.running.store(true, Ordering::Release);
            }

            match TcpListener::bind(&address).await {
                Ok(mut listener) => {
                    log::info!("Opened server socket on {}...", &address);
                    *self.current_address() = Some(address.clone());
                    self.server_loop(&mut listener).await;
                    log::info!("Closing server socket on {}.", &address);
                    *self.current_address() = None;
                }
                Err(error) => {
                    // Only report every 5s, as we retry every 500ms...
                    if last_bind_error_reported.elapsed().as_secs() > 5 {
                        log::error!(
                            "Cannot open server address {}: {}. Retrying every 500ms...",
                            &address,
                            error
                        );
                        last_bind_error_reported = Instant::now();
                    }
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            }
        }
    }

    /// Accepts incoming connections until the platform stops or the address changes.
    async fn server_loop(&self, listener: &mut TcpListener) {
        let mut config_changed = self
            .platform
            .find::<Config>()
            .map(|config| config.notifier());

        while self.platform.is_running() && self.is_running() {
            tokio::select! {
                // The timeout makes sure the while condition is checked every once in a while...
                timeout_stream = tokio::time::timeout(CONNECT_WAIT_TIMEOUT, listener.accept()) => {
                    match timeout_stream {
                        Ok(Ok((stream, _))) => self.handle_new_connection(stream),
                        // The socket has been closed, let the event_loop decide what to do...
                        Ok(Err(_)) => return,
                        Err(_) => (),
                    }
                }
                _ = wait_for_change(&mut config_changed) => {
                    let new_address = self.address();
                    let address_changed = match &*self.current_address() {
                        Some(current_address) => current_address != &new_address,
                        None => false,
                    };

                    if address_changed {
                        log::info!("Server address has changed. Restarting server socket...");
                        self.running.store(false, Ordering::Release);
                        return;
                    }
                }
            }
        }
    }

    /// Serves a new connection on its own task.
    fn handle_new_connection(&self, stream: TcpStream) {
        let platform = self.platform.clone();
        spawn!(async move {
            let _ = stream.set_nodelay(true);
            let peer_address = stream
                .peer_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "<unknown>".to_owned());
            log::debug!("Opened connection from {}...", peer_address);

            let service = service_fn(move |request: Request<Body>| {
                let platform = platform.clone();
                async move { Ok::<_, Infallible>(handle(platform, request).await) }
            });

            if let Err(error) = Http::new()
                .http1_only(true)
                .serve_connection(stream, service)
                .await
            {
                log::debug!(
                    "An IO error occurred in connection {}: {}",
                    peer_address,
                    error
                );
            }

            log::debug!("Closing connection to {}...", peer_address);
        });
    }
}

async fn wait_for_change(notifier: &mut Option<ChangeNotifier>) {
    match notifier {
        Some(notifier) => {
            let _ = notifier.recv().await;
        }
        None => std::future::pending().await,
    }
}

/// Dispatches a request to the matching route.
pub async fn handle(platform: Arc<Platform>, request: Request<Body>) -> Response<Body> {
    let path = request.uri().path();
    log::debug!("{} {}", request.method(), path);

    if path == "/api" {
        return api(&platform, request.uri().query().unwrap_or("")).await;
    }

    let base_path = match platform.find::<PeerPool>() {
        Some(pool) => pool.base_path().to_owned(),
        None => crate::peers::DEFAULT_BASE_PATH.to_owned(),
    };

    match path.strip_prefix(base_path.as_str()) {
        Some("peers") | Some("peers/") => peers(&platform),
        Some("groups") | Some("groups/") => groups(&platform),
        Some(request) => serve_peer(&platform, request).await,
        None => respond(StatusCode::NOT_FOUND, TEXT_PLAIN, "Not found"),
    }
}

/// Answers a fetch of another peer.
///
/// **request** is the part of the path behind the base path, i.e. `{group}/{key}`. Paths
/// outside of the base path never get here, [handle] answers them with 404.
pub async fn serve_peer(platform: &Platform, request: &str) -> Response<Body> {
    let request = match FetchRequest::from_path(request) {
        Ok(request) => request,
        Err(error) => return error_response(error),
    };

    match lookup(platform, &request.group, &request.key).await {
        Ok(value) => respond(
            StatusCode::OK,
            OCTET_STREAM,
            FetchResponse {
                value: value.to_vec(),
            }
            .encode_to_vec(),
        ),
        Err(error) => error_response(error),
    }
}

async fn lookup(
    platform: &Platform,
    group: &str,
    key: &str,
) -> Result<ByteView, CacheError> {
    match platform.find::<GroupRegistry>() {
        Some(registry) => registry.get(group, key).await,
        None => Err(CacheError::NotFound(format!("no such group: {}", group))),
    }
}

async fn api(platform: &Platform, query: &str) -> Response<Body> {
    let mut group = None;
    let mut key = None;
    for (name, value) in query.split('&').filter_map(|param| param.split_once('=')) {
        let value = match urlencoding::decode(&value.replace('+', " ")) {
            Ok(value) => value.into_owned(),
            Err(_) => {
                return respond(
                    StatusCode::BAD_REQUEST,
                    TEXT_PLAIN,
                    format!("Invalid parameter: {}", name),
                )
            }
        };
        match name {
            "group" => group = Some(value),
            "key" => key = Some(value),
            _ => (),
        }
    }

    let group = match group {
        Some(group) => group,
        None => match single_group(platform) {
            Some(group) => group,
            None => {
                return respond(StatusCode::BAD_REQUEST, TEXT_PLAIN, "group is required");
            }
        },
    };

    match lookup(platform, &group, key.as_deref().unwrap_or("")).await {
        Ok(value) => respond(StatusCode::OK, OCTET_STREAM, value.to_bytes()),
        Err(error) => error_response(error),
    }
}

fn single_group(platform: &Platform) -> Option<String> {
    let mut names = platform.find::<GroupRegistry>()?.names();
    if names.len() == 1 {
        names.pop()
    } else {
        None
    }
}

fn peers(platform: &Platform) -> Response<Body> {
    let listing = platform
        .find::<PeerPool>()
        .map(|pool| pool.listing())
        .unwrap_or_default();

    respond(StatusCode::OK, TEXT_PLAIN, listing)
}

fn groups(platform: &Platform) -> Response<Body> {
    let mut listing = String::new();
    if let Some(registry) = platform.find::<GroupRegistry>() {
        for name in registry.names() {
            if let Some(group) = registry.find(&name) {
                listing.push_str(&format!("{}: {}\n", name, group.stats()));
            }
        }
    }

    respond(StatusCode::OK, TEXT_PLAIN, listing)
}

fn error_response(error: CacheError) -> Response<Body> {
    let status = error.status_code();
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        log::error!("{}", error);
    }

    respond(status, TEXT_PLAIN, error.to_string())
}

fn respond(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Body>,
) -> Response<Body> {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    let _ = response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));

    response
}
