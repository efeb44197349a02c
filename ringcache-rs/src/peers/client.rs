use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use hyper::client::HttpConnector;
use hyper::{Body, Client, StatusCode, Uri};
use hyper_tls::HttpsConnector;
use prost::Message;

use crate::cache::ByteView;
use crate::error::CacheError;
use crate::peers::{FetchRequest, FetchResponse, PeerGetter};

/// The HTTP client shared by all peer clients of a node.
pub type HttpClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Creates an HTTP client which talks to **http** as well as **https** peers.
pub fn http_client() -> HttpClient {
    Client::builder().build::<_, Body>(HttpsConnector::new())
}

/// Fetches values from one peer.
///
/// Each fetch, including connecting and reading the whole body, is bounded by the given
/// timeout. Exceeding it yields a [CacheError::Network].
pub struct PeerClient {
    peer: String,
    base_path: String,
    timeout: Duration,
    client: HttpClient,
}

impl PeerClient {
    /// Creates a client for the peer reachable at the given base URL (e.g. `http://10.0.0.2:8001`).
    pub fn new(peer: &str, base_path: &str, timeout: Duration, client: HttpClient) -> Self {
        PeerClient {
            peer: peer.trim_end_matches('/').to_owned(),
            base_path: base_path.to_owned(),
            timeout,
            client,
        }
    }

    /// Returns the URL which serves the given group and key.
    pub fn url_for(&self, group: &str, key: &str) -> String {
        format!(
            "{}{}",
            self.peer,
            FetchRequest::new(group, key).to_path(&self.base_path)
        )
    }

    async fn request(&self, uri: Uri) -> Result<Bytes, CacheError> {
        let response = self.client.get(uri).await?;
        if response.status() != StatusCode::OK {
            return Err(CacheError::RemoteStatus(response.status()));
        }

        Ok(hyper::body::to_bytes(response.into_body()).await?)
    }
}

#[async_trait]
impl PeerGetter for PeerClient {
    fn peer(&self) -> &str {
        &self.peer
    }

    async fn fetch(&self, group: &str, key: &str) -> Result<ByteView, CacheError> {
        let url = self.url_for(group, key);
        let uri = url.parse::<Uri>().map_err(|error| {
            CacheError::Configuration(format!("Invalid peer URL {}: {}", url, error))
        })?;

        let body = tokio::time::timeout(self.timeout, self.request(uri)).await??;
        let response = FetchResponse::decode(body)?;

        Ok(ByteView::from(response.value))
    }
}
