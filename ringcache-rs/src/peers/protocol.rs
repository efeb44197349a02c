//! Defines the messages exchanged between peers.
//!
//! A fetch is a plain HTTP GET to `{peer}{base_path}{group}/{key}` with both segments percent
//! encoded. The peer answers with **200** and a protobuf encoded [FetchResponse] as body. The
//! [FetchRequest] describes the path side of this exchange.
use std::borrow::Cow;

use crate::error::CacheError;

/// Names the value to fetch from a peer.
#[derive(Clone, PartialEq, prost::Message)]
pub struct FetchRequest {
    /// The name of the cache group.
    #[prost(string, tag = "1")]
    pub group: String,

    /// The key within the group.
    #[prost(string, tag = "2")]
    pub key: String,
}

/// Carries the value answered by a peer.
#[derive(Clone, PartialEq, prost::Message)]
pub struct FetchResponse {
    /// The raw bytes of the cached value.
    #[prost(bytes = "vec", tag = "1")]
    pub value: Vec<u8>,
}

impl FetchRequest {
    /// Creates a request for the given group and key.
    pub fn new(group: impl Into<String>, key: impl Into<String>) -> Self {
        FetchRequest {
            group: group.into(),
            key: key.into(),
        }
    }

    /// Renders the request path below the given base path.
    ///
    /// # Example
    /// ```
    /// # use ringcache::peers::FetchRequest;
    /// let request = FetchRequest::new("scores", "Tom & Jerry");
    /// assert_eq!(request.to_path("/_ringcache/"), "/_ringcache/scores/Tom%20%26%20Jerry");
    /// ```
    pub fn to_path(&self, base_path: &str) -> String {
        format!(
            "{}{}/{}",
            base_path,
            urlencoding::encode(&self.group),
            urlencoding::encode(&self.key)
        )
    }

    /// Parses the part of a request path which follows the base path.
    ///
    /// Expects exactly `{group}/{key}`. The key itself may not contain an unencoded slash, as it
    /// is percent encoded by the sender.
    ///
    /// # Example
    /// ```
    /// # use ringcache::peers::FetchRequest;
    /// let request = FetchRequest::from_path("scores/Tom%20%26%20Jerry").unwrap();
    /// assert_eq!(request.group, "scores");
    /// assert_eq!(request.key, "Tom & Jerry");
    ///
    /// assert_eq!(FetchRequest::from_path("scores").is_err(), true);
    /// assert_eq!(FetchRequest::from_path("scores/Tom/Jerry").is_err(), true);
    /// ```
    pub fn from_path(path: &str) -> Result<Self, CacheError> {
        let mut parts = path.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(group), Some(key), None) if !group.is_empty() => Ok(FetchRequest {
                group: decode_segment(group)?.into_owned(),
                key: decode_segment(key)?.into_owned(),
            }),
            _ => Err(CacheError::Configuration(format!("bad request: {}", path))),
        }
    }
}

fn decode_segment(segment: &str) -> Result<Cow<'_, str>, CacheError> {
    urlencoding::decode(segment).map_err(|error| {
        CacheError::Configuration(format!("bad path segment '{}': {}", segment, error))
    })
}

#[cfg(test)]
mod tests {
    use prost::Message;

    use crate::peers::protocol::{FetchRequest, FetchResponse};

    #[test]
    fn messages_survive_the_wire() {
        let request = FetchRequest::new("scores", "Tom");
        let decoded = FetchRequest::decode(request.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.group, "scores");
        assert_eq!(decoded.key, "Tom");

        let response = FetchResponse {
            value: vec![0x36, 0x33, 0x30],
        };
        let decoded = FetchResponse::decode(response.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.value, vec![0x36, 0x33, 0x30]);
    }

    #[test]
    fn responses_use_the_protobuf_layout() {
        // Field 1, wire type 2 (length delimited), 3 bytes...
        let response = FetchResponse {
            value: b"630".to_vec(),
        };
        assert_eq!(response.encode_to_vec(), vec![0x0A, 0x03, 0x36, 0x33, 0x30]);

        // An empty value is encoded as empty message...
        assert_eq!(FetchResponse::default().encode_to_vec().is_empty(), true);
    }

    #[test]
    fn paths_are_percent_encoded_both_ways() {
        let request = FetchRequest::new("user scores", "a/b");
        let path = request.to_path("/_ringcache/");
        assert_eq!(path, "/_ringcache/user%20scores/a%2Fb");

        let parsed = FetchRequest::from_path(&path["/_ringcache/".len()..]).unwrap();
        assert_eq!(parsed, request);

        // Invalid UTF-8 sequences are rejected...
        assert_eq!(FetchRequest::from_path("scores/%FF").is_err(), true);
        // ..as well as a missing group.
        assert_eq!(FetchRequest::from_path("/Tom").is_err(), true);
    }
}
