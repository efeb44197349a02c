use std::fmt::{Debug, Display, Formatter};

use bytes::Bytes;

use crate::cache::ByteSize;

/// Represents an immutable view on a cached value.
///
/// Internally this is a reference counted [Bytes] buffer. Cloning a view is therefore cheap and
/// never copies the payload, while the buffer itself can never be modified through any view.
/// Converting borrowed data (e.g. a `&[u8]`) into a view copies it, so that the cache always owns
/// the memory it hands out.
///
/// # Examples
/// ```
/// # use ringcache::cache::ByteView;
/// let view = ByteView::from("630");
/// assert_eq!(view.len(), 3);
/// assert_eq!(view.as_slice(), b"630");
/// assert_eq!(view.to_string(), "630");
///
/// // A copy of the data can be obtained and modified without affecting the view...
/// let mut copy = view.to_vec();
/// copy[0] = b'7';
/// assert_eq!(view.as_slice(), b"630");
/// ```
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ByteView {
    data: Bytes,
}

impl ByteView {
    /// Returns the length of the value in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Determines if the value is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Provides read-only access to the underlying data.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Returns a mutable copy of the underlying data.
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.to_vec()
    }

    /// Returns a shared handle to the underlying buffer.
    ///
    /// Used to hand a value to hyper as response body without copying it.
    pub fn to_bytes(&self) -> Bytes {
        self.data.clone()
    }
}

impl ByteSize for ByteView {
    fn byte_size(&self) -> usize {
        self.data.len()
    }
}

impl AsRef<[u8]> for ByteView {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl From<Bytes> for ByteView {
    fn from(data: Bytes) -> Self {
        ByteView { data }
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(data: Vec<u8>) -> Self {
        ByteView {
            data: Bytes::from(data),
        }
    }
}

impl From<&[u8]> for ByteView {
    fn from(data: &[u8]) -> Self {
        ByteView {
            data: Bytes::copy_from_slice(data),
        }
    }
}

impl From<String> for ByteView {
    fn from(data: String) -> Self {
        ByteView {
            data: Bytes::from(data),
        }
    }
}

impl From<&str> for ByteView {
    fn from(data: &str) -> Self {
        ByteView {
            data: Bytes::copy_from_slice(data.as_bytes()),
        }
    }
}

impl Display for ByteView {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.data))
    }
}

impl Debug for ByteView {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ByteView({:?})", self.data)
    }
}
