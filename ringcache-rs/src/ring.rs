//! Provides a consistent hash ring which maps keys onto the nodes of a cluster.
//!
//! Each node is placed onto a circular space of 32-bit hashes several times (once per
//! **replica**, also known as virtual node). A key is owned by the first virtual node at or
//! after the hash of the key, wrapping around at the end of the ring. Adding or removing a node
//! therefore only moves the keys between the affected virtual nodes and their predecessors,
//! roughly `1 / nodes` of all keys, whereas `hash(key) mod nodes` would reshuffle almost all of
//! them.
//!
//! More replicas smooth out the share of each node at the expense of memory (`replicas * nodes`
//! hashes) and lookup time (a binary search over these).
//!
//! # Example
//!
//! ```
//! # use ringcache::ring::HashRing;
//! let mut ring = HashRing::new(50, None);
//! ring.add(&["http://10.0.0.1:8001", "http://10.0.0.2:8001"]);
//!
//! let owner = ring.get("Tom").unwrap();
//! assert_eq!(ring.get("Tom"), Some(owner));
//! ```
use fnv::FnvHashMap;

/// Computes the position of a node or key on the ring.
pub type HashFn = fn(&[u8]) -> u32;

/// The lookup table of the CRC-32 (IEEE 802.3) checksum, reflected polynomial 0xEDB88320.
const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut index = 0;
    while index < 256 {
        let mut crc = index as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xEDB8_8320
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[index] = crc;
        index += 1;
    }
    table
};

/// Computes the CRC-32 (IEEE) checksum of the given data.
///
/// This is the default hash of a [HashRing]. It is stable across processes and platforms, so
/// that all nodes agree on the owner of a key as long as they share the node list.
///
/// # Example
///
/// ```
/// assert_eq!(ringcache::ring::crc32(b"123456789"), 0xCBF4_3926);
/// assert_eq!(ringcache::ring::crc32(b""), 0);
/// ```
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for byte in data {
        crc = CRC32_TABLE[((crc ^ *byte as u32) & 0xFF) as usize] ^ (crc >> 8);
    }

    !crc
}

/// Maps keys onto nodes using consistent hashing with virtual nodes.
///
/// A ring is never modified once it is in use by a [PeerPool](crate::peers::PeerPool). Changing
/// the cluster builds a new ring from scratch, which yields the same placement as long as the
/// same nodes, replica count and hash function are used.
pub struct HashRing {
    hash: HashFn,
    replicas: usize,
    keys: Vec<u32>,
    nodes: FnvHashMap<u32, String>,
}

impl HashRing {
    /// Creates an empty ring placing each node **replicas** times.
    ///
    /// If no hash function is given, [crc32] is used.
    pub fn new(replicas: usize, hash: Option<HashFn>) -> Self {
        HashRing {
            hash: hash.unwrap_or(crc32),
            replicas,
            keys: Vec::new(),
            nodes: FnvHashMap::default(),
        }
    }

    /// Places the given nodes onto the ring.
    ///
    /// The virtual node **i** of a node **n** is placed at `hash(i + n)` (the replica index in
    /// decimal, directly followed by the node name). Adding a node twice places it twice; it is
    /// up to the caller to avoid this.
    pub fn add<N: AsRef<str>>(&mut self, nodes: &[N]) {
        for node in nodes {
            let node = node.as_ref();
            for replica in 0..self.replicas {
                let hash = (self.hash)(format!("{}{}", replica, node).as_bytes());
                self.keys.push(hash);
                let _ = self.nodes.insert(hash, node.to_owned());
            }
        }

        self.keys.sort_unstable();
    }

    /// Returns the node owning the given key or **None** if the ring is empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }

        let hash = (self.hash)(key.as_bytes());
        let index = self.keys.partition_point(|&candidate| candidate < hash);
        let virtual_node = self.keys[index % self.keys.len()];

        self.nodes.get(&virtual_node).map(String::as_str)
    }

    /// Returns the number of virtual nodes on the ring.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Determines if no node has been added yet.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns the number of virtual nodes per node.
    pub fn replicas(&self) -> usize {
        self.replicas
    }
}

#[cfg(test)]
mod tests {
    use crate::ring::{crc32, HashRing};

    fn atoi(data: &[u8]) -> u32 {
        std::str::from_utf8(data).unwrap().parse().unwrap()
    }

    #[test]
    fn keys_are_owned_by_the_next_virtual_node() {
        // Nodes 6, 4 and 2 occupy the positions 2, 4, 6, 12, 14, 16, 22, 24 and 26...
        let mut ring = HashRing::new(3, Some(atoi));
        ring.add(&["6", "4", "2"]);
        assert_eq!(ring.len(), 9);

        assert_eq!(ring.get("2"), Some("2"));
        assert_eq!(ring.get("11"), Some("2"));
        assert_eq!(ring.get("23"), Some("4"));
        // ..and the ring wraps around after 26.
        assert_eq!(ring.get("27"), Some("2"));

        // Node 8 takes 8, 18 and 28, so only 27 moves...
        ring.add(&["8"]);
        assert_eq!(ring.get("2"), Some("2"));
        assert_eq!(ring.get("11"), Some("2"));
        assert_eq!(ring.get("23"), Some("4"));
        assert_eq!(ring.get("27"), Some("8"));
    }

    #[test]
    fn an_empty_ring_owns_nothing() {
        let ring = HashRing::new(50, None);
        assert_eq!(ring.is_empty(), true);
        assert_eq!(ring.get("Tom"), None);
    }

    #[test]
    fn lookups_are_deterministic() {
        let mut ring = HashRing::new(4, None);
        ring.add(&["peerA", "peerB"]);

        let owner = ring.get("hello").unwrap().to_owned();
        assert_eq!(owner == "peerA" || owner == "peerB", true);
        for _ in 0..10 {
            assert_eq!(ring.get("hello"), Some(owner.as_str()));
        }

        // A ring built from scratch places everything the same way...
        let mut rebuilt = HashRing::new(4, None);
        rebuilt.add(&["peerA", "peerB"]);
        for i in 0..1000 {
            let key = format!("key-{}", i);
            assert_eq!(ring.get(&key), rebuilt.get(&key));
        }
    }

    #[test]
    fn adding_a_node_twice_creates_duplicate_virtual_nodes() {
        let mut ring = HashRing::new(10, None);
        ring.add(&["peerA"]);
        ring.add(&["peerA"]);
        assert_eq!(ring.len(), 20);
        assert_eq!(ring.get("Tom"), Some("peerA"));
    }

    #[test]
    fn removing_a_node_only_moves_its_own_keys() {
        let nodes: Vec<String> = (1..=5).map(|i| format!("http://10.0.0.{}:8001", i)).collect();
        let mut full = HashRing::new(50, None);
        full.add(&nodes[..]);
        let mut reduced = HashRing::new(50, None);
        reduced.add(&nodes[..4]);

        let samples = 20_000;
        let mut moved = 0;
        for i in 0..samples {
            let key = format!("user-{}", i);
            let before = full.get(&key).unwrap();
            let after = reduced.get(&key).unwrap();
            if before != after {
                assert_eq!(before, nodes[4]);
                moved += 1;
            }
        }

        // Statistically this is about 1/5 of all keys...
        let fraction = moved as f64 / samples as f64;
        assert_eq!(fraction > 0.05 && fraction < 0.35, true, "moved: {}", fraction);
    }

    #[test]
    fn crc32_matches_the_reference_values() {
        assert_eq!(crc32(b"The quick brown fox jumps over the lazy dog"), 0x414F_A339);
        assert_eq!(crc32(b"a"), 0xE8B7_BE43);
    }
}
