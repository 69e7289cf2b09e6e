//! Interning cache for 4-byte ECU, application and context identifiers
//!
//! The same handful of identifiers appear on every line of a trace, so the
//! decoder converts each distinct 32-bit value to a string once and hands out
//! shared `Arc<str>` clones afterwards. The cache is process-wide and may be
//! used from many decoder threads at once.

use std::sync::{Arc, OnceLock, RwLock};

const BUCKETS: usize = 65536;

/// A fixed-size bucket table keyed by the packed 32-bit identifier
pub struct IdCache {
    buckets: Box<[RwLock<Vec<(u32, Arc<str>)>>]>,
}

impl IdCache {
    pub fn new() -> Self {
        let buckets = (0..BUCKETS).map(|_| RwLock::new(Vec::new())).collect();
        Self { buckets }
    }

    /// The shared cache used by every decoder in the process
    pub fn global() -> &'static IdCache {
        static INSTANCE: OnceLock<IdCache> = OnceLock::new();
        INSTANCE.get_or_init(IdCache::new)
    }

    /// Returns the string for a big-endian packed identifier
    pub fn parse_id(&self, id: u32) -> Arc<str> {
        let bucket = &self.buckets[Self::bucket_index(id)];

        if let Ok(entries) = bucket.read() {
            if let Some((_, value)) = entries.iter().find(|(key, _)| *key == id) {
                return Arc::clone(value);
            }
        }

        let value: Arc<str> = Arc::from(id_to_string(id));
        // A racing insert of the same key stores an identical string, so
        // either entry is acceptable.
        if let Ok(mut entries) = bucket.write() {
            if !entries.iter().any(|(key, _)| *key == id) {
                entries.push((id, Arc::clone(&value)));
            }
        }
        value
    }

    /// Number of cached identifiers
    pub fn len(&self) -> usize {
        self.buckets
            .iter()
            .filter_map(|bucket| bucket.read().ok().map(|entries| entries.len()))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn bucket_index(id: u32) -> usize {
        (((id & 0x7F7F) ^ (id >> 16)) & 0x7F7F) as usize
    }
}

impl Default for IdCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts a packed identifier to a string without caching
///
/// Bytes are taken most significant first, masked to 7 bits, up to the first
/// zero byte.
pub fn id_to_string(id: u32) -> String {
    id.to_be_bytes()
        .iter()
        .map(|b| b & 0x7F)
        .take_while(|&b| b != 0)
        .map(char::from)
        .collect()
}

/// Packs up to four characters of an identifier into wire bytes
///
/// Missing characters are zero; characters are masked to 7 bits.
pub fn id_to_bytes(id: &str) -> [u8; 4] {
    let mut bytes = [0u8; 4];
    for (slot, c) in bytes.iter_mut().zip(id.chars()) {
        *slot = (c as u32 & 0x7F) as u8;
    }
    bytes
}

/// Packs an identifier into the big-endian 32-bit form used in headers
pub fn id_to_u32(id: &str) -> u32 {
    u32::from_be_bytes(id_to_bytes(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_to_string_stops_at_zero() {
        assert_eq!(id_to_string(0x4543_5531), "ECU1");
        assert_eq!(id_to_string(0x4150_0000), "AP");
        assert_eq!(id_to_string(0x0041_4243), "");
        assert_eq!(id_to_string(0), "");
    }

    #[test]
    fn test_id_to_string_masks_high_bit() {
        assert_eq!(id_to_string(0xC1C2_C3C4), "ABCD");
    }

    #[test]
    fn test_id_to_bytes() {
        assert_eq!(id_to_bytes("APP1"), *b"APP1");
        assert_eq!(id_to_bytes("AB"), [0x41, 0x42, 0, 0]);
        assert_eq!(id_to_bytes("TOOLONG"), *b"TOOL");
        assert_eq!(id_to_bytes(""), [0; 4]);
        assert_eq!(id_to_u32("CTX1"), 0x4354_5831);
    }

    #[test]
    fn test_cache_returns_shared_value() {
        let cache = IdCache::new();
        let first = cache.parse_id(0x4150_5031);
        let second = cache.parse_id(0x4150_5031);
        assert_eq!(&*first, "APP1");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_bucket_collisions_keep_distinct_values() {
        // Both identifiers fold to the same bucket
        let cache = IdCache::new();
        let a = 0x0000_4142;
        let b = 0x0101_4043;
        assert_eq!(IdCache::bucket_index(a), IdCache::bucket_index(b));
        assert_ne!(cache.parse_id(a), cache.parse_id(b));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_concurrent_inserts() {
        let cache = Arc::new(IdCache::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for id in 0x4141_4141u32..0x4141_4161 {
                        assert_eq!(&*cache.parse_id(id), id_to_string(id).as_str());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 0x20);
    }
}
