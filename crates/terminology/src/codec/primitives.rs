//! Fixed-width byte primitives shared by every key codec.
//!
//! These encodings are part of the on-disk format. Changing any of them
//! invalidates entries already written by the affected partitions.

use xxhash_rust::xxh32::xxh32;

/// Seed for every hashed key component.
const HASH_SEED: u32 = 0;

/// 4-byte big-endian xxHash32 of a string.
pub fn hash32(value: &str) -> [u8; 4] {
    xxh32(value.as_bytes(), HASH_SEED).to_be_bytes()
}

/// Hash of an optional string; absent values hash as the empty string.
pub fn hash32_opt(value: Option<&str>) -> [u8; 4] {
    hash32(value.unwrap_or(""))
}

/// Big-endian i32 with the sign bit flipped, so byte order is numeric order.
pub fn sortable_i32(value: i32) -> [u8; 4] {
    ((value as u32) ^ 0x8000_0000).to_be_bytes()
}

/// Big-endian i64 with the sign bit flipped, so byte order is numeric order.
pub fn sortable_i64(value: i64) -> [u8; 8] {
    ((value as u64) ^ 0x8000_0000_0000_0000).to_be_bytes()
}

/// Inverse of [`sortable_i64`].
pub fn from_sortable_i64(bytes: [u8; 8]) -> i64 {
    (u64::from_be_bytes(bytes) ^ 0x8000_0000_0000_0000) as i64
}

/// Smallest byte string greater than every string starting with `prefix`.
///
/// Returns `None` when no such bound exists (empty or all-`0xFF` prefix).
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.pop() {
        if last < 0xFF {
            upper.push(last + 1);
            return Some(upper);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable() {
        // Pinned: a change here breaks every persisted hashed prefix.
        assert_eq!(hash32(""), 0x02CC_5D05_u32.to_be_bytes());
        assert_eq!(hash32("http://ex.org/cs"), hash32("http://ex.org/cs"));
        assert_ne!(hash32("A"), hash32("B"));
        assert_eq!(hash32_opt(None), hash32(""));
    }

    #[test]
    fn test_sortable_integers_preserve_order() {
        let values = [i32::MIN, -1000, -1, 0, 1, 42, i32::MAX];
        for pair in values.windows(2) {
            assert!(sortable_i32(pair[0]) < sortable_i32(pair[1]));
        }

        let values = [i64::MIN, -86_400_000, 0, 1_700_000_000_000, i64::MAX];
        for pair in values.windows(2) {
            assert!(sortable_i64(pair[0]) < sortable_i64(pair[1]));
        }
        assert_eq!(from_sortable_i64(sortable_i64(-5)), -5);
    }

    #[test]
    fn test_prefix_successor() {
        assert_eq!(prefix_successor(&[1, 2, 3]), Some(vec![1, 2, 4]));
        assert_eq!(prefix_successor(&[1, 0xFF]), Some(vec![2]));
        assert_eq!(prefix_successor(&[0xFF, 0xFF]), None);
        assert_eq!(prefix_successor(&[]), None);
    }
}
