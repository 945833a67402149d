//! Composite-key encoding and partition hashing.
//!
//! A record's key on the wire is a `u16` big-endian hash-key length, the
//! hash-key bytes, then the sort-key bytes. The hash key selects the
//! partition; the sort key orders records within it. A zero-length hash key
//! is legal and means "hash the remainder instead": tables that omit the
//! hash-key discriminator still route deterministically by sort key.

use crate::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};
use std::cmp::Ordering;

/// 0xFFFF in the length prefix is reserved, so a hash key holds at most
/// 65,534 bytes.
pub const HASH_KEY_LEN_MAX: usize = 0xFFFF - 1;

/// Encodes (hash key, sort key) into the wire form.
pub fn encode_key(hash_key: &[u8], sort_key: &[u8]) -> Result<Bytes> {
    let mut b = encode_prefixed(hash_key)?;
    b.put_slice(sort_key);
    Ok(b.freeze())
}

/// Splits a wire-form key back into (hash key, sort key).
pub fn decode_key(mut key: Bytes) -> Result<(Bytes, Bytes)> {
    if key.len() < 2 {
        return Err(Error::InvalidArgument(
            "key is shorter than its length prefix".into(),
        ));
    }
    let len = u16::from_be_bytes([key[0], key[1]]) as usize;
    if len == 0xFFFF {
        return Err(Error::InvalidArgument(
            "key carries the reserved hash-key length 0xffff".into(),
        ));
    }
    if 2 + len > key.len() {
        return Err(Error::InvalidArgument(format!(
            "key of {} bytes claims a {} byte hash key",
            key.len(),
            len
        )));
    }
    let _prefix = key.split_to(2);
    let hash_key = key.split_to(len);
    Ok((hash_key, key))
}

/// The smallest key strictly greater than every key under `hash_key`:
/// the encoded hash key incremented as an unsigned big-endian integer,
/// with 0xFF bytes rolling off the end. All-0xFF (and the empty hash key)
/// overflow to the empty sequence, which means "no upper bound".
pub fn encode_hash_key_upper_bound(hash_key: &[u8]) -> Result<Bytes> {
    let mut b = encode_prefixed(hash_key)?;
    while b.len() > 2 {
        let last = b.len() - 1;
        if b[last] == 0xFF {
            b.truncate(last);
        } else {
            b[last] += 1;
            return Ok(b.freeze());
        }
    }
    Ok(Bytes::new())
}

fn encode_prefixed(hash_key: &[u8]) -> Result<BytesMut> {
    if hash_key.len() > HASH_KEY_LEN_MAX {
        return Err(Error::InvalidArgument(format!(
            "hash key is {} bytes, limit is {}",
            hash_key.len(),
            HASH_KEY_LEN_MAX
        )));
    }
    let mut b = BytesMut::with_capacity(2 + hash_key.len());
    b.put_u16(hash_key.len() as u16);
    b.put_slice(hash_key);
    Ok(b)
}

/// Hashes an encoded key to its routing value: CRC-64 of the hash-key
/// bytes, or of the sort-key remainder when the hash key is empty.
pub fn partition_hash(encoded_key: &[u8]) -> u64 {
    if encoded_key.len() < 2 {
        return crc64(encoded_key);
    }
    let len = u16::from_be_bytes([encoded_key[0], encoded_key[1]]) as usize;
    let body = &encoded_key[2..];
    if len == 0 || len > body.len() {
        crc64(body)
    } else {
        crc64(&body[..len])
    }
}

pub fn partition_index(hash: u64, partition_count: u32) -> u32 {
    (hash % partition_count as u64) as u32
}

/// Unsigned lexicographic byte order.
pub fn byte_compare(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}

// CRC-64 with the reflected ECMA-182 polynomial (the CRC-64/XZ variant:
// initial and final values all-ones).
const CRC64_POLY: u64 = 0xC96C_5795_D787_0F42;

const fn crc64_table() -> [u64; 256] {
    let mut table = [0u64; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u64;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC64_POLY
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC64_TABLE: [u64; 256] = crc64_table();

pub fn crc64(data: &[u8]) -> u64 {
    let mut crc = !0u64;
    for &byte in data {
        crc = CRC64_TABLE[((crc ^ byte as u64) & 0xFF) as usize] ^ (crc >> 8);
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc64_check_value() {
        // Catalog check value for CRC-64/XZ.
        assert_eq!(crc64(b"123456789"), 0x995D_C9BB_DF19_39FA);
        assert_eq!(crc64(b""), 0);
    }

    #[test]
    fn empty_keys_encode_to_the_prefix_alone() {
        let key = encode_key(b"", b"").unwrap();
        assert_eq!(&key[..], &[0x00, 0x00]);
        let (h, s) = decode_key(key).unwrap();
        assert!(h.is_empty());
        assert!(s.is_empty());
    }

    #[test]
    fn encode_then_decode_round_trips() {
        let key = encode_key(b"ab", b"xy").unwrap();
        assert_eq!(&key[..], &[0x00, 0x02, 0x61, 0x62, 0x78, 0x79]);
        let (h, s) = decode_key(key).unwrap();
        assert_eq!(&h[..], b"ab");
        assert_eq!(&s[..], b"xy");

        for (hash_key, sort_key) in [
            (&b""[..], &b"sort"[..]),
            (b"h", b""),
            (b"hash", b"sort"),
            (&[0xFF, 0x00][..], &[0x00, 0xFF][..]),
        ] {
            let (h, s) = decode_key(encode_key(hash_key, sort_key).unwrap()).unwrap();
            assert_eq!(&h[..], hash_key);
            assert_eq!(&s[..], sort_key);
        }
    }

    #[test]
    fn oversize_hash_key_is_rejected() {
        let long = vec![0u8; 0xFFFF];
        assert!(matches!(
            encode_key(&long, b""),
            Err(Error::InvalidArgument(_))
        ));
        assert!(encode_key(&long[..HASH_KEY_LEN_MAX], b"").is_ok());
    }

    #[test]
    fn decode_rejects_malformed_keys() {
        assert!(decode_key(Bytes::from_static(&[0x00])).is_err());
        assert!(decode_key(Bytes::from_static(&[0xFF, 0xFF, 0x61])).is_err());
        // Prefix claims 3 bytes of hash key but only 1 follows.
        assert!(decode_key(Bytes::from_static(&[0x00, 0x03, 0x61])).is_err());
    }

    #[test]
    fn upper_bound_increments_the_hash_key() {
        let bound = encode_hash_key_upper_bound(b"ab").unwrap();
        assert_eq!(&bound[..], &[0x00, 0x02, 0x61, 0x63]);

        // Trailing 0xFF rolls over into the preceding byte.
        let bound = encode_hash_key_upper_bound(&[0x61, 0xFF]).unwrap();
        assert_eq!(&bound[..], &[0x00, 0x02, 0x62]);

        // All-0xFF hash keys have no finite bound.
        assert!(encode_hash_key_upper_bound(&[0xFF, 0xFF]).unwrap().is_empty());
        assert!(encode_hash_key_upper_bound(b"").unwrap().is_empty());
    }

    #[test]
    fn upper_bound_dominates_every_sort_key() {
        let bound = encode_hash_key_upper_bound(b"ab").unwrap();
        for sort_key in [&b""[..], b"a", &[0xFF; 64][..]] {
            let key = encode_key(b"ab", sort_key).unwrap();
            assert_eq!(byte_compare(&key, &bound), Ordering::Less);
        }
    }

    #[test]
    fn byte_compare_is_unsigned_lexicographic() {
        assert_eq!(byte_compare(&[0x00, 0xFF], &[0x01, 0x00]), Ordering::Less);
        assert_eq!(byte_compare(&[0xFF], &[0xFF, 0x00]), Ordering::Less);
        assert_eq!(byte_compare(&[0x80], &[0x7F]), Ordering::Greater);
        assert_eq!(byte_compare(b"same", b"same"), Ordering::Equal);
    }

    #[test]
    fn partition_hash_covers_the_hash_key_only() {
        let key = encode_key(b"ab", b"xy").unwrap();
        assert_eq!(partition_hash(&key), crc64(b"ab"));

        // Sort keys must not influence routing.
        let other = encode_key(b"ab", b"different-sort-key").unwrap();
        assert_eq!(partition_hash(&key), partition_hash(&other));
    }

    #[test]
    fn empty_hash_key_hashes_the_remainder() {
        let key = encode_key(b"", b"sort").unwrap();
        assert_eq!(partition_hash(&key), crc64(b"sort"));
    }

    #[test]
    fn partition_index_is_the_hash_modulo_count() {
        for count in [1u32, 2, 8, 128] {
            let hash = crc64(b"some-key");
            assert_eq!(partition_index(hash, count), (hash % count as u64) as u32);
            assert!(partition_index(hash, count) < count);
        }
    }
}
