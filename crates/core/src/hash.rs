//! Stable index hashes
//!
//! FNV-1a in 32-bit and 64-bit widths, plus order-sensitive combinators
//! that fold two hashes into one for composite (two-field) indices.
//!
//! Index lookups are keyed by these values, so callers compute the same
//! hash independently of the replica. The functions are therefore:
//! - Deterministic across processes, platforms and client instances
//! - `const fn`, usable for compile-time constants
//! - Not cryptographic; never use them for anything security relevant
//!
//! Pair combinators run FNV-1a over the big-endian bytes of the first hash
//! followed by the big-endian bytes of the second, so `pair(a, b)` and
//! `pair(b, a)` generally differ.

const FNV32_OFFSET: u32 = 0x811c_9dc5;
const FNV32_PRIME: u32 = 0x0100_0193;
const FNV64_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV64_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a 32-bit hash of `bytes`
pub const fn hash32(bytes: &[u8]) -> u32 {
    let mut hash = FNV32_OFFSET;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u32;
        hash = hash.wrapping_mul(FNV32_PRIME);
        i += 1;
    }
    hash
}

/// FNV-1a 64-bit hash of `bytes`
pub const fn hash64(bytes: &[u8]) -> u64 {
    let mut hash = FNV64_OFFSET;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(FNV64_PRIME);
        i += 1;
    }
    hash
}

/// 32-bit hash of a string's UTF-8 bytes
pub const fn hash32_str(s: &str) -> u32 {
    hash32(s.as_bytes())
}

/// 64-bit hash of a string's UTF-8 bytes
pub const fn hash64_str(s: &str) -> u64 {
    hash64(s.as_bytes())
}

/// Fold two 32-bit hashes into one (order-sensitive)
pub const fn hash32_pair(first: u32, second: u32) -> u32 {
    let a = first.to_be_bytes();
    let b = second.to_be_bytes();
    let bytes = [a[0], a[1], a[2], a[3], b[0], b[1], b[2], b[3]];
    hash32(&bytes)
}

/// Fold two 64-bit hashes into one (order-sensitive)
pub const fn hash64_pair(first: u64, second: u64) -> u64 {
    let a = first.to_be_bytes();
    let b = second.to_be_bytes();
    let bytes = [
        a[0], a[1], a[2], a[3], a[4], a[5], a[6], a[7], b[0], b[1], b[2], b[3], b[4], b[5], b[6],
        b[7],
    ];
    hash64(&bytes)
}
