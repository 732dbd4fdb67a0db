//! Stable 32-bit name hashing.
//!
//! Agent, function, message and variable names are bound to kernels as
//! namespace hashes so per-thread lookups compare integers instead of
//! strings.  FNV-1a is used because it is `const`-evaluable and stable
//! across platforms and compiler versions.

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME:  u32 = 0x0100_0193;

/// FNV-1a hash of `name`.
pub const fn namespace_hash(name: &str) -> u32 {
    let bytes = name.as_bytes();
    let mut hash = FNV_OFFSET;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    hash
}

/// Combine two namespace hashes (e.g. agent + function).
#[inline]
pub const fn combine_hash(a: u32, b: u32) -> u32 {
    a ^ b.wrapping_mul(FNV_PRIME).rotate_left(13)
}
