//! Keyed MurmurHash3 (32-bit) and bucket index derivation.
//!
//! The store hashes every key once, at the edge of the façade, and carries the digest around
//! afterwards: the same 32 bits select the bucket, shortcut key comparison during chain
//! traversal, and are cached on both the chain node and the entry. MurmurHash3 was chosen
//! because it gives good distribution at a tiny cost; the store is not exposed to adversarial
//! inputs, so a keyed non-cryptographic hash is sufficient (the seed merely decorrelates
//! distinct store instances).
//!
//! The hasher is total: every byte slice, including the empty one, has a defined digest.
//! Argument validation (there is no such thing as an absent key in safe Rust, but empty keys
//! are rejected) happens in the façade _before_ the hasher is reached, never through an in-band
//! sentinel value.

/// The first block mixing constant.
const C1: u32 = 0xcc9e_2d51;
/// The second block mixing constant.
const C2: u32 = 0x1b87_3593;
/// The round multiplier.
const M: u32 = 5;
/// The round addend.
const N: u32 = 0xe654_6b64;

/// Mix a 4-byte block into a digest-ready word.
///
/// This is the per-block half of the algorithm; the result is XOR'd into the running state by
/// the caller.
fn mix(mut k: u32) -> u32 {
    k = k.wrapping_mul(C1);
    k = k.rotate_left(15);
    k.wrapping_mul(C2)
}

/// The finalization function.
///
/// This scrambles the accumulated state so that every input bit affects every output bit
/// (avalanche). Without it, short keys differing in their last block would produce digests
/// differing in few bits, which the masked bucket index would then collapse.
fn diffuse(mut h: u32) -> u32 {
    // Move entropy down by XOR with shifting.
    h ^= h >> 16;
    // Scatter it up again through multiplication.
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^ (h >> 16)
}

/// Hash a key under a seed.
///
/// This is MurmurHash3 in its 32-bit flavor: the key is consumed in 4-byte little-endian
/// blocks, each mixed into the state, with the unaligned tail (at most 3 bytes) mixed in last
/// and the total byte length folded into finalization.
///
/// The function is pure and deterministic; equal `(key, seed)` pairs always produce equal
/// digests, across platforms.
pub fn hash(key: &[u8], seed: u32) -> u32 {
    let mut h = seed;

    // Consume the body of the key, one little-endian 4-byte block at a time.
    let mut blocks = key.chunks_exact(4);
    for block in blocks.by_ref() {
        let k = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);

        h ^= mix(k);
        h = h.rotate_left(13);
        h = h.wrapping_mul(M).wrapping_add(N);
    }

    // Mix in the tail. The remaining bytes are assembled into a partial little-endian word,
    // which goes through the block mixer but not through the rotate-multiply round.
    let tail = blocks.remainder();
    if !tail.is_empty() {
        let mut k = 0;
        for (n, &byte) in tail.iter().enumerate() {
            k |= u32::from(byte) << (8 * n);
        }

        h ^= mix(k);
    }

    // Fold in the length (in bytes, no sentinel included) and diffuse.
    h ^= key.len() as u32;
    diffuse(h)
}

/// Derive the bucket index of a digest.
///
/// The bucket count is a power of two, so the index is a mask, not a modulo.
pub fn bucket_index(hash: u32, buckets: u32) -> usize {
    debug_assert!(
        buckets.is_power_of_two(),
        "the bucket count must be a power of two"
    );

    (hash & (buckets - 1)) as usize
}
