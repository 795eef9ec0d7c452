//! Murmur3 x64 128-bit hashing, used to derive shader filenames (seed
//! `19081996`) and pipeline-state cache keys (seed `234823489`). Also a
//! 32-bit FNV-1a string hash for the `DUSK_STRING_HASH` resource-name
//! constants emitted by the generator and for case-insensitive HLSL
//! semantic table lookups.

/// A 128-bit digest, stored as two little-endian 64-bit halves exactly as
/// `MurmurHash3_x64_128` writes them.
pub type Hash128 = (u64, u64);

const C1: u64 = 0x87c3_7b91_1142_53d5;
const C2: u64 = 0x4cf5_ad43_2745_937f;

#[inline]
fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^= k >> 33;
    k
}

#[inline]
fn block64(data: &[u8], index: usize) -> u64 {
    let offset = index * 8;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

/// MurmurHash3_x64_128, bit-for-bit compatible with the public-domain
/// reference implementation the Dusk engine links against.
pub fn murmur3_x64_128(data: &[u8], seed: u32) -> Hash128 {
    let len = data.len();
    let nblocks = len / 16;

    let mut h1: u64 = u64::from(seed);
    let mut h2: u64 = u64::from(seed);

    for i in 0..nblocks {
        let mut k1 = block64(data, i * 2);
        let mut k2 = block64(data, i * 2 + 1);

        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(31);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;

        h1 = h1.rotate_left(27);
        h1 = h1.wrapping_add(h2);
        h1 = h1.wrapping_mul(5).wrapping_add(0x52dc_e729);

        k2 = k2.wrapping_mul(C2);
        k2 = k2.rotate_left(33);
        k2 = k2.wrapping_mul(C1);
        h2 ^= k2;

        h2 = h2.rotate_left(31);
        h2 = h2.wrapping_add(h1);
        h2 = h2.wrapping_mul(5).wrapping_add(0x3849_5ab5);
    }

    let tail = &data[nblocks * 16..];
    let mut k1: u64 = 0;
    let mut k2: u64 = 0;

    let tail_len = tail.len();
    if tail_len >= 9 {
        for i in (9..=tail_len.min(15)).rev() {
            k2 ^= u64::from(tail[i - 1]) << (8 * (i - 9));
        }
        k2 = k2.wrapping_mul(C2);
        k2 = k2.rotate_left(33);
        k2 = k2.wrapping_mul(C1);
        h2 ^= k2;
    }
    if tail_len >= 1 {
        for i in (1..=tail_len.min(8)).rev() {
            k1 ^= u64::from(tail[i - 1]) << (8 * (i - 1));
        }
        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(31);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;
    }

    h1 ^= len as u64;
    h2 ^= len as u64;

    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    h1 = fmix64(h1);
    h2 = fmix64(h2);

    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    (h1, h2)
}

/// Formats a 128-bit digest as the 32-character lowercase hex filename used
/// by the generator and the on-disk PSO cache.
pub fn format_digest_hex(digest: Hash128) -> String {
    format!("{:016x}{:016x}", digest.0, digest.1)
}

/// FNV-1a 32-bit, used for `DUSK_STRING_HASH`-style resource name constants
/// and semantic-table lookups. Case-folds to ASCII lowercase first so a
/// semantic table lookup ("looked up case-insensitively") is a
/// straightforward hash-and-compare.
pub fn string_hash32(s: &str) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    let mut hash = OFFSET_BASIS;
    for byte in s.as_bytes() {
        hash ^= u32::from(byte.to_ascii_lowercase());
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}
