//! Counter-based RNG streams.
//!
//! Each Monte-Carlo unit of work (a realization of a bin, a synthesis draw)
//! seeds its own generator from `(seed, stream, index)`, so results do not
//! depend on thread count or scheduling order.

use rand::SeedableRng;
use rand::rngs::StdRng;

#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Independent generator for work item `index` of stream `stream`.
pub fn stream_rng(seed: u64, stream: u64, index: u64) -> StdRng {
    let key = splitmix64(seed ^ splitmix64(stream)).wrapping_mul(2654435761);
    StdRng::seed_from_u64(splitmix64(key.wrapping_add(index)))
}
