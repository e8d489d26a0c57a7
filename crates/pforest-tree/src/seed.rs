//! Per-tree seed derivation.
//!
//! Every tree gets its own random stream derived from `(root seed, ordinal)`.
//! No process-wide generator is involved, so a tree can be rebuilt in
//! isolation and the forest is identical whether trees are built in
//! parallel or one after another.

use rand::rngs::StdRng;
use rand::SeedableRng;

const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

/// Mix the root seed with a tree ordinal (SplitMix64 finalizer).
pub fn derive_tree_seed(seed: u64, ordinal: usize) -> u64 {
    let mut z = seed ^ (ordinal as u64).wrapping_add(1).wrapping_mul(GOLDEN_GAMMA);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// The random stream for tree `ordinal`.
pub fn tree_rng(seed: u64, ordinal: usize) -> StdRng {
    StdRng::seed_from_u64(derive_tree_seed(seed, ordinal))
}
