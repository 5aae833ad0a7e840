//! Deployment name pool.
//!
//! Names are drawn from a fixed adjective × noun pool (24 × 24 = 576 unique
//! combinations). Collisions with tracked deployments are resolved by
//! re-drawing; once the pool is exhausted names may repeat.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;

const ADJECTIVES: [&str; 24] = [
    "brave", "calm", "clever", "eager", "fierce", "gentle", "happy", "keen",
    "lively", "lucky", "mighty", "noble", "proud", "quick", "quiet", "rapid",
    "sharp", "silent", "smart", "solid", "steady", "swift", "vivid", "witty",
];

const NOUNS: [&str; 24] = [
    "badger", "condor", "coyote", "dolphin", "falcon", "gecko", "heron",
    "ibex", "jackal", "kestrel", "lynx", "marten", "narwhal", "ocelot",
    "otter", "panther", "puffin", "raven", "salmon", "tapir", "viper",
    "walrus", "wombat", "zebra",
];

/// Number of unique names the pool can produce.
pub const POOL_SIZE: usize = ADJECTIVES.len() * NOUNS.len();

/// Draw one random name.
pub fn random_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adjective = ADJECTIVES.choose(rng).expect("non-empty pool");
    let noun = NOUNS.choose(rng).expect("non-empty pool");
    format!("{adjective}-{noun}")
}

/// Draw a name avoiding the given set. After `POOL_SIZE` attempts the pool is
/// considered exhausted and the last draw is returned even if it repeats.
pub fn unique_name<R: Rng + ?Sized>(rng: &mut R, taken: &HashSet<String>) -> String {
    let mut name = random_name(rng);
    for _ in 0..POOL_SIZE {
        if !taken.contains(&name) {
            return name;
        }
        name = random_name(rng);
    }
    name
}
