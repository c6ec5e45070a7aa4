#![allow(dead_code)]

use pgas_reclaim::shmem::WorldConfig;
use pgas_reclaim::Config;

/// A configuration with small arenas and short backoff delays.
pub fn config(capacity: usize) -> Config {
    let mut config = Config::default();
    config.reclaim.capacity = capacity;
    config.backoff.initial = 1;
    config.backoff.max = 32;
    config
}

pub fn world(units: usize) -> WorldConfig {
    WorldConfig::new(units).with_segment_words(1 << 16)
}

/// Encodes a value unique to `unit` and its `i`-th operation.
pub fn tag(unit: usize, i: usize) -> u64 {
    ((unit as u64) << 32) | i as u64
}

pub fn untag(value: u64) -> (usize, usize) {
    ((value >> 32) as usize, (value & 0xffff_ffff) as usize)
}

/// Asserts that `popped` and `resident` together contain every value pushed
/// by `units` units with `per_unit` values each exactly once.
pub fn assert_conserved(units: usize, per_unit: usize, popped: &[u64], resident: &[u64]) {
    let mut all: Vec<u64> = popped.iter().chain(resident).copied().collect();
    all.sort_unstable();

    let mut expected: Vec<u64> =
        (0..units).flat_map(|unit| (0..per_unit).map(move |i| tag(unit, i))).collect();
    expected.sort_unstable();

    assert_eq!(all.len(), expected.len(), "values lost or duplicated");
    assert_eq!(all, expected);
}
