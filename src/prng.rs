//! Single read-only register returning a pseudo-random word on every read.
//!
//! Grounded on `examples/original_source/hw/arm/ctr9_prng.c`
//! (`ctr9_prng_read` returns `rand()` unconditionally, `ctr9_prng_write`
//! is a no-op). The original seeds libc's `rand()` from wall-clock time at
//! device init; this engine takes an explicit seed instead so a `Board`
//! built with the same seed produces the same sequence across runs.

use crate::bus::{AccessSize, MmioDevice};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

pub struct Prng {
    rng: StdRng,
}

impl Prng {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl MmioDevice for Prng {
    fn read(&mut self, _offset: u32, _size: AccessSize) -> u32 {
        self.rng.next_u32()
    }

    fn write(&mut self, _offset: u32, _size: AccessSize, _value: u32) {}
}
