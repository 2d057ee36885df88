//! Seeded random data generation
//!
//! Provides reproducible device identities for tests. Using the same seed
//! produces identical MACs and addresses, making failures reproducible.
//!
//! # Example
//!
//! ```rust
//! use meshcheck_testkit::random::PseudoGenerator;
//!
//! let mut rng1 = PseudoGenerator::new(42);
//! let mut rng2 = PseudoGenerator::new(42);
//!
//! assert_eq!(rng1.random_mac(), rng2.random_mac());
//! ```

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seeded pseudo-random generator for reproducible test data
#[derive(Debug)]
pub struct PseudoGenerator {
    rng: StdRng,
    seed: u64,
}

impl PseudoGenerator {
    /// Create a new generator with the given seed
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    /// Get the seed used to create this generator
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Locally administered unicast MAC, lowercase and colon separated
    pub fn random_mac(&mut self) -> String {
        let mut octets: [u8; 6] = self.rng.random();
        // Set the locally administered bit, clear the multicast bit
        octets[0] = (octets[0] | 0x02) & 0xfe;
        octets
            .iter()
            .map(|o| format!("{o:02x}"))
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Host address in a /24, e.g. `random_ipv4("192.168.40")`
    pub fn random_ipv4(&mut self, subnet: &str) -> String {
        let host = self.rng.random_range(2..=254u8);
        format!("{subnet}.{host}")
    }

    /// Uppercase hex string of `len` characters
    pub fn random_hex_name(&mut self, len: usize) -> String {
        (0..len)
            .map(|_| {
                let digit = self.rng.random_range(0..16u32);
                char::from_digit(digit, 16)
                    .unwrap_or('0')
                    .to_ascii_uppercase()
            })
            .collect()
    }

    /// Generate a random usize in the given range
    pub fn random_range(&mut self, range: std::ops::Range<usize>) -> usize {
        self.rng.random_range(range)
    }
}
