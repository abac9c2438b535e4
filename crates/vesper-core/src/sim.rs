//! Run bookkeeping and the trajectory fingerprint.

use serde::Serialize;

use crate::id::SimTime;

// ---------------------------------------------------------------------------
// Run summary
// ---------------------------------------------------------------------------

/// Result of an `Environment::run*()` call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunSummary {
    /// Steps executed during this call.
    pub steps_run: u64,
    /// Virtual time when the run returned.
    pub ended_at: SimTime,
    /// Whether the run ended because no events were left rather than at a
    /// horizon.
    pub exhausted: bool,
}

// ---------------------------------------------------------------------------
// Trajectory hash
// ---------------------------------------------------------------------------

/// A deterministic hash of the dispatch sequence, used to compare two runs
/// of the same model.
///
/// FNV-1a (64-bit). Not cryptographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrajectoryHash(pub u64);

impl TrajectoryHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }

    pub fn write_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    /// Feed a time value by its bit pattern.
    pub fn write_time(&mut self, t: SimTime) {
        self.write(&t.to_bits().to_le_bytes());
    }

    pub fn write_str(&mut self, s: &str) {
        self.write(s.as_bytes());
        // separator so "ab"+"c" and "a"+"bc" differ
        self.write(&[0xff]);
    }

    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for TrajectoryHash {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_input_same_hash() {
        let mut h1 = TrajectoryHash::new();
        h1.write_u64(42);
        h1.write_time(1.5);

        let mut h2 = TrajectoryHash::new();
        h2.write_u64(42);
        h2.write_time(1.5);

        assert_eq!(h1.finish(), h2.finish());
    }

    #[test]
    fn write_order_matters() {
        let mut h1 = TrajectoryHash::new();
        h1.write_str("a");
        h1.write_str("b");

        let mut h2 = TrajectoryHash::new();
        h2.write_str("b");
        h2.write_str("a");

        assert_ne!(h1.finish(), h2.finish());
    }

    #[test]
    fn string_boundaries_matter() {
        let mut h1 = TrajectoryHash::new();
        h1.write_str("ab");
        h1.write_str("c");

        let mut h2 = TrajectoryHash::new();
        h2.write_str("a");
        h2.write_str("bc");

        assert_ne!(h1.finish(), h2.finish());
    }
}
