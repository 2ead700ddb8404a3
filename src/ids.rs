//! Identifier allocation for tracks, flows and the packet sequence.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// Hands out 64-bit identifiers that are unique for the lifetime of one
/// allocator. Ids are random so that documents built independently do not
/// collide when loaded together, and 0 is never issued since Perfetto treats
/// a zero uuid as "no track".
pub struct IdAllocator {
    rng: Box<dyn RngCore>,
    issued: HashSet<u64>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::with_rng(Box::new(StdRng::from_os_rng()))
    }

    /// Deterministic allocator, used by tests and reproducible builds.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(Box::new(StdRng::seed_from_u64(seed)))
    }

    pub fn with_rng(rng: Box<dyn RngCore>) -> Self {
        IdAllocator {
            rng,
            issued: HashSet::new(),
        }
    }

    pub fn next_id(&mut self) -> u64 {
        loop {
            let id = self.rng.next_u64();
            if id != 0 && self.issued.insert(id) {
                return id;
            }
        }
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> usize {
        self.issued.len()
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Derive the trusted packet sequence id shared by every packet of one
/// document from a root identifier.
pub const fn sequence_id_from_root(root: u64) -> u32 {
    (root >> 32) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_nonzero() {
        let mut ids = IdAllocator::seeded(7);
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let id = ids.next_id();
            assert_ne!(id, 0);
            assert!(seen.insert(id));
        }
        assert_eq!(ids.issued(), 10_000);
    }

    #[test]
    fn test_seeded_is_deterministic() {
        let mut a = IdAllocator::seeded(42);
        let mut b = IdAllocator::seeded(42);
        for _ in 0..16 {
            assert_eq!(a.next_id(), b.next_id());
        }
    }

    #[test]
    fn test_sequence_id_from_root() {
        assert_eq!(sequence_id_from_root(0x1234_5678_9abc_def0), 0x1234_5678);
        assert_eq!(sequence_id_from_root(u64::MAX), u32::MAX);
    }
}
