//! Flow correlation: symbolic labels to stable flow ids.

use std::collections::HashMap;

use crate::ids::IdAllocator;

/// Events carrying the same non-empty flow label share one flow id, which
/// the UI renders as an arrow between them. Ids are never released.
#[derive(Default)]
pub struct FlowCorrelator {
    flows: HashMap<String, u64>,
}

impl FlowCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` for an absent or empty label without allocating.
    pub fn resolve(&mut self, label: Option<&str>, ids: &mut IdAllocator) -> Option<u64> {
        let label = label.filter(|l| !l.is_empty())?;
        let id = *self
            .flows
            .entry(label.to_string())
            .or_insert_with(|| ids.next_id());
        Some(id)
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}
