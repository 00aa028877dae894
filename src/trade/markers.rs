use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{NationId, TradeId};

/// What a physical world marker stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerTarget {
    Vault(NationId),
    TradePost(TradeId),
}

/// Removes markers from the world when what they stand for goes away.
pub trait MarkerSink: Send + Sync + fmt::Debug {
    fn despawn(&self, entity_id: u64);
}

/// Sink for hosts without physical markers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMarkers;

impl MarkerSink for NullMarkers {
    fn despawn(&self, _entity_id: u64) {}
}

/// Routes world entities back to the domain object they represent.
#[derive(Debug, Default)]
pub struct MarkerIndex {
    targets: HashMap<u64, MarkerTarget>,
}

impl MarkerIndex {
    pub fn register(&mut self, entity_id: u64, target: MarkerTarget) -> Option<MarkerTarget> {
        self.targets.insert(entity_id, target)
    }

    pub fn target(&self, entity_id: u64) -> Option<MarkerTarget> {
        self.targets.get(&entity_id).copied()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Forget every marker pointing at `target`, returning their entity ids.
    pub fn release(&mut self, target: MarkerTarget) -> Vec<u64> {
        let mut released: Vec<u64> = self
            .targets
            .iter()
            .filter(|(_, t)| **t == target)
            .map(|(id, _)| *id)
            .collect();
        released.sort_unstable();
        for id in &released {
            self.targets.remove(id);
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_only_touches_matching_target() {
        let mut index = MarkerIndex::default();
        index.register(10, MarkerTarget::Vault(NationId(1)));
        index.register(11, MarkerTarget::TradePost(TradeId(5)));
        index.register(12, MarkerTarget::TradePost(TradeId(5)));
        assert_eq!(index.release(MarkerTarget::TradePost(TradeId(5))), vec![11, 12]);
        assert_eq!(index.target(10), Some(MarkerTarget::Vault(NationId(1))));
        assert_eq!(index.len(), 1);
    }
}
