use std::collections::HashMap;

use tracing::debug;

use super::NationRegistry;
use crate::error::{InvariantViolation, NationError};
use crate::model::{ChunkCoordinate, Nation, NationId};

/// Global chunk → owner index. A coordinate appears at most once.
#[derive(Debug, Default)]
pub struct ChunkIndex {
    owners: HashMap<ChunkCoordinate, NationId>,
}

impl ChunkIndex {
    pub fn owner(&self, coord: &ChunkCoordinate) -> Option<NationId> {
        self.owners.get(coord).copied()
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChunkCoordinate, NationId)> {
        self.owners.iter().map(|(c, n)| (c, *n))
    }

    pub(super) fn insert(&mut self, coord: ChunkCoordinate, owner: NationId) {
        self.owners.insert(coord, owner);
    }

    fn remove(&mut self, coord: &ChunkCoordinate) -> Option<NationId> {
        self.owners.remove(coord)
    }

    /// Drop every entry owned by `owner`, returning the released coordinates.
    pub(super) fn release_all(&mut self, owner: NationId) -> Vec<ChunkCoordinate> {
        let released: Vec<ChunkCoordinate> = self
            .owners
            .iter()
            .filter(|(_, n)| **n == owner)
            .map(|(c, _)| c.clone())
            .collect();
        for coord in &released {
            self.owners.remove(coord);
        }
        released
    }
}

impl NationRegistry {
    pub fn owner_of(&self, coord: &ChunkCoordinate) -> Option<&Nation> {
        self.chunks.owner(coord).and_then(|id| self.nations.get(&id))
    }

    /// Claim an unowned chunk for `nation_id`, subject to `quota` on the
    /// nation's claimed (not annexed) chunk count.
    ///
    /// The nation set and the global index are updated together.
    pub fn claim(
        &mut self,
        nation_id: NationId,
        coord: ChunkCoordinate,
        quota: u32,
    ) -> Result<(), NationError> {
        let nation = self
            .nations
            .get(&nation_id)
            .ok_or(NationError::NoSuchNation(nation_id))?;
        if self.chunks.owner(&coord).is_some() {
            return Err(NationError::AlreadyClaimed(coord));
        }
        if nation.owns(&coord) {
            return Err(InvariantViolation::report(format!(
                "{nation_id} holds {coord} but the index has no owner"
            ))
            .into());
        }
        if nation.claimed_chunks.len() >= quota as usize {
            return Err(NationError::QuotaExceeded { quota });
        }

        self.chunks.insert(coord.clone(), nation_id);
        if let Some(nation) = self.nation_mut(nation_id) {
            debug!(nation = %nation_id, chunk = %coord, "chunk claimed");
            nation.claimed_chunks.insert(coord);
        }
        Ok(())
    }

    /// Release a chunk owned (claimed or annexed) by `nation_id`.
    pub fn unclaim(&mut self, nation_id: NationId, coord: &ChunkCoordinate) -> Result<(), NationError> {
        let nation = self
            .nations
            .get(&nation_id)
            .ok_or(NationError::NoSuchNation(nation_id))?;
        if self.chunks.owner(coord) != Some(nation_id) {
            return Err(NationError::NotOwner(coord.clone()));
        }
        if !nation.owns(coord) {
            return Err(InvariantViolation::report(format!(
                "index assigns {coord} to {nation_id} but the nation does not hold it"
            ))
            .into());
        }

        self.chunks.remove(coord);
        if let Some(nation) = self.nation_mut(nation_id) {
            nation.claimed_chunks.remove(coord);
            nation.annexed_chunks.remove(coord);
            debug!(nation = %nation_id, chunk = %coord, "chunk released");
        }
        Ok(())
    }

    /// Move a chunk from its current owner into `to`'s annexed set.
    pub(crate) fn transfer_chunk(
        &mut self,
        coord: &ChunkCoordinate,
        to: NationId,
    ) -> Result<NationId, NationError> {
        if !self.nations.contains_key(&to) {
            return Err(NationError::NoSuchNation(to));
        }
        let from = self
            .chunks
            .owner(coord)
            .ok_or_else(|| NationError::NotOwner(coord.clone()))?;
        let holds = self.nations.get(&from).is_some_and(|n| n.owns(coord));
        if !holds {
            return Err(InvariantViolation::report(format!(
                "index assigns {coord} to {from} but the nation does not hold it"
            ))
            .into());
        }

        if let Some(loser) = self.nation_mut(from) {
            loser.claimed_chunks.remove(coord);
            loser.annexed_chunks.remove(coord);
        }
        if let Some(winner) = self.nation_mut(to) {
            winner.annexed_chunks.insert(coord.clone());
        }
        self.chunks.insert(coord.clone(), to);
        debug!(chunk = %coord, %from, %to, "chunk annexed");
        Ok(from)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::super::tests::registry_with;
    use crate::model::PlayerId;

    use super::*;

    fn c(x: i32, z: i32) -> ChunkCoordinate {
        ChunkCoordinate::new("world", x, z)
    }

    #[test]
    fn second_claim_is_rejected() {
        let (mut reg, mut ids) = registry_with(&[1, 2]);
        let rome = reg.create(&mut ids, "Rome", PlayerId(1), Utc::now()).unwrap().id;
        let gaul = reg.create(&mut ids, "Gaul", PlayerId(2), Utc::now()).unwrap().id;
        reg.claim(rome, c(0, 0), 16).unwrap();
        assert_eq!(
            reg.claim(gaul, c(0, 0), 16).unwrap_err(),
            NationError::AlreadyClaimed(c(0, 0))
        );
        assert_eq!(reg.owner_of(&c(0, 0)).unwrap().id, rome);
    }

    #[test]
    fn quota_counts_claimed_chunks() {
        let (mut reg, mut ids) = registry_with(&[1]);
        let rome = reg.create(&mut ids, "Rome", PlayerId(1), Utc::now()).unwrap().id;
        reg.claim(rome, c(0, 0), 2).unwrap();
        reg.claim(rome, c(0, 1), 2).unwrap();
        assert_eq!(
            reg.claim(rome, c(0, 2), 2).unwrap_err(),
            NationError::QuotaExceeded { quota: 2 }
        );
    }

    #[test]
    fn unclaim_requires_ownership() {
        let (mut reg, mut ids) = registry_with(&[1, 2]);
        let rome = reg.create(&mut ids, "Rome", PlayerId(1), Utc::now()).unwrap().id;
        let gaul = reg.create(&mut ids, "Gaul", PlayerId(2), Utc::now()).unwrap().id;
        reg.claim(rome, c(1, 1), 16).unwrap();
        assert_eq!(
            reg.unclaim(gaul, &c(1, 1)).unwrap_err(),
            NationError::NotOwner(c(1, 1))
        );
        reg.unclaim(rome, &c(1, 1)).unwrap();
        assert!(reg.owner_of(&c(1, 1)).is_none());
        reg.claim(gaul, c(1, 1), 16).unwrap();
    }

    #[test]
    fn transfer_moves_into_annexed_set() {
        let (mut reg, mut ids) = registry_with(&[1, 2]);
        let rome = reg.create(&mut ids, "Rome", PlayerId(1), Utc::now()).unwrap().id;
        let gaul = reg.create(&mut ids, "Gaul", PlayerId(2), Utc::now()).unwrap().id;
        reg.claim(gaul, c(5, 5), 16).unwrap();
        assert_eq!(reg.transfer_chunk(&c(5, 5), rome).unwrap(), gaul);
        assert!(reg.get(rome).unwrap().annexed_chunks.contains(&c(5, 5)));
        assert!(!reg.get(gaul).unwrap().owns(&c(5, 5)));
        assert_eq!(reg.chunk_index().owner(&c(5, 5)), Some(rome));
    }
}
