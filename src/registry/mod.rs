//! The authoritative cache of nations and members.
//!
//! Every nation mutation goes through here. The registry also owns the
//! global chunk ownership index and the case-insensitive name index, and
//! tracks which records changed since the last drain so the engine knows
//! what to persist.

mod members;
mod territory;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::{InvariantViolation, NationError};
use crate::id::IdGenerator;
use crate::model::{ChunkCoordinate, Member, Nation, NationId, PlayerId, Role};

pub use territory::ChunkIndex;

pub const NAME_MIN_LEN: usize = 3;
pub const NAME_MAX_LEN: usize = 32;

/// Nation names are 3–32 characters of ASCII letters, digits, `_` or `-`.
pub fn validate_name(name: &str) -> Result<(), NationError> {
    let len = name.chars().count();
    let charset_ok = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if (NAME_MIN_LEN..=NAME_MAX_LEN).contains(&len) && charset_ok {
        Ok(())
    } else {
        Err(NationError::InvalidName(name.to_string()))
    }
}

fn name_key(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// What a disband released, for the caller's teardown and messaging.
#[derive(Debug, Clone, PartialEq)]
pub struct Disbanded {
    pub nation: Nation,
    pub released_members: Vec<PlayerId>,
    pub released_chunks: Vec<ChunkCoordinate>,
}

#[derive(Debug, Default)]
pub struct NationRegistry {
    nations: BTreeMap<NationId, Nation>,
    members: HashMap<PlayerId, Member>,
    names: HashMap<String, NationId>,
    chunks: ChunkIndex,
    dirty_nations: BTreeSet<NationId>,
    dirty_members: BTreeSet<PlayerId>,
    /// Disbanded nations waiting to be written as tombstones.
    disbanded: Vec<(Nation, DateTime<Utc>)>,
}

impl NationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the registry from stored records.
    ///
    /// A chunk claimed by two nations is an invariant violation: it is
    /// logged and the later nation loses the chunk. A nation listing a
    /// member with no profile gets a placeholder profile.
    pub fn restore(nations: Vec<Nation>, members: Vec<Member>) -> Self {
        let mut registry = Self::new();
        for member in members {
            registry.members.insert(member.id, member);
        }
        for mut nation in nations {
            let mut lost = Vec::new();
            for coord in nation.owned_chunks() {
                if let Some(owner) = registry.chunks.owner(coord) {
                    InvariantViolation::report(format!(
                        "chunk {coord} stored for both {owner} and {}",
                        nation.id
                    ));
                    lost.push(coord.clone());
                }
            }
            for coord in &lost {
                nation.claimed_chunks.remove(coord);
                nation.annexed_chunks.remove(coord);
            }
            if !lost.is_empty() {
                registry.dirty_nations.insert(nation.id);
            }
            for coord in nation.owned_chunks() {
                registry.chunks.insert(coord.clone(), nation.id);
            }
            for (player, role) in nation
                .member_ids()
                .map(|p| (p, nation.role_of(p)))
                .collect::<Vec<_>>()
            {
                let member = registry.members.entry(player).or_insert_with(|| {
                    InvariantViolation::report(format!(
                        "{player} listed by {} has no profile",
                        nation.id
                    ));
                    Member::new(player, player.to_string())
                });
                if member.nation_id != Some(nation.id) || member.role != role {
                    member.nation_id = Some(nation.id);
                    member.role = role;
                    registry.dirty_members.insert(player);
                }
            }
            registry.names.insert(name_key(&nation.name), nation.id);
            registry.nations.insert(nation.id, nation);
        }
        registry
    }

    pub fn get(&self, id: NationId) -> Option<&Nation> {
        self.nations.get(&id)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Nation> {
        self.names
            .get(&name_key(name))
            .and_then(|id| self.nations.get(id))
    }

    pub fn list_all(&self) -> impl Iterator<Item = &Nation> {
        self.nations.values()
    }

    pub fn ids(&self) -> Vec<NationId> {
        self.nations.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.nations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nations.is_empty()
    }

    pub fn member(&self, player: PlayerId) -> Option<&Member> {
        self.members.get(&player)
    }

    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    /// The nation `player` belongs to, if any.
    pub fn nation_of(&self, player: PlayerId) -> Option<&Nation> {
        self.members
            .get(&player)
            .and_then(|m| m.nation_id)
            .and_then(|id| self.nations.get(&id))
    }

    /// Mutable access for other components. Marks the nation dirty.
    pub(crate) fn nation_mut(&mut self, id: NationId) -> Option<&mut Nation> {
        let nation = self.nations.get_mut(&id)?;
        self.dirty_nations.insert(id);
        Some(nation)
    }

    pub(crate) fn member_mut(&mut self, player: PlayerId) -> Option<&mut Member> {
        let member = self.members.get_mut(&player)?;
        self.dirty_members.insert(player);
        Some(member)
    }

    /// Explicitly schedule a nation for persistence.
    pub fn touch(&mut self, id: NationId) -> bool {
        if self.nations.contains_key(&id) {
            self.dirty_nations.insert(id);
            true
        } else {
            false
        }
    }

    /// First contact with a player. Idempotent; refreshes the display name.
    pub fn register_member(&mut self, player: PlayerId, display_name: &str) -> &Member {
        let member = self
            .members
            .entry(player)
            .or_insert_with(|| Member::new(player, display_name));
        if member.display_name != display_name {
            member.display_name = display_name.to_string();
            self.dirty_members.insert(player);
        } else if member.revision == 0 {
            self.dirty_members.insert(player);
        }
        member
    }

    /// Found a new nation with `founder` as president.
    pub fn create(
        &mut self,
        ids: &mut IdGenerator,
        name: &str,
        founder: PlayerId,
        now: DateTime<Utc>,
    ) -> Result<&Nation, NationError> {
        let member = self
            .members
            .get(&founder)
            .ok_or(NationError::UnknownPlayer(founder))?;
        if member.has_nation() {
            return Err(NationError::AlreadyInNation(founder));
        }
        validate_name(name)?;
        if self.names.contains_key(&name_key(name)) {
            return Err(NationError::AlreadyExists(name.to_string()));
        }

        let id = NationId(ids.next_id());
        let nation = Nation::found(id, name.to_string(), founder, now);
        self.names.insert(name_key(name), id);
        self.nations.insert(id, nation);
        self.dirty_nations.insert(id);
        if let Some(member) = self.member_mut(founder) {
            member.join(id, Role::President);
        }
        info!(nation = %id, %name, president = %founder, "nation founded");
        Ok(&self.nations[&id])
    }

    /// Check that `requester` may disband `id` without changing anything.
    pub fn check_disband(&self, id: NationId, requester: PlayerId) -> Result<(), NationError> {
        let nation = self.nations.get(&id).ok_or(NationError::NoSuchNation(id))?;
        if nation.president_id != requester {
            return Err(NationError::NotPresident);
        }
        Ok(())
    }

    /// Remove a nation: every member loses their affiliation and every owned
    /// chunk leaves the global index before this returns.
    ///
    /// Alliances, wars and trades referencing the nation are the caller's
    /// to unwind first.
    pub fn disband(
        &mut self,
        id: NationId,
        requester: PlayerId,
        now: DateTime<Utc>,
    ) -> Result<Disbanded, NationError> {
        self.check_disband(id, requester)?;
        let Some(nation) = self.nations.remove(&id) else {
            return Err(NationError::NoSuchNation(id));
        };
        self.names.remove(&name_key(&nation.name));
        self.dirty_nations.remove(&id);

        let released_chunks = self.chunks.release_all(id);
        let released_members: Vec<PlayerId> = nation.member_ids().collect();
        for player in &released_members {
            if let Some(member) = self.member_mut(*player) {
                member.clear_nation();
            }
        }
        // Catch profiles that pointed here without the nation listing them.
        let stray: Vec<PlayerId> = self
            .members
            .values()
            .filter(|m| m.nation_id == Some(id))
            .map(|m| m.id)
            .collect();
        for player in stray {
            InvariantViolation::report(format!("{player} pointed at {id} without being listed"));
            if let Some(member) = self.member_mut(player) {
                member.clear_nation();
            }
        }

        info!(
            nation = %id,
            members = released_members.len(),
            chunks = released_chunks.len(),
            "nation disbanded"
        );
        self.disbanded.push((nation.clone(), now));
        Ok(Disbanded {
            nation,
            released_members,
            released_chunks,
        })
    }

    /// Rename a nation. President-only; same rules as founding.
    pub fn rename(
        &mut self,
        id: NationId,
        requester: PlayerId,
        new_name: &str,
    ) -> Result<(), NationError> {
        let nation = self.nations.get(&id).ok_or(NationError::NoSuchNation(id))?;
        if nation.president_id != requester {
            return Err(NationError::NotPresident);
        }
        validate_name(new_name)?;
        let key = name_key(new_name);
        if self.names.get(&key).is_some_and(|owner| *owner != id) {
            return Err(NationError::AlreadyExists(new_name.to_string()));
        }
        let old_key = name_key(&nation.name);
        self.names.remove(&old_key);
        self.names.insert(key, id);
        if let Some(nation) = self.nation_mut(id) {
            debug!(nation = %id, from = %nation.name, to = %new_name, "nation renamed");
            nation.name = new_name.to_string();
        }
        Ok(())
    }

    /// Take every pending change: dirty nations, dirty members and disband
    /// tombstones. Revisions are bumped on the live records.
    pub(crate) fn drain_changes(&mut self, now: DateTime<Utc>) -> RegistryChanges {
        let mut changes = RegistryChanges::default();
        for id in std::mem::take(&mut self.dirty_nations) {
            if let Some(nation) = self.nations.get_mut(&id) {
                nation.revision += 1;
                nation.updated_at = now;
                changes.nations.push(nation.clone());
            }
        }
        for (mut nation, at) in std::mem::take(&mut self.disbanded) {
            nation.revision += 1;
            nation.updated_at = at;
            changes.disbanded.push((nation, at));
        }
        for player in std::mem::take(&mut self.dirty_members) {
            if let Some(member) = self.members.get_mut(&player) {
                member.revision += 1;
                changes.members.push(member.clone());
            }
        }
        changes
    }

    pub fn chunk_index(&self) -> &ChunkIndex {
        &self.chunks
    }
}

#[derive(Debug, Default)]
pub(crate) struct RegistryChanges {
    pub nations: Vec<Nation>,
    pub disbanded: Vec<(Nation, DateTime<Utc>)>,
    pub members: Vec<Member>,
}
