use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::chunk::ChunkCoordinate;
use super::ids::{NationId, PlayerId, WarId};
use super::kinds::Role;

pub const BASE_POWER: f64 = 1.0;
pub const MAX_POWER: f64 = 6.0;
pub const MAX_POWER_LEVEL: u8 = 6;

/// Derive the 1–6 power tier: the highest whole threshold not exceeding
/// `power`, never below 1 and capped at 6.
pub fn power_level_for(power: f64) -> u8 {
    if !power.is_finite() || power < 1.0 {
        return 1;
    }
    (power.floor() as u8).clamp(1, MAX_POWER_LEVEL)
}

/// The top-level player organization.
///
/// A player id appears in at most one of the four role sets; use
/// [`Nation::assign`] and [`Nation::remove_member`] rather than touching the
/// sets directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nation {
    pub id: NationId,
    pub name: String,
    pub power: f64,
    pub power_level: u8,
    /// Accumulated war-victory and trade rewards. Survives recomputation.
    pub bonus_power: f64,
    /// Power was forced by an operator; the periodic sweep leaves it alone.
    pub admin_override: bool,
    pub claimed_chunks: BTreeSet<ChunkCoordinate>,
    /// Territory taken from another nation by conquest.
    pub annexed_chunks: BTreeSet<ChunkCoordinate>,
    pub alliance_ids: BTreeSet<NationId>,
    pub war_ids: BTreeSet<WarId>,
    pub president_id: PlayerId,
    pub senator_ids: BTreeSet<PlayerId>,
    pub soldier_ids: BTreeSet<PlayerId>,
    pub citizen_ids: BTreeSet<PlayerId>,
    pub last_victory_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every persisted change; the store ignores older revisions.
    pub revision: u64,
}

impl Nation {
    pub fn found(id: NationId, name: String, president_id: PlayerId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            power: BASE_POWER,
            power_level: power_level_for(BASE_POWER),
            bonus_power: 0.0,
            admin_override: false,
            claimed_chunks: BTreeSet::new(),
            annexed_chunks: BTreeSet::new(),
            alliance_ids: BTreeSet::new(),
            war_ids: BTreeSet::new(),
            president_id,
            senator_ids: BTreeSet::new(),
            soldier_ids: BTreeSet::new(),
            citizen_ids: BTreeSet::new(),
            last_victory_at: None,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    pub fn role_of(&self, player: PlayerId) -> Option<Role> {
        if self.president_id == player {
            Some(Role::President)
        } else if self.senator_ids.contains(&player) {
            Some(Role::Senator)
        } else if self.soldier_ids.contains(&player) {
            Some(Role::Soldier)
        } else if self.citizen_ids.contains(&player) {
            Some(Role::Citizen)
        } else {
            None
        }
    }

    pub fn is_officer(&self, player: PlayerId) -> bool {
        self.role_of(player).is_some_and(Role::is_officer)
    }

    /// President first, then senators, soldiers and citizens.
    pub fn member_ids(&self) -> impl Iterator<Item = PlayerId> + '_ {
        std::iter::once(self.president_id)
            .chain(self.senator_ids.iter().copied())
            .chain(self.soldier_ids.iter().copied())
            .chain(self.citizen_ids.iter().copied())
    }

    pub fn member_count(&self) -> usize {
        1 + self.senator_ids.len() + self.soldier_ids.len() + self.citizen_ids.len()
    }

    pub fn officer_ids(&self) -> Vec<PlayerId> {
        std::iter::once(self.president_id)
            .chain(self.senator_ids.iter().copied())
            .collect()
    }

    /// Place `player` in exactly one non-president role set.
    ///
    /// Assigning `President` replaces the current president; the caller is
    /// responsible for giving the previous president a new role.
    pub fn assign(&mut self, player: PlayerId, role: Role) {
        self.remove_from_sets(player);
        match role {
            Role::President => self.president_id = player,
            Role::Senator => {
                self.senator_ids.insert(player);
            }
            Role::Soldier => {
                self.soldier_ids.insert(player);
            }
            Role::Citizen => {
                self.citizen_ids.insert(player);
            }
        }
    }

    /// Remove a non-president member. Returns the role they held.
    pub fn remove_member(&mut self, player: PlayerId) -> Option<Role> {
        let role = self.role_of(player)?;
        if role == Role::President {
            return None;
        }
        self.remove_from_sets(player);
        Some(role)
    }

    fn remove_from_sets(&mut self, player: PlayerId) {
        self.senator_ids.remove(&player);
        self.soldier_ids.remove(&player);
        self.citizen_ids.remove(&player);
    }

    pub fn owns(&self, coord: &ChunkCoordinate) -> bool {
        self.claimed_chunks.contains(coord) || self.annexed_chunks.contains(coord)
    }

    pub fn owned_chunks(&self) -> impl Iterator<Item = &ChunkCoordinate> {
        self.claimed_chunks.iter().chain(self.annexed_chunks.iter())
    }

    /// Set power and re-derive the level. Returns true if either changed
    /// by more than `epsilon`.
    pub fn set_power(&mut self, power: f64, epsilon: f64) -> bool {
        let power = power.clamp(0.0, MAX_POWER);
        let level = power_level_for(power);
        let changed = (power - self.power).abs() > epsilon || level != self.power_level;
        if changed {
            self.power = power;
            self.power_level = level;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rome() -> Nation {
        Nation::found(NationId(1), "Rome".into(), PlayerId(10), Utc::now())
    }

    #[test]
    fn founding_defaults() {
        let n = rome();
        assert_eq!(n.power, 1.0);
        assert_eq!(n.power_level, 1);
        assert_eq!(n.member_count(), 1);
        assert_eq!(n.role_of(PlayerId(10)), Some(Role::President));
    }

    #[test]
    fn level_thresholds() {
        assert_eq!(power_level_for(0.0), 1);
        assert_eq!(power_level_for(0.99), 1);
        assert_eq!(power_level_for(1.0), 1);
        assert_eq!(power_level_for(1.99), 1);
        assert_eq!(power_level_for(2.0), 2);
        assert_eq!(power_level_for(5.5), 5);
        assert_eq!(power_level_for(6.0), 6);
        assert_eq!(power_level_for(40.0), 6);
        assert_eq!(power_level_for(f64::NAN), 1);
    }

    #[test]
    fn assign_keeps_roles_exclusive() {
        let mut n = rome();
        n.assign(PlayerId(2), Role::Citizen);
        n.assign(PlayerId(2), Role::Soldier);
        n.assign(PlayerId(2), Role::Senator);
        assert_eq!(n.role_of(PlayerId(2)), Some(Role::Senator));
        assert!(!n.citizen_ids.contains(&PlayerId(2)));
        assert!(!n.soldier_ids.contains(&PlayerId(2)));
        assert_eq!(n.member_count(), 2);
    }

    #[test]
    fn president_cannot_be_removed() {
        let mut n = rome();
        assert_eq!(n.remove_member(PlayerId(10)), None);
        assert_eq!(n.role_of(PlayerId(10)), Some(Role::President));
    }

    #[test]
    fn set_power_ignores_tiny_changes() {
        let mut n = rome();
        assert!(!n.set_power(1.0 + 1e-9, 1e-6));
        assert!(n.set_power(2.5, 1e-6));
        assert_eq!(n.power_level, 2);
        assert!(n.set_power(99.0, 1e-6));
        assert_eq!(n.power, MAX_POWER);
    }
}
