use tracing::debug;

use super::NationRegistry;
use crate::config::EngineConfig;
use crate::error::NationError;
use crate::model::{NationId, PlayerId, Role};

impl NationRegistry {
    fn require_officer(&self, nation_id: NationId, requester: PlayerId) -> Result<Role, NationError> {
        let nation = self
            .nations
            .get(&nation_id)
            .ok_or(NationError::NoSuchNation(nation_id))?;
        match nation.role_of(requester) {
            Some(role) if role.is_officer() => Ok(role),
            _ => Err(NationError::NotOfficer),
        }
    }

    /// Admit a nationless player as a citizen. Officer-only.
    pub fn admit(
        &mut self,
        nation_id: NationId,
        requester: PlayerId,
        player: PlayerId,
    ) -> Result<(), NationError> {
        self.require_officer(nation_id, requester)?;
        let member = self
            .members
            .get(&player)
            .ok_or(NationError::UnknownPlayer(player))?;
        if member.has_nation() {
            return Err(NationError::AlreadyInNation(player));
        }

        if let Some(nation) = self.nation_mut(nation_id) {
            nation.assign(player, Role::Citizen);
        }
        if let Some(member) = self.member_mut(player) {
            member.join(nation_id, Role::Citizen);
        }
        debug!(nation = %nation_id, %player, "member admitted");
        Ok(())
    }

    /// Leave the current nation. The president must hand over or disband.
    pub fn leave(&mut self, player: PlayerId) -> Result<NationId, NationError> {
        let member = self
            .members
            .get(&player)
            .ok_or(NationError::UnknownPlayer(player))?;
        let nation_id = member.nation_id.ok_or(NationError::NotInNation(player))?;
        if member.role == Some(Role::President) {
            return Err(NationError::PresidentCannotLeave);
        }
        self.detach(nation_id, player);
        debug!(nation = %nation_id, %player, "member left");
        Ok(nation_id)
    }

    /// Remove a member on an officer's authority. Only the president may
    /// remove a senator; nobody removes the president.
    pub fn kick(
        &mut self,
        nation_id: NationId,
        requester: PlayerId,
        target: PlayerId,
    ) -> Result<(), NationError> {
        let requester_role = self.require_officer(nation_id, requester)?;
        let target_role = self.nations[&nation_id]
            .role_of(target)
            .ok_or(NationError::NotMember(target))?;
        let allowed = match target_role {
            Role::President => false,
            Role::Senator => requester_role == Role::President,
            Role::Soldier | Role::Citizen => true,
        };
        if !allowed {
            return Err(NationError::NotPresident);
        }
        self.detach(nation_id, target);
        debug!(nation = %nation_id, %target, by = %requester, "member removed");
        Ok(())
    }

    /// Change a member's role.
    ///
    /// Senators are appointed and demoted by the president only. Officers may
    /// move members between soldier and citizen. Soldier appointments are
    /// capped per power level and start with that level's life count.
    pub fn set_role(
        &mut self,
        nation_id: NationId,
        requester: PlayerId,
        target: PlayerId,
        role: Role,
        config: &EngineConfig,
    ) -> Result<(), NationError> {
        if role == Role::President {
            return Err(NationError::RoleNotAssignable);
        }
        let requester_role = self.require_officer(nation_id, requester)?;
        let nation = &self.nations[&nation_id];
        let current = nation.role_of(target).ok_or(NationError::NotMember(target))?;
        if current == Role::President {
            return Err(NationError::RoleNotAssignable);
        }
        let touches_senate = role == Role::Senator || current == Role::Senator;
        if touches_senate && requester_role != Role::President {
            return Err(NationError::NotPresident);
        }
        if current == role {
            return Ok(());
        }
        if role == Role::Soldier {
            let quota = config.soldier_capacity(nation.power_level);
            if nation.soldier_ids.len() >= quota as usize {
                return Err(NationError::QuotaExceeded { quota });
            }
        }
        let lives = config.soldier_lives(nation.power_level);

        if let Some(nation) = self.nation_mut(nation_id) {
            nation.assign(target, role);
        }
        if let Some(member) = self.member_mut(target) {
            member.join(nation_id, role);
            if role == Role::Soldier {
                member.soldier_lives = lives;
            }
        }
        debug!(nation = %nation_id, %target, %role, "role changed");
        Ok(())
    }

    /// Hand the presidency to another member; the old president becomes a
    /// senator.
    pub fn transfer_presidency(
        &mut self,
        nation_id: NationId,
        requester: PlayerId,
        successor: PlayerId,
    ) -> Result<(), NationError> {
        let nation = self
            .nations
            .get(&nation_id)
            .ok_or(NationError::NoSuchNation(nation_id))?;
        if nation.president_id != requester {
            return Err(NationError::NotPresident);
        }
        if requester == successor {
            return Ok(());
        }
        if nation.role_of(successor).is_none() {
            return Err(NationError::NotMember(successor));
        }

        if let Some(nation) = self.nation_mut(nation_id) {
            nation.assign(successor, Role::President);
            nation.assign(requester, Role::Senator);
        }
        if let Some(member) = self.member_mut(successor) {
            member.join(nation_id, Role::President);
        }
        if let Some(member) = self.member_mut(requester) {
            member.join(nation_id, Role::Senator);
        }
        debug!(nation = %nation_id, from = %requester, to = %successor, "presidency transferred");
        Ok(())
    }

    /// Take one life from a soldier. A soldier with no lives left is demoted
    /// to citizen. Returns the remaining lives, or `None` if `player` is not
    /// a soldier.
    pub(crate) fn spend_soldier_life(&mut self, player: PlayerId) -> Option<u32> {
        let member = self.members.get(&player)?;
        if member.role != Some(Role::Soldier) {
            return None;
        }
        let nation_id = member.nation_id?;
        let remaining = member.soldier_lives.saturating_sub(1);
        if let Some(member) = self.member_mut(player) {
            member.soldier_lives = remaining;
            if remaining == 0 {
                member.join(nation_id, Role::Citizen);
            }
        }
        if remaining == 0 {
            if let Some(nation) = self.nation_mut(nation_id) {
                nation.assign(player, Role::Citizen);
            }
            debug!(nation = %nation_id, %player, "soldier out of lives, demoted");
        }
        Some(remaining)
    }

    fn detach(&mut self, nation_id: NationId, player: PlayerId) {
        if let Some(nation) = self.nation_mut(nation_id) {
            nation.remove_member(player);
        }
        if let Some(member) = self.member_mut(player) {
            member.clear_nation();
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::super::tests::registry_with;
    use super::*;

    #[test]
    fn admit_and_leave() {
        let (mut reg, mut ids) = registry_with(&[1, 2, 3]);
        let rome = reg.create(&mut ids, "Rome", PlayerId(1), Utc::now()).unwrap().id;
        assert_eq!(
            reg.admit(rome, PlayerId(3), PlayerId(2)).unwrap_err(),
            NationError::NotOfficer
        );
        reg.admit(rome, PlayerId(1), PlayerId(2)).unwrap();
        assert_eq!(reg.get(rome).unwrap().role_of(PlayerId(2)), Some(Role::Citizen));
        assert_eq!(reg.leave(PlayerId(2)).unwrap(), rome);
        assert_eq!(reg.member(PlayerId(2)).unwrap().nation_id, None);
        assert_eq!(reg.leave(PlayerId(1)).unwrap_err(), NationError::PresidentCannotLeave);
    }

    #[test]
    fn only_president_touches_the_senate() {
        let cfg = EngineConfig::default();
        let (mut reg, mut ids) = registry_with(&[1, 2, 3]);
        let rome = reg.create(&mut ids, "Rome", PlayerId(1), Utc::now()).unwrap().id;
        reg.admit(rome, PlayerId(1), PlayerId(2)).unwrap();
        reg.admit(rome, PlayerId(1), PlayerId(3)).unwrap();
        reg.set_role(rome, PlayerId(1), PlayerId(2), Role::Senator, &cfg)
            .unwrap();
        assert_eq!(
            reg.set_role(rome, PlayerId(2), PlayerId(3), Role::Senator, &cfg)
                .unwrap_err(),
            NationError::NotPresident
        );
        reg.set_role(rome, PlayerId(2), PlayerId(3), Role::Soldier, &cfg)
            .unwrap();
        let member = reg.member(PlayerId(3)).unwrap();
        assert_eq!(member.role, Some(Role::Soldier));
        assert_eq!(member.soldier_lives, cfg.soldier_lives(1));
        assert_eq!(
            reg.set_role(rome, PlayerId(1), PlayerId(3), Role::President, &cfg)
                .unwrap_err(),
            NationError::RoleNotAssignable
        );
    }

    #[test]
    fn soldier_capacity_is_enforced() {
        let cfg = EngineConfig {
            soldiers_per_level: [1, 1, 1, 1, 1, 1],
            ..EngineConfig::default()
        };
        let (mut reg, mut ids) = registry_with(&[1, 2, 3]);
        let rome = reg.create(&mut ids, "Rome", PlayerId(1), Utc::now()).unwrap().id;
        reg.admit(rome, PlayerId(1), PlayerId(2)).unwrap();
        reg.admit(rome, PlayerId(1), PlayerId(3)).unwrap();
        reg.set_role(rome, PlayerId(1), PlayerId(2), Role::Soldier, &cfg)
            .unwrap();
        assert_eq!(
            reg.set_role(rome, PlayerId(1), PlayerId(3), Role::Soldier, &cfg)
                .unwrap_err(),
            NationError::QuotaExceeded { quota: 1 }
        );
    }

    #[test]
    fn kick_rules() {
        let cfg = EngineConfig::default();
        let (mut reg, mut ids) = registry_with(&[1, 2, 3, 4]);
        let rome = reg.create(&mut ids, "Rome", PlayerId(1), Utc::now()).unwrap().id;
        for p in [2, 3, 4] {
            reg.admit(rome, PlayerId(1), PlayerId(p)).unwrap();
        }
        reg.set_role(rome, PlayerId(1), PlayerId(2), Role::Senator, &cfg)
            .unwrap();
        reg.set_role(rome, PlayerId(1), PlayerId(3), Role::Senator, &cfg)
            .unwrap();
        assert_eq!(
            reg.kick(rome, PlayerId(2), PlayerId(3)).unwrap_err(),
            NationError::NotPresident
        );
        reg.kick(rome, PlayerId(2), PlayerId(4)).unwrap();
        reg.kick(rome, PlayerId(1), PlayerId(3)).unwrap();
        assert_eq!(reg.get(rome).unwrap().member_count(), 2);
        assert_eq!(
            reg.kick(rome, PlayerId(2), PlayerId(1)).unwrap_err(),
            NationError::NotPresident
        );
    }

    #[test]
    fn presidency_transfer_swaps_roles() {
        let (mut reg, mut ids) = registry_with(&[1, 2]);
        let rome = reg.create(&mut ids, "Rome", PlayerId(1), Utc::now()).unwrap().id;
        reg.admit(rome, PlayerId(1), PlayerId(2)).unwrap();
        reg.transfer_presidency(rome, PlayerId(1), PlayerId(2)).unwrap();
        let nation = reg.get(rome).unwrap();
        assert_eq!(nation.president_id, PlayerId(2));
        assert_eq!(nation.role_of(PlayerId(1)), Some(Role::Senator));
        assert_eq!(nation.member_count(), 2);
        assert_eq!(reg.member(PlayerId(2)).unwrap().role, Some(Role::President));
    }

    #[test]
    fn soldier_demoted_when_out_of_lives() {
        let cfg = EngineConfig {
            soldier_lives_per_level: [1, 1, 1, 1, 1, 1],
            ..EngineConfig::default()
        };
        let (mut reg, mut ids) = registry_with(&[1, 2]);
        let rome = reg.create(&mut ids, "Rome", PlayerId(1), Utc::now()).unwrap().id;
        reg.admit(rome, PlayerId(1), PlayerId(2)).unwrap();
        reg.set_role(rome, PlayerId(1), PlayerId(2), Role::Soldier, &cfg)
            .unwrap();
        assert_eq!(reg.spend_soldier_life(PlayerId(2)), Some(0));
        assert_eq!(reg.get(rome).unwrap().role_of(PlayerId(2)), Some(Role::Citizen));
        assert_eq!(reg.spend_soldier_life(PlayerId(2)), None);
    }
}
