//! Alliance handshake.
//!
//! Requests live only in memory. The alliance itself is the symmetric pair
//! of `alliance_ids` entries on the two nation records.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::error::{AllianceError, InvariantViolation};
use crate::model::{NationId, PlayerId};
use crate::registry::NationRegistry;
use crate::war::WarBoard;

/// A request was filed; `notify` are the receiver's officers.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub sender: NationId,
    pub receiver: NationId,
    pub notify: Vec<PlayerId>,
}

#[derive(Debug, Default)]
pub struct AllianceDesk {
    /// receiver → proposers
    pending: HashMap<NationId, BTreeSet<NationId>>,
}

fn require_officer(
    registry: &NationRegistry,
    nation: NationId,
    requester: PlayerId,
) -> Result<(), AllianceError> {
    let nation = registry
        .get(nation)
        .ok_or(AllianceError::NoSuchNation(nation))?;
    if nation.is_officer(requester) {
        Ok(())
    } else {
        Err(AllianceError::NotOfficer)
    }
}

impl AllianceDesk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_for(&self, receiver: NationId) -> Vec<NationId> {
        self.pending
            .get(&receiver)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_pending(&self, sender: NationId, receiver: NationId) -> bool {
        self.pending
            .get(&receiver)
            .is_some_and(|s| s.contains(&sender))
    }

    pub fn propose(
        &mut self,
        registry: &NationRegistry,
        wars: &WarBoard,
        sender: NationId,
        receiver: NationId,
        requester: PlayerId,
    ) -> Result<Proposal, AllianceError> {
        require_officer(registry, sender, requester)?;
        if sender == receiver {
            return Err(AllianceError::SameNation);
        }
        let target = registry
            .get(receiver)
            .ok_or(AllianceError::NoSuchNation(receiver))?;
        if target.alliance_ids.contains(&sender) {
            return Err(AllianceError::AlreadyAllied);
        }
        if wars.is_at_war(sender, receiver) {
            return Err(AllianceError::AtWar);
        }
        if !self.pending.entry(receiver).or_default().insert(sender) {
            return Err(AllianceError::AlreadyRequested);
        }
        debug!(%sender, %receiver, by = %requester, "alliance proposed");
        Ok(Proposal {
            sender,
            receiver,
            notify: target.officer_ids(),
        })
    }

    /// Accept `sender`'s pending request on behalf of `receiver`.
    pub fn accept(
        &mut self,
        registry: &mut NationRegistry,
        wars: &WarBoard,
        receiver: NationId,
        sender: NationId,
        requester: PlayerId,
    ) -> Result<(), AllianceError> {
        require_officer(registry, receiver, requester)?;
        if !self.is_pending(sender, receiver) {
            return Err(AllianceError::NoPendingRequest(sender));
        }
        if registry.get(sender).is_none() {
            self.take(sender, receiver);
            return Err(AllianceError::NoSuchNation(sender));
        }
        if wars.is_at_war(sender, receiver) {
            return Err(AllianceError::AtWar);
        }

        self.take(sender, receiver);
        for (a, b) in [(sender, receiver), (receiver, sender)] {
            if let Some(nation) = registry.nation_mut(a) {
                nation.alliance_ids.insert(b);
            }
        }
        debug!(%sender, %receiver, by = %requester, "alliance formed");
        Ok(())
    }

    pub fn deny(
        &mut self,
        registry: &NationRegistry,
        receiver: NationId,
        sender: NationId,
        requester: PlayerId,
    ) -> Result<(), AllianceError> {
        require_officer(registry, receiver, requester)?;
        if !self.take(sender, receiver) {
            return Err(AllianceError::NoPendingRequest(sender));
        }
        debug!(%sender, %receiver, by = %requester, "alliance denied");
        Ok(())
    }

    pub fn break_alliance(
        &mut self,
        registry: &mut NationRegistry,
        nation: NationId,
        ally: NationId,
        requester: PlayerId,
    ) -> Result<(), AllianceError> {
        require_officer(registry, nation, requester)?;
        let ours = registry
            .get(nation)
            .is_some_and(|n| n.alliance_ids.contains(&ally));
        let theirs = registry
            .get(ally)
            .is_some_and(|n| n.alliance_ids.contains(&nation));
        match (ours, theirs) {
            (false, false) => return Err(AllianceError::NotAllied),
            (true, true) => {}
            _ => {
                InvariantViolation::report(format!(
                    "one-sided alliance between {nation} and {ally}; clearing both sides"
                ));
            }
        }
        unlink(registry, nation, ally);
        debug!(%nation, %ally, by = %requester, "alliance broken");
        Ok(())
    }

    /// Drop every alliance and pending request involving a nation that is
    /// about to disband.
    pub(crate) fn forget(&mut self, registry: &mut NationRegistry, nation: NationId) {
        self.pending.remove(&nation);
        self.pending.retain(|_, proposers| {
            proposers.remove(&nation);
            !proposers.is_empty()
        });
        let allies: Vec<NationId> = registry
            .get(nation)
            .map(|n| n.alliance_ids.iter().copied().collect())
            .unwrap_or_default();
        for ally in allies {
            unlink(registry, nation, ally);
        }
    }

    fn take(&mut self, sender: NationId, receiver: NationId) -> bool {
        let Some(proposers) = self.pending.get_mut(&receiver) else {
            return false;
        };
        let removed = proposers.remove(&sender);
        if proposers.is_empty() {
            self.pending.remove(&receiver);
        }
        removed
    }
}

fn unlink(registry: &mut NationRegistry, a: NationId, b: NationId) {
    if let Some(nation) = registry.nation_mut(a) {
        nation.alliance_ids.remove(&b);
    }
    if let Some(nation) = registry.nation_mut(b) {
        nation.alliance_ids.remove(&a);
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::config::EngineConfig;
    use crate::id::IdGenerator;
    use crate::model::Role;

    struct Fixture {
        registry: NationRegistry,
        wars: WarBoard,
        desk: AllianceDesk,
        rome: NationId,
        gaul: NationId,
    }

    /// Rome (president 1, senator 3), Gaul (president 2, citizen 4).
    fn fixture() -> Fixture {
        let mut registry = NationRegistry::new();
        for p in 1..=4 {
            registry.register_member(PlayerId(p), &format!("p{p}"));
        }
        let mut ids = IdGenerator::new();
        let now = Utc::now();
        let rome = registry.create(&mut ids, "Rome", PlayerId(1), now).unwrap().id;
        let gaul = registry.create(&mut ids, "Gaul", PlayerId(2), now).unwrap().id;
        registry.admit(rome, PlayerId(1), PlayerId(3)).unwrap();
        registry
            .set_role(rome, PlayerId(1), PlayerId(3), Role::Senator, &EngineConfig::default())
            .unwrap();
        registry.admit(gaul, PlayerId(2), PlayerId(4)).unwrap();
        Fixture {
            registry,
            wars: WarBoard::new(),
            desk: AllianceDesk::new(),
            rome,
            gaul,
        }
    }

    fn allied(reg: &NationRegistry, a: NationId, b: NationId) -> (bool, bool) {
        (
            reg.get(a).unwrap().alliance_ids.contains(&b),
            reg.get(b).unwrap().alliance_ids.contains(&a),
        )
    }

    #[test]
    fn handshake_is_symmetric() {
        let mut f = fixture();
        let proposal = f
            .desk
            .propose(&f.registry, &f.wars, f.rome, f.gaul, PlayerId(3))
            .unwrap();
        assert_eq!(proposal.notify, vec![PlayerId(2)]);
        assert_eq!(f.desk.pending_for(f.gaul), vec![f.rome]);
        assert_eq!(
            f.desk
                .propose(&f.registry, &f.wars, f.rome, f.gaul, PlayerId(1))
                .unwrap_err(),
            AllianceError::AlreadyRequested
        );

        assert_eq!(
            f.desk
                .accept(&mut f.registry, &f.wars, f.gaul, f.rome, PlayerId(4))
                .unwrap_err(),
            AllianceError::NotOfficer
        );
        f.desk
            .accept(&mut f.registry, &f.wars, f.gaul, f.rome, PlayerId(2))
            .unwrap();
        assert_eq!(allied(&f.registry, f.rome, f.gaul), (true, true));
        assert!(f.desk.pending_for(f.gaul).is_empty());
        assert_eq!(
            f.desk
                .propose(&f.registry, &f.wars, f.gaul, f.rome, PlayerId(2))
                .unwrap_err(),
            AllianceError::AlreadyAllied
        );

        f.desk
            .break_alliance(&mut f.registry, f.gaul, f.rome, PlayerId(2))
            .unwrap();
        assert_eq!(allied(&f.registry, f.rome, f.gaul), (false, false));
        assert_eq!(
            f.desk
                .break_alliance(&mut f.registry, f.gaul, f.rome, PlayerId(2))
                .unwrap_err(),
            AllianceError::NotAllied
        );
    }

    #[test]
    fn deny_leaves_alliances_untouched() {
        let mut f = fixture();
        f.desk
            .propose(&f.registry, &f.wars, f.rome, f.gaul, PlayerId(1))
            .unwrap();
        f.desk.deny(&f.registry, f.gaul, f.rome, PlayerId(2)).unwrap();
        assert_eq!(allied(&f.registry, f.rome, f.gaul), (false, false));
        assert_eq!(
            f.desk
                .accept(&mut f.registry, &f.wars, f.gaul, f.rome, PlayerId(2))
                .unwrap_err(),
            AllianceError::NoPendingRequest(f.rome)
        );
    }

    #[test]
    fn citizens_cannot_propose() {
        let mut f = fixture();
        assert_eq!(
            f.desk
                .propose(&f.registry, &f.wars, f.gaul, f.rome, PlayerId(4))
                .unwrap_err(),
            AllianceError::NotOfficer
        );
        assert_eq!(
            f.desk
                .propose(&f.registry, &f.wars, f.rome, f.rome, PlayerId(1))
                .unwrap_err(),
            AllianceError::SameNation
        );
    }

    #[test]
    fn forget_clears_requests_and_links() {
        let mut f = fixture();
        f.desk
            .propose(&f.registry, &f.wars, f.rome, f.gaul, PlayerId(1))
            .unwrap();
        f.desk
            .accept(&mut f.registry, &f.wars, f.gaul, f.rome, PlayerId(2))
            .unwrap();
        f.desk.forget(&mut f.registry, f.rome);
        assert_eq!(allied(&f.registry, f.rome, f.gaul), (false, false));

        f.desk
            .propose(&f.registry, &f.wars, f.rome, f.gaul, PlayerId(1))
            .unwrap();
        f.desk.forget(&mut f.registry, f.rome);
        assert!(f.desk.pending_for(f.gaul).is_empty());
    }
}
