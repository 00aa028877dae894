//! War state machine.
//!
//! ```text
//! Active ──kills reach threshold / decapitation / operator end──▶ Ended
//!    └────────────────────operator cancel / disband──────────────▶ Cancelled
//! ```
//!
//! Only active wars are held in memory. Ended and cancelled wars are handed
//! to the store once and then forgotten, except for the most recent ids, so
//! a late end-transition can still be told apart from a war that never
//! existed.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{InvariantViolation, WarError};
use crate::id::IdGenerator;
use crate::model::{NationId, PlayerId, War, WarId, WarSide, WarStatus, pair_key};
use crate::power;
use crate::registry::NationRegistry;
use crate::trade::TradeBook;

/// What happened when a kill was recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct KillOutcome {
    pub war_id: WarId,
    pub side: WarSide,
    pub kills: u32,
    pub required_kills: u32,
    /// Lives the victim has left, if they were a soldier.
    pub victim_lives: Option<u32>,
    /// Set when this kill ended the war.
    pub ended: Option<WarEnded>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WarEnded {
    pub war_id: WarId,
    pub winner_id: NationId,
    pub loser_id: NationId,
    /// False when the winner is still inside its victory cooldown.
    pub bonus_awarded: bool,
}

/// How many concluded war ids are remembered.
pub const CONCLUDED_MEMORY: usize = 1024;

/// Bounded memory of concluded war ids; the oldest is forgotten first.
#[derive(Debug, Default)]
struct Concluded {
    order: VecDeque<WarId>,
    ids: HashSet<WarId>,
}

impl Concluded {
    fn insert(&mut self, id: WarId) {
        if !self.ids.insert(id) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > CONCLUDED_MEMORY {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    fn contains(&self, id: &WarId) -> bool {
        self.ids.contains(id)
    }
}

#[derive(Debug, Default)]
pub struct WarBoard {
    active: BTreeMap<WarId, War>,
    by_pair: HashMap<(NationId, NationId), WarId>,
    /// Wars that recently left the active index.
    concluded: Concluded,
    dirty: BTreeSet<WarId>,
    retired: Vec<War>,
}

impl WarBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from stored active wars. A second active war for the same
    /// pair is an invariant violation; it is cancelled.
    pub fn restore(wars: Vec<War>) -> Self {
        let mut board = Self::new();
        for war in wars {
            if !war.is_active() {
                continue;
            }
            if let Some(existing) = board.by_pair.get(&war.pair()) {
                InvariantViolation::report(format!(
                    "{} duplicates active {existing} for the same pair",
                    war.id
                ));
                let mut dup = war;
                dup.status = WarStatus::Cancelled;
                board.concluded.insert(dup.id);
                board.retired.push(dup);
                continue;
            }
            board.by_pair.insert(war.pair(), war.id);
            board.active.insert(war.id, war);
        }
        board
    }

    pub fn get(&self, id: WarId) -> Option<&War> {
        self.active.get(&id)
    }

    pub fn active(&self) -> impl Iterator<Item = &War> {
        self.active.values()
    }

    pub fn between(&self, a: NationId, b: NationId) -> Option<&War> {
        self.by_pair
            .get(&pair_key(a, b))
            .and_then(|id| self.active.get(id))
    }

    /// Symmetric by construction.
    pub fn is_at_war(&self, a: NationId, b: NationId) -> bool {
        self.between(a, b).is_some()
    }

    pub fn wars_of(&self, nation: NationId) -> Vec<WarId> {
        self.active
            .values()
            .filter(|w| w.involves(nation))
            .map(|w| w.id)
            .collect()
    }

    /// Declare war on `target` on behalf of the requester's nation.
    ///
    /// `required_kills` is fixed now from the defender's power level.
    pub fn declare(
        &mut self,
        registry: &mut NationRegistry,
        ids: &mut IdGenerator,
        config: &EngineConfig,
        requester: PlayerId,
        target: NationId,
        now: DateTime<Utc>,
    ) -> Result<&War, WarError> {
        let attacker = registry
            .nation_of(requester)
            .ok_or(WarError::NotInNation(requester))?;
        if attacker.president_id != requester {
            return Err(WarError::NotPresident);
        }
        let attacker_id = attacker.id;
        if attacker_id == target {
            return Err(WarError::SameNation);
        }
        let defender = registry.get(target).ok_or(WarError::NoSuchNation(target))?;
        if attacker.alliance_ids.contains(&target) {
            return Err(WarError::Allied);
        }
        if self.is_at_war(attacker_id, target) {
            return Err(WarError::AlreadyAtWar);
        }

        let id = WarId(ids.next_id());
        let war = War {
            id,
            attacker_id,
            defender_id: target,
            attacker_kills: 0,
            defender_kills: 0,
            required_kills: u32::from(defender.power_level) * config.kills_per_level,
            status: WarStatus::Active,
            winner_id: None,
            started_at: now,
            ended_at: None,
            revision: 0,
        };
        for side in [attacker_id, target] {
            if let Some(nation) = registry.nation_mut(side) {
                nation.war_ids.insert(id);
            }
        }
        info!(war = %id, attacker = %attacker_id, defender = %target, required = war.required_kills, "war declared");
        self.by_pair.insert(war.pair(), id);
        self.dirty.insert(id);
        Ok(self.active.entry(id).or_insert(war))
    }

    /// Record `killer` killing `victim`.
    ///
    /// Fails with `NoActiveWar` unless both players belong to nations that
    /// are at active war with each other. Everything from the increment to
    /// the win check happens under the caller's lock, so the first side to
    /// reach the threshold wins and later kills see no active war.
    #[allow(clippy::too_many_arguments)]
    pub fn record_kill(
        &mut self,
        registry: &mut NationRegistry,
        trades: &TradeBook,
        config: &EngineConfig,
        killer: PlayerId,
        victim: PlayerId,
        now: DateTime<Utc>,
    ) -> Result<KillOutcome, WarError> {
        let killer_nation = registry
            .member(killer)
            .and_then(|m| m.nation_id)
            .ok_or(WarError::NoActiveWar)?;
        let victim_nation = registry
            .get(
                registry
                    .member(victim)
                    .and_then(|m| m.nation_id)
                    .ok_or(WarError::NoActiveWar)?,
            )
            .ok_or(WarError::NoActiveWar)?;
        let victim_nation_id = victim_nation.id;
        let victim_is_president = victim_nation.president_id == victim;
        let war_id = self
            .between(killer_nation, victim_nation_id)
            .map(|w| w.id)
            .ok_or(WarError::NoActiveWar)?;

        let Some(war) = self.active.get_mut(&war_id) else {
            return Err(WarError::NoActiveWar);
        };
        let Some(side) = war.side_of(killer_nation) else {
            return Err(InvariantViolation::report(format!(
                "{war_id} indexed for {killer_nation} but does not involve it"
            ))
            .into());
        };
        match side {
            WarSide::Attacker => war.attacker_kills += 1,
            WarSide::Defender => war.defender_kills += 1,
        }
        let kills = war.kills(side);
        let required_kills = war.required_kills;
        self.dirty.insert(war_id);
        debug!(war = %war_id, %killer, %victim, kills, required_kills, "kill recorded");

        let victim_lives = registry.spend_soldier_life(victim);

        let decapitated = config.decapitation && victim_is_president;
        let ended = if decapitated || kills >= required_kills {
            Some(self.end_war(registry, trades, config, war_id, killer_nation, now)?)
        } else {
            None
        };

        Ok(KillOutcome {
            war_id,
            side,
            kills,
            required_kills,
            victim_lives,
            ended,
        })
    }

    /// End an active war with `winner` victorious. The only path that sets
    /// a winner. Awards the victory bonus, subject to the weekly throttle.
    #[allow(clippy::too_many_arguments)]
    pub fn end_war(
        &mut self,
        registry: &mut NationRegistry,
        trades: &TradeBook,
        config: &EngineConfig,
        war_id: WarId,
        winner: NationId,
        now: DateTime<Utc>,
    ) -> Result<WarEnded, WarError> {
        let war = self.active.get(&war_id).ok_or_else(|| self.missing(war_id))?;
        let loser = match war.side_of(winner) {
            Some(WarSide::Attacker) => war.defender_id,
            Some(WarSide::Defender) => war.attacker_id,
            None => return Err(WarError::NoSuchNation(winner)),
        };

        let Some(mut war) = self.retire(war_id, registry, WarStatus::Ended, now) else {
            return Err(self.missing(war_id));
        };
        war.winner_id = Some(winner);
        self.retired.push(war);

        let bonus_awarded = match registry.nation_mut(winner) {
            Some(nation) => power::award_victory(nation, config, now, trades.all()),
            None => false,
        };
        info!(war = %war_id, %winner, %loser, bonus_awarded, "war ended");
        Ok(WarEnded {
            war_id,
            winner_id: winner,
            loser_id: loser,
            bonus_awarded,
        })
    }

    /// Operator cancel: no winner, no power change.
    pub fn cancel_war(
        &mut self,
        registry: &mut NationRegistry,
        war_id: WarId,
        now: DateTime<Utc>,
    ) -> Result<(), WarError> {
        let Some(war) = self.retire(war_id, registry, WarStatus::Cancelled, now) else {
            return Err(self.missing(war_id));
        };
        self.retired.push(war);
        info!(war = %war_id, "war cancelled");
        Ok(())
    }

    fn missing(&self, war_id: WarId) -> WarError {
        if self.concluded.contains(&war_id) {
            WarError::AlreadyEnded(war_id)
        } else {
            WarError::NoSuchWar(war_id)
        }
    }

    /// Pull a war out of the active index and both nations' war sets.
    fn retire(
        &mut self,
        war_id: WarId,
        registry: &mut NationRegistry,
        status: WarStatus,
        now: DateTime<Utc>,
    ) -> Option<War> {
        let mut war = self.active.remove(&war_id)?;
        self.by_pair.remove(&war.pair());
        self.dirty.remove(&war_id);
        self.concluded.insert(war_id);
        for side in [war.attacker_id, war.defender_id] {
            if let Some(nation) = registry.nation_mut(side) {
                nation.war_ids.remove(&war_id);
            }
        }
        war.status = status;
        war.ended_at = Some(now);
        Some(war)
    }

    pub(crate) fn drain_changes(&mut self) -> Vec<War> {
        let mut out = Vec::new();
        for id in std::mem::take(&mut self.dirty) {
            if let Some(war) = self.active.get_mut(&id) {
                war.revision += 1;
                out.push(war.clone());
            }
        }
        for mut war in std::mem::take(&mut self.retired) {
            war.revision += 1;
            out.push(war);
        }
        out
    }
}
