//! Trade scheduler.
//!
//! A trade moves staged goods from the sender's trade post to the receiver
//! every `interval_minutes` (scaled to real time). Only Pending and Active
//! trades are held here; a trade that reaches a terminal status is handed to
//! the store once and dropped from the index.

mod markers;
mod vault;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{InvariantViolation, TradeError};
use crate::id::IdGenerator;
use crate::model::{NationId, PlayerId, Trade, TradeId, TradeSide, TradeStatus, item};
use crate::power;
use crate::registry::NationRegistry;
use crate::war::WarBoard;

pub use markers::{MarkerIndex, MarkerSink, MarkerTarget, NullMarkers};
pub use vault::{DEFAULT_VAULT_SLOTS, MemoryVault, OverflowEntry, Vault};

/// Parameters for a new trade.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeTerms {
    pub sending_id: NationId,
    pub receiving_id: NationId,
    pub interval_minutes: u32,
    pub max_executions: Option<u32>,
}

/// Result of one execution attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    /// The trade is not scheduled yet.
    NotDue,
    /// Nothing was staged on the outbound side; retried next sweep.
    Idle,
    Delivered {
        /// Item count moved in both directions.
        volume: u64,
        /// Power granted to each side, if the fulfillment threshold was hit.
        reward: Option<f64>,
        /// The execution cap was reached and the trade is now Completed.
        completed: bool,
    },
}

#[derive(Debug, Default)]
pub struct TradeBook {
    live: BTreeMap<TradeId, Trade>,
    dirty: BTreeSet<TradeId>,
    retired: Vec<Trade>,
}

impl TradeBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from stored trades, keeping only live ones.
    pub fn restore(trades: Vec<Trade>) -> Self {
        let mut book = Self::new();
        for trade in trades.into_iter().filter(|t| t.status.is_live()) {
            if trade.next_execution_at.is_none() {
                InvariantViolation::report(format!("{} is live without a schedule", trade.id));
            }
            book.live.insert(trade.id, trade);
        }
        book
    }

    pub fn get(&self, id: TradeId) -> Option<&Trade> {
        self.live.get(&id)
    }

    pub fn all(&self) -> impl Iterator<Item = &Trade> {
        self.live.values()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn list_for(&self, nation: NationId) -> Vec<&Trade> {
        self.live.values().filter(|t| t.involves(nation)).collect()
    }

    /// Trades whose next execution is due at `now`, oldest id first.
    pub fn ready(&self, now: DateTime<Utc>) -> Vec<TradeId> {
        self.live
            .values()
            .filter(|t| t.is_ready(now))
            .map(|t| t.id)
            .collect()
    }

    /// Open a trade on behalf of an officer of the sending nation. The
    /// interval is clamped into the configured bounds.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &mut self,
        registry: &NationRegistry,
        wars: &WarBoard,
        ids: &mut IdGenerator,
        config: &EngineConfig,
        requester: PlayerId,
        terms: TradeTerms,
        now: DateTime<Utc>,
    ) -> Result<&Trade, TradeError> {
        let sender = registry
            .get(terms.sending_id)
            .ok_or(TradeError::NoSuchNation(terms.sending_id))?;
        if !sender.is_officer(requester) {
            return Err(TradeError::NotOfficer);
        }
        if terms.sending_id == terms.receiving_id {
            return Err(TradeError::SameNation);
        }
        if registry.get(terms.receiving_id).is_none() {
            return Err(TradeError::NoSuchNation(terms.receiving_id));
        }
        if wars.is_at_war(terms.sending_id, terms.receiving_id) {
            return Err(TradeError::AtWar);
        }

        let interval = config.clamp_interval(terms.interval_minutes);
        let id = TradeId(ids.next_id());
        let trade = Trade {
            id,
            sending_id: terms.sending_id,
            receiving_id: terms.receiving_id,
            status: TradeStatus::Pending,
            consecutive_fulfillments: 0,
            total_executions: 0,
            max_executions: terms.max_executions.filter(|m| *m > 0),
            volume_since_reward: 0,
            interval_minutes: interval,
            last_executed_at: None,
            next_execution_at: Some(now + config.trade_delay(interval)),
            created_at: now,
            revision: 0,
        };
        info!(
            trade = %id,
            from = %trade.sending_id,
            to = %trade.receiving_id,
            interval,
            "trade opened"
        );
        self.dirty.insert(id);
        Ok(self.live.entry(id).or_insert(trade))
    }

    /// Officer of either party cancels. Returns the closed trade.
    pub fn cancel(
        &mut self,
        registry: &NationRegistry,
        id: TradeId,
        requester: PlayerId,
    ) -> Result<Trade, TradeError> {
        let trade = self.live.get(&id).ok_or(TradeError::NotFound(id))?;
        let officer = [trade.sending_id, trade.receiving_id]
            .into_iter()
            .filter_map(|n| registry.get(n))
            .any(|n| n.is_officer(requester));
        if !officer {
            return Err(TradeError::NotOfficer);
        }
        let closed = self.close(id, TradeStatus::Cancelled);
        closed.ok_or(TradeError::NotFound(id))
    }

    /// Fail every live trade involving `nation`.
    pub fn fail_involving(&mut self, nation: NationId) -> Vec<Trade> {
        self.fail_where(|t| t.involves(nation))
    }

    /// Fail every live trade between `a` and `b`, in either direction.
    pub fn fail_between(&mut self, a: NationId, b: NationId) -> Vec<Trade> {
        self.fail_where(|t| t.involves(a) && t.involves(b))
    }

    fn fail_where(&mut self, pred: impl Fn(&Trade) -> bool) -> Vec<Trade> {
        let ids: Vec<TradeId> = self
            .live
            .values()
            .filter(|t| pred(t))
            .map(|t| t.id)
            .collect();
        ids.into_iter()
            .filter_map(|id| self.close(id, TradeStatus::Failed))
            .collect()
    }

    fn close(&mut self, id: TradeId, status: TradeStatus) -> Option<Trade> {
        let mut trade = self.live.remove(&id)?;
        trade.close(status);
        self.dirty.remove(&id);
        info!(trade = %id, %status, "trade closed");
        self.retired.push(trade.clone());
        Some(trade)
    }

    /// Attempt one execution of a ready trade.
    ///
    /// An empty outbound stage is a no-op: nothing on the trade changes and
    /// the sweep tries again next time. A Completed trade is returned in
    /// `closed` for teardown.
    pub fn execute(
        &mut self,
        registry: &mut NationRegistry,
        vault: &dyn Vault,
        config: &EngineConfig,
        id: TradeId,
        now: DateTime<Utc>,
    ) -> Result<(Execution, Option<Trade>), TradeError> {
        let trade = self.live.get(&id).ok_or(TradeError::NotFound(id))?;
        if !trade.is_ready(now) {
            return Ok((Execution::NotDue, None));
        }
        let (sender, receiver) = (trade.sending_id, trade.receiving_id);
        for nation in [sender, receiver] {
            if registry.get(nation).is_none() {
                return Err(InvariantViolation::report(format!(
                    "{id} references missing {nation}"
                ))
                .into());
            }
        }

        let outbound = vault.stage_read(id, TradeSide::Outbound);
        if outbound.is_empty() {
            debug!(trade = %id, "nothing staged, skipping");
            return Ok((Execution::Idle, None));
        }
        let returned = vault.stage_read(id, TradeSide::Return);
        let volume = item::total_quantity(&outbound) + item::total_quantity(&returned);
        vault.deposit_overflow(receiver, outbound, config.overflow_expiry_minutes, now);
        if !returned.is_empty() {
            vault.deposit_overflow(sender, returned, config.overflow_expiry_minutes, now);
        }

        let Some(trade) = self.live.get_mut(&id) else {
            return Err(TradeError::NotFound(id));
        };
        if trade.status == TradeStatus::Pending {
            trade.status = TradeStatus::Active;
        }
        trade.consecutive_fulfillments += 1;
        trade.total_executions += 1;
        trade.volume_since_reward += volume;
        trade.last_executed_at = Some(now);
        trade.next_execution_at = Some(now + config.trade_delay(trade.interval_minutes));
        self.dirty.insert(id);

        let reward = if trade.consecutive_fulfillments >= config.trade_fulfillment_threshold {
            let amount = power::trade_reward(config, trade.volume_since_reward);
            trade.consecutive_fulfillments = 0;
            trade.volume_since_reward = 0;
            Some(amount)
        } else {
            None
        };
        let completed = trade
            .max_executions
            .is_some_and(|max| trade.total_executions >= max);
        debug!(trade = %id, volume, fulfillments = trade.consecutive_fulfillments, "trade executed");

        if let Some(amount) = reward {
            for nation in [sender, receiver] {
                if let Some(n) = registry.nation_mut(nation) {
                    power::add_bonus(n, amount, self.live.values());
                }
            }
            info!(trade = %id, amount, "trade reward granted");
        }
        let closed = if completed {
            self.close(id, TradeStatus::Completed)
        } else {
            None
        };

        Ok((
            Execution::Delivered {
                volume,
                reward,
                completed,
            },
            closed,
        ))
    }

    pub(crate) fn drain_changes(&mut self) -> Vec<Trade> {
        let mut out = Vec::new();
        for id in std::mem::take(&mut self.dirty) {
            if let Some(trade) = self.live.get_mut(&id) {
                trade.revision += 1;
                out.push(trade.clone());
            }
        }
        for mut trade in std::mem::take(&mut self.retired) {
            trade.revision += 1;
            out.push(trade);
        }
        out
    }
}
