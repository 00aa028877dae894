//! Power economy.
//!
//! A nation's power is a pure function of its composition plus the rewards
//! it has banked:
//!
//! ```text
//! power = min(6, 1 + membership + alliances + trades + bonus)
//! ```
//!
//! `bonus` accumulates war victories and trade-volume rewards so that the
//! periodic recomputation does not erase them.

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::model::nation::BASE_POWER;
use crate::model::{MAX_POWER, Nation, Trade, TradeStatus};

/// Changes smaller than this are not worth a store write.
pub const POWER_EPSILON: f64 = 1e-6;

const MEMBERS_PER_STEP: usize = 5;
const MEMBERSHIP_STEP: f64 = 0.1;
const ALLIANCE_STEP: f64 = 0.1;
const ALLIANCE_CAP: f64 = 1.5;
const FULFILLMENTS_PER_STEP: u32 = 3;
const TRADE_STEP: f64 = 0.05;
/// Token trades still earn this share of the nominal increment.
const MIN_VOLUME_SHARE: f64 = 0.1;

pub fn membership_bonus(member_count: usize) -> f64 {
    (member_count / MEMBERS_PER_STEP) as f64 * MEMBERSHIP_STEP
}

pub fn alliance_bonus(alliance_count: usize) -> f64 {
    (alliance_count as f64 * ALLIANCE_STEP).min(ALLIANCE_CAP)
}

/// Sum over the nation's Active trades.
pub fn trade_bonus<'a>(trades: impl IntoIterator<Item = &'a Trade>) -> f64 {
    trades
        .into_iter()
        .filter(|t| t.status == TradeStatus::Active)
        .map(|t| f64::from(t.consecutive_fulfillments / FULFILLMENTS_PER_STEP) * TRADE_STEP)
        .sum()
}

/// Recompute power for `nation` given the trades it takes part in.
pub fn compute_power<'a>(nation: &Nation, trades: impl IntoIterator<Item = &'a Trade>) -> f64 {
    let raw = BASE_POWER
        + membership_bonus(nation.member_count())
        + alliance_bonus(nation.alliance_ids.len())
        + trade_bonus(trades.into_iter().filter(|t| t.involves(nation.id)))
        + nation.bonus_power;
    raw.min(MAX_POWER)
}

/// Bank `amount` of bonus power. Returns true if the stored power changed.
///
/// An overridden nation keeps its forced power; the bonus shows once the
/// override is cleared.
pub fn add_bonus<'a>(
    nation: &mut Nation,
    amount: f64,
    trades: impl IntoIterator<Item = &'a Trade>,
) -> bool {
    nation.bonus_power = (nation.bonus_power + amount).clamp(0.0, MAX_POWER);
    if nation.admin_override {
        return false;
    }
    let power = compute_power(nation, trades);
    nation.set_power(power, POWER_EPSILON)
}

/// Whether `nation` may receive a victory bonus at `now`.
pub fn victory_allowed(nation: &Nation, config: &EngineConfig, now: DateTime<Utc>) -> bool {
    nation
        .last_victory_at
        .is_none_or(|last| now - last >= config.victory_cooldown())
}

/// Award the flat victory bonus, at most once per cooldown window.
/// Returns true if the bonus was granted.
pub fn award_victory<'a>(
    nation: &mut Nation,
    config: &EngineConfig,
    now: DateTime<Utc>,
    trades: impl IntoIterator<Item = &'a Trade>,
) -> bool {
    if !victory_allowed(nation, config, now) {
        return false;
    }
    nation.last_victory_at = Some(now);
    add_bonus(nation, config.victory_power_bonus, trades);
    true
}

/// Power granted to each side when a trade reaches its fulfillment
/// threshold, scaled by goods moved and floored at a tenth of the nominal
/// increment.
pub fn trade_reward(config: &EngineConfig, volume: u64) -> f64 {
    let share = (volume as f64 / f64::from(config.trade_max_volume)).clamp(MIN_VOLUME_SHARE, 1.0);
    config.trade_power_increment * share
}
