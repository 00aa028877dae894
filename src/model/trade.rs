use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{NationId, TradeId};
use super::kinds::TradeStatus;

/// A recurring goods exchange from `sending_id` to `receiving_id`.
///
/// `next_execution_at` is `Some` exactly while the status is live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub sending_id: NationId,
    pub receiving_id: NationId,
    pub status: TradeStatus,
    pub consecutive_fulfillments: u32,
    pub total_executions: u32,
    pub max_executions: Option<u32>,
    /// Goods moved since the last power reward.
    pub volume_since_reward: u64,
    pub interval_minutes: u32,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub next_execution_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub revision: u64,
}

impl Trade {
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.status.is_live() && self.next_execution_at.is_some_and(|next| now >= next)
    }

    pub fn involves(&self, nation: NationId) -> bool {
        self.sending_id == nation || self.receiving_id == nation
    }

    /// Move to a terminal status and drop the schedule.
    pub fn close(&mut self, status: TradeStatus) {
        debug_assert!(!status.is_live());
        self.status = status;
        self.next_execution_at = None;
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn trade(now: DateTime<Utc>) -> Trade {
        Trade {
            id: TradeId(1),
            sending_id: NationId(1),
            receiving_id: NationId(2),
            status: TradeStatus::Pending,
            consecutive_fulfillments: 0,
            total_executions: 0,
            max_executions: None,
            volume_since_reward: 0,
            interval_minutes: 3,
            last_executed_at: None,
            next_execution_at: Some(now + Duration::minutes(60)),
            created_at: now,
            revision: 0,
        }
    }

    #[test]
    fn ready_only_once_due() {
        let now = Utc::now();
        let t = trade(now);
        assert!(!t.is_ready(now));
        assert!(t.is_ready(now + Duration::minutes(60)));
    }

    #[test]
    fn closed_trade_is_never_ready() {
        let now = Utc::now();
        let mut t = trade(now);
        t.close(TradeStatus::Cancelled);
        assert!(t.next_execution_at.is_none());
        assert!(!t.is_ready(now + Duration::days(1)));
    }
}
