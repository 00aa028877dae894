use serde::{Deserialize, Serialize};

/// A member's position inside their nation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Role {
    President,
    Senator,
    Soldier,
    Citizen,
}

string_enum!(Role {
    President => "president",
    Senator => "senator",
    Soldier => "soldier",
    Citizen => "citizen",
});

impl Role {
    /// Officers may act on behalf of the nation (alliances, trades, admissions).
    pub fn is_officer(self) -> bool {
        matches!(self, Role::President | Role::Senator)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum WarStatus {
    Active,
    Ended,
    Cancelled,
}

string_enum!(WarStatus {
    Active => "active",
    Ended => "ended",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum TradeStatus {
    Pending,
    Active,
    Completed,
    Failed,
    Cancelled,
}

string_enum!(TradeStatus {
    Pending => "pending",
    Active => "active",
    Completed => "completed",
    Failed => "failed",
    Cancelled => "cancelled",
});

impl TradeStatus {
    /// Pending and Active trades are scheduled; every other status is terminal.
    pub fn is_live(self) -> bool {
        matches!(self, TradeStatus::Pending | TradeStatus::Active)
    }
}

/// Which party staged a batch of trade goods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum TradeSide {
    /// Goods staged by the sending nation for the receiver.
    Outbound,
    /// Goods staged by the receiving nation in exchange.
    Return,
}

string_enum!(TradeSide {
    Outbound => "outbound",
    Return => "return",
});
