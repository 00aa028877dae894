use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{NationId, WarId};
use super::kinds::WarStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarSide {
    Attacker,
    Defender,
}

/// A declared war between two nations.
///
/// `required_kills` is fixed at declaration from the defender's power level
/// and never recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct War {
    pub id: WarId,
    pub attacker_id: NationId,
    pub defender_id: NationId,
    pub attacker_kills: u32,
    pub defender_kills: u32,
    pub required_kills: u32,
    pub status: WarStatus,
    pub winner_id: Option<NationId>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub revision: u64,
}

impl War {
    pub fn is_active(&self) -> bool {
        self.status == WarStatus::Active
    }

    pub fn involves(&self, nation: NationId) -> bool {
        self.attacker_id == nation || self.defender_id == nation
    }

    pub fn side_of(&self, nation: NationId) -> Option<WarSide> {
        if nation == self.attacker_id {
            Some(WarSide::Attacker)
        } else if nation == self.defender_id {
            Some(WarSide::Defender)
        } else {
            None
        }
    }

    pub fn nation_on(&self, side: WarSide) -> NationId {
        match side {
            WarSide::Attacker => self.attacker_id,
            WarSide::Defender => self.defender_id,
        }
    }

    pub fn kills(&self, side: WarSide) -> u32 {
        match side {
            WarSide::Attacker => self.attacker_kills,
            WarSide::Defender => self.defender_kills,
        }
    }

    /// Unordered pair key: the same for (A, B) and (B, A).
    pub fn pair(&self) -> (NationId, NationId) {
        pair_key(self.attacker_id, self.defender_id)
    }
}

pub fn pair_key(a: NationId, b: NationId) -> (NationId, NationId) {
    if a <= b { (a, b) } else { (b, a) }
}
