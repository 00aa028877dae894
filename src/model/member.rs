use serde::{Deserialize, Serialize};

use super::ids::{NationId, PlayerId};
use super::kinds::Role;

/// A player's profile as seen by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: PlayerId,
    pub display_name: String,
    pub nation_id: Option<NationId>,
    pub role: Option<Role>,
    /// Only meaningful while `role == Some(Role::Soldier)`.
    pub soldier_lives: u32,
    pub revision: u64,
}

impl Member {
    pub fn new(id: PlayerId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            nation_id: None,
            role: None,
            soldier_lives: 0,
            revision: 0,
        }
    }

    pub fn has_nation(&self) -> bool {
        self.nation_id.is_some()
    }

    pub fn join(&mut self, nation: NationId, role: Role) {
        self.nation_id = Some(nation);
        self.role = Some(role);
        if role != Role::Soldier {
            self.soldier_lives = 0;
        }
    }

    pub fn clear_nation(&mut self) {
        self.nation_id = None;
        self.role = None;
        self.soldier_lives = 0;
    }
}
