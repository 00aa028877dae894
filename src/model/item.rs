use serde::{Deserialize, Serialize};

/// An opaque stackable item record. The engine only ever looks at `quantity`;
/// `key` is whatever the vault collaborator uses to identify the item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub key: String,
    pub quantity: u32,
}

impl ItemStack {
    pub fn new(key: impl Into<String>, quantity: u32) -> Self {
        Self {
            key: key.into(),
            quantity,
        }
    }
}

/// Total quantity across a batch of stacks.
pub fn total_quantity(items: &[ItemStack]) -> u64 {
    items.iter().map(|i| u64::from(i.quantity)).sum()
}
