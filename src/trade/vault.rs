use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::model::{ItemStack, NationId, TradeId, TradeSide};

/// Item storage owned outside the engine.
///
/// The engine never looks inside an [`ItemStack`] beyond its quantity.
pub trait Vault: Send + Sync + fmt::Debug {
    /// Remove and return whatever is staged on one side of a trade.
    fn stage_read(&self, trade: TradeId, side: TradeSide) -> Vec<ItemStack>;

    /// Deliver items to a nation. Whatever does not fit in its storage is
    /// held in an overflow inbox until `now + expiry_minutes`.
    fn deposit_overflow(
        &self,
        nation: NationId,
        items: Vec<ItemStack>,
        expiry_minutes: u32,
        now: DateTime<Utc>,
    );

    fn tear_down_trade(&self, trade: TradeId);

    fn tear_down_nation(&self, nation: NationId);

    /// Drop expired overflow. Returns the number of stacks discarded.
    fn purge_expired(&self, now: DateTime<Utc>) -> usize;
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverflowEntry {
    pub items: Vec<ItemStack>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Contents {
    staged: HashMap<(TradeId, TradeSide), Vec<ItemStack>>,
    storage: HashMap<NationId, Vec<ItemStack>>,
    overflow: HashMap<NationId, Vec<OverflowEntry>>,
}

/// In-process vault with a fixed number of storage slots per nation.
#[derive(Debug)]
pub struct MemoryVault {
    slots: usize,
    inner: Mutex<Contents>,
}

/// A nation vault is a double chest.
pub const DEFAULT_VAULT_SLOTS: usize = 54;

impl Default for MemoryVault {
    fn default() -> Self {
        Self::with_slots(DEFAULT_VAULT_SLOTS)
    }
}

impl MemoryVault {
    pub fn with_slots(slots: usize) -> Self {
        Self {
            slots,
            inner: Mutex::new(Contents::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Contents> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Put items on one side of a trade, as a player would at a trade post.
    pub fn stage(&self, trade: TradeId, side: TradeSide, items: Vec<ItemStack>) {
        self.lock()
            .staged
            .entry((trade, side))
            .or_default()
            .extend(items);
    }

    pub fn staged(&self, trade: TradeId, side: TradeSide) -> Vec<ItemStack> {
        self.lock()
            .staged
            .get(&(trade, side))
            .cloned()
            .unwrap_or_default()
    }

    pub fn storage(&self, nation: NationId) -> Vec<ItemStack> {
        self.lock().storage.get(&nation).cloned().unwrap_or_default()
    }

    pub fn overflow(&self, nation: NationId) -> Vec<OverflowEntry> {
        self.lock().overflow.get(&nation).cloned().unwrap_or_default()
    }
}

impl Vault for MemoryVault {
    fn stage_read(&self, trade: TradeId, side: TradeSide) -> Vec<ItemStack> {
        self.lock().staged.remove(&(trade, side)).unwrap_or_default()
    }

    fn deposit_overflow(
        &self,
        nation: NationId,
        items: Vec<ItemStack>,
        expiry_minutes: u32,
        now: DateTime<Utc>,
    ) {
        let mut contents = self.lock();
        let storage = contents.storage.entry(nation).or_default();
        let room = self.slots.saturating_sub(storage.len());
        let mut items = items;
        let spill = if items.len() > room {
            items.split_off(room)
        } else {
            Vec::new()
        };
        storage.extend(items);
        if !spill.is_empty() {
            debug!(%nation, stacks = spill.len(), "vault full, items held in overflow");
            contents.overflow.entry(nation).or_default().push(OverflowEntry {
                items: spill,
                expires_at: now + Duration::minutes(i64::from(expiry_minutes)),
            });
        }
    }

    fn tear_down_trade(&self, trade: TradeId) {
        let mut contents = self.lock();
        contents.staged.remove(&(trade, TradeSide::Outbound));
        contents.staged.remove(&(trade, TradeSide::Return));
    }

    fn tear_down_nation(&self, nation: NationId) {
        let mut contents = self.lock();
        contents.storage.remove(&nation);
        contents.overflow.remove(&nation);
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut contents = self.lock();
        let mut purged = 0;
        contents.overflow.retain(|_, entries| {
            entries.retain(|entry| {
                let live = entry.expires_at > now;
                if !live {
                    purged += entry.items.len();
                }
                live
            });
            !entries.is_empty()
        });
        purged
    }
}
