#[macro_use]
mod macros;

pub mod chunk;
pub mod ids;
pub mod item;
pub mod kinds;
pub mod member;
pub mod nation;
pub mod trade;
pub mod war;

pub use chunk::{ChunkCoordinate, ChunkParseError};
pub use ids::{NationId, PlayerId, TradeId, WarId};
pub use item::ItemStack;
pub use kinds::{Role, TradeSide, TradeStatus, WarStatus};
pub use member::Member;
pub use nation::{MAX_POWER, MAX_POWER_LEVEL, Nation, power_level_for};
pub use trade::Trade;
pub use war::{War, WarSide, pair_key};
