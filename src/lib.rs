pub mod alliance;
pub mod clock;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod flush;
pub mod id;
pub mod model;
pub mod power;
pub mod realm;
pub mod registry;
pub mod sweep;
pub mod testutil;
pub mod trade;
pub mod war;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, EngineConfig, StoreBackend, StoreConfig};
pub use engine::{Committed, Engine};
pub use error::{
    AllianceError, EngineError, InvariantViolation, NationError, StoreError, TradeError, WarError,
};
pub use id::IdGenerator;
pub use model::{
    ChunkCoordinate, ItemStack, Member, Nation, NationId, PlayerId, Role, Trade, TradeId,
    TradeSide, TradeStatus, War, WarId, WarStatus,
};
pub use realm::Realm;
pub use sweep::{SweepKind, SweepReport, spawn_sweeps};
pub use trade::{MarkerSink, MarkerTarget, MemoryVault, NullMarkers, TradeTerms, Vault};
