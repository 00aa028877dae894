//! Error types for the sovereignty engine.
//!
//! Validation errors are expected outcomes of player input and are returned
//! to the command layer untouched. Store errors are logged where they happen
//! and surfaced as generic failures. Invariant violations mean the in-memory
//! model is inconsistent; the operation that found one is aborted.

use thiserror::Error;

use crate::config::ConfigError;
use crate::model::{ChunkCoordinate, NationId, PlayerId, TradeId, WarId};

/// An internal fault: the registries disagree with each other.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invariant violated: {0}")]
pub struct InvariantViolation(pub String);

impl InvariantViolation {
    /// Build the violation and log it at error level.
    pub fn report(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::error!(%message, "domain invariant violated");
        Self(message)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NationError {
    #[error("a nation named `{0}` already exists")]
    AlreadyExists(String),
    #[error("invalid nation name `{0}`")]
    InvalidName(String),
    #[error("{0} already belongs to a nation")]
    AlreadyInNation(PlayerId),
    #[error("{0} does not belong to a nation")]
    NotInNation(PlayerId),
    #[error("{0} is not known to the engine")]
    UnknownPlayer(PlayerId),
    #[error("no such nation {0}")]
    NoSuchNation(NationId),
    #[error("only the president may do that")]
    NotPresident,
    #[error("only an officer may do that")]
    NotOfficer,
    #[error("{0} is not a member of this nation")]
    NotMember(PlayerId),
    #[error("the president cannot leave; transfer the presidency or disband")]
    PresidentCannotLeave,
    #[error("that role cannot be assigned this way")]
    RoleNotAssignable,
    #[error("chunk {0} is already claimed")]
    AlreadyClaimed(ChunkCoordinate),
    #[error("quota of {quota} reached")]
    QuotaExceeded { quota: u32 },
    #[error("chunk {0} is not owned by this nation")]
    NotOwner(ChunkCoordinate),
    #[error("chunk {0} is not owned by an enemy at war")]
    NotAtWarWithOwner(ChunkCoordinate),
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WarError {
    #[error("only the president may declare war")]
    NotPresident,
    #[error("{0} does not belong to a nation")]
    NotInNation(PlayerId),
    #[error("no such nation {0}")]
    NoSuchNation(NationId),
    #[error("a nation cannot declare war on itself")]
    SameNation,
    #[error("cannot declare war on an ally")]
    Allied,
    #[error("these nations are already at war")]
    AlreadyAtWar,
    #[error("no active war between these players' nations")]
    NoActiveWar,
    #[error("no such war {0}")]
    NoSuchWar(WarId),
    #[error("war {0} has already ended")]
    AlreadyEnded(WarId),
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AllianceError {
    #[error("only an officer may handle alliances")]
    NotOfficer,
    #[error("no such nation {0}")]
    NoSuchNation(NationId),
    #[error("a nation cannot ally itself")]
    SameNation,
    #[error("these nations are already allied")]
    AlreadyAllied,
    #[error("an alliance request is already pending")]
    AlreadyRequested,
    #[error("these nations are at war")]
    AtWar,
    #[error("no pending alliance request from {0}")]
    NoPendingRequest(NationId),
    #[error("these nations are not allied")]
    NotAllied,
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TradeError {
    #[error("only an officer may handle trades")]
    NotOfficer,
    #[error("no such nation {0}")]
    NoSuchNation(NationId),
    #[error("a nation cannot trade with itself")]
    SameNation,
    #[error("these nations are at war")]
    AtWar,
    #[error("trade {0} not found")]
    NotFound(TradeId),
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

/// Failures talking to the backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to encode or decode a stored blob: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("malformed stored value: {0}")]
    Malformed(String),
    #[error("timed out after {waited_ms} ms waiting for the single-writer lock")]
    LockTimeout { waited_ms: u64 },
    #[error("store stayed busy for {attempts} attempts: {last}")]
    Busy { attempts: u32, last: sqlx::Error },
    #[error("migration {version} failed: {source}")]
    Migration {
        version: i64,
        #[source]
        source: sqlx::Error,
    },
    #[error("write task did not complete: {0}")]
    Aborted(String),
}

/// Startup failures. Any of these aborts initialization.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not connect to the store: {0}")]
    Connect(#[source] StoreError),
    #[error("could not apply migrations: {0}")]
    Migrate(#[source] StoreError),
    #[error("could not load state: {0}")]
    Load(#[source] StoreError),
}
