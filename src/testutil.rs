//! Fixtures shared by unit and integration tests.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, TimeZone, Utc};

use crate::clock::ManualClock;
use crate::config::{Config, EngineConfig, StoreConfig};
use crate::engine::Engine;
use crate::model::{NationId, PlayerId};
use crate::realm::Realm;
use crate::trade::{MarkerSink, MemoryVault};

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// A marker sink that remembers what it was asked to despawn.
#[derive(Debug, Default)]
pub struct RecordingMarkers {
    despawned: Mutex<Vec<u64>>,
}

impl RecordingMarkers {
    pub fn despawned(&self) -> Vec<u64> {
        self.despawned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl MarkerSink for RecordingMarkers {
    fn despawn(&self, entity_id: u64) {
        self.despawned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entity_id);
    }
}

/// A fixed starting instant, so timestamps in tests are reproducible.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// In-memory realm
// ---------------------------------------------------------------------------

/// An empty realm with default tunables.
pub fn realm() -> (Realm, Arc<MemoryVault>, Arc<RecordingMarkers>) {
    realm_with(EngineConfig::default())
}

pub fn realm_with(config: EngineConfig) -> (Realm, Arc<MemoryVault>, Arc<RecordingMarkers>) {
    let vault = Arc::new(MemoryVault::default());
    let sink = Arc::new(RecordingMarkers::default());
    let realm = Realm::new(config, vault.clone(), sink.clone());
    (realm, vault, sink)
}

/// Register player `p{player}` and found `name` with them as president.
pub fn found(realm: &mut Realm, name: &str, player: u64, now: DateTime<Utc>) -> NationId {
    let president = PlayerId(player);
    realm.register_member(president, &format!("p{player}"));
    realm
        .create_nation(name, president, now)
        .unwrap_or_else(|err| panic!("founding {name}: {err}"))
        .id
}

/// Register player `p{player}` and admit them to `nation` as a citizen.
pub fn enlist(realm: &mut Realm, nation: NationId, president: u64, player: u64) -> PlayerId {
    let recruit = PlayerId(player);
    realm.register_member(recruit, &format!("p{player}"));
    realm
        .admit(nation, PlayerId(president), recruit)
        .unwrap_or_else(|err| panic!("admitting p{player}: {err}"));
    recruit
}

// ---------------------------------------------------------------------------
// Engine over SQLite
// ---------------------------------------------------------------------------

pub fn sqlite_config(dir: &Path) -> Config {
    Config {
        engine: EngineConfig::default(),
        store: StoreConfig::sqlite(dir.join("sovereignty.db")),
    }
}

/// Start an engine on a fresh SQLite file under `dir`, with a manual clock.
pub async fn sqlite_engine(dir: &Path) -> (Engine, Arc<MemoryVault>, Arc<ManualClock>) {
    let vault = Arc::new(MemoryVault::default());
    let clock = Arc::new(ManualClock::new(epoch()));
    let engine = start(sqlite_config(dir), vault.clone(), clock.clone()).await;
    (engine, vault, clock)
}

/// Start an engine with the given collaborators. Panics on failure.
pub async fn start(config: Config, vault: Arc<MemoryVault>, clock: Arc<ManualClock>) -> Engine {
    Engine::start(config, vault, Arc::new(RecordingMarkers::default()), clock)
        .await
        .unwrap_or_else(|err| panic!("engine start: {err}"))
}

/// Register player `p{player}`, found `name` and wait for both writes.
pub async fn found_on(engine: &Engine, name: &str, player: u64) -> NationId {
    let president = PlayerId(player);
    engine
        .register_member(president, &format!("p{player}"))
        .durable()
        .await
        .unwrap_or_else(|err| panic!("registering p{player}: {err}"));
    engine
        .create_nation(name, president)
        .unwrap_or_else(|err| panic!("founding {name}: {err}"))
        .durable()
        .await
        .unwrap_or_else(|err| panic!("saving {name}: {err}"))
        .id
}
