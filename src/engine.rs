//! The engine facade.
//!
//! Every command takes the realm lock, validates and mutates synchronously,
//! drains the resulting changes into a [`WriteBatch`] and hands it to the
//! coordinator before the lock is released. The caller gets the result at
//! once, plus a [`PendingWrite`] it may await for durability.

use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::alliance::Proposal;
use crate::clock::Clock;
use crate::config::Config;
use crate::db::{self, Coordinator, PendingWrite, WriteBatch};
use crate::error::{AllianceError, EngineError, NationError, StoreError, TradeError, WarError};
use crate::flush;
use crate::model::{
    ChunkCoordinate, Member, Nation, NationId, PlayerId, Role, Trade, TradeId, War, WarId,
};
use crate::realm::Realm;
use crate::registry::Disbanded;
use crate::sweep::{self, SweepKind, SweepReport};
use crate::trade::{MarkerSink, MarkerTarget, TradeTerms, Vault};
use crate::war::{KillOutcome, WarEnded};

/// A command's result together with its in-flight store write.
#[derive(Debug)]
pub struct Committed<T> {
    pub value: T,
    pub write: PendingWrite,
}

impl<T> Committed<T> {
    /// Wait for the store write, then return the value.
    pub async fn durable(self) -> Result<T, StoreError> {
        self.write.wait().await?;
        Ok(self.value)
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

#[derive(Debug, Clone)]
pub struct Engine {
    realm: Arc<Mutex<Realm>>,
    store: Coordinator,
    clock: Arc<dyn Clock>,
}

impl Engine {
    /// Connect, migrate and load. Any failure aborts startup.
    pub async fn start(
        config: Config,
        vault: Arc<dyn Vault>,
        markers: Arc<dyn MarkerSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        config.engine.validate()?;
        let store = Coordinator::connect(&config.store)
            .await
            .map_err(EngineError::Connect)?;
        let applied = db::migrate(&store).await.map_err(EngineError::Migrate)?;
        if !applied.is_empty() {
            info!(?applied, "schema migrated");
        }
        let snapshot = db::load_snapshot(&store)
            .await
            .map_err(EngineError::Load)?;
        let realm = Realm::from_snapshot(config.engine, snapshot, vault, markers);
        let engine = Self::with_store(store, realm, clock);
        // Repairs made while restoring go out before any command runs.
        engine.flush().await.map_err(EngineError::Load)?;
        info!(mode = ?engine.store.mode(), "engine started");
        Ok(engine)
    }

    pub fn with_store(store: Coordinator, realm: Realm, clock: Arc<dyn Clock>) -> Self {
        Self {
            realm: Arc::new(Mutex::new(realm)),
            store,
            clock,
        }
    }

    pub fn store(&self) -> &Coordinator {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn lock(&self) -> MutexGuard<'_, Realm> {
        self.realm.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read under the lock.
    pub fn read<R>(&self, f: impl FnOnce(&Realm) -> R) -> R {
        f(&self.lock())
    }

    /// Validate and mutate under the lock, then dispatch the changes.
    /// Nothing is written when `f` fails.
    pub fn mutate<T, E>(
        &self,
        f: impl FnOnce(&mut Realm, DateTime<Utc>) -> Result<T, E>,
    ) -> Result<Committed<T>, E> {
        let now = self.clock.now();
        let mut realm = self.lock();
        let value = f(&mut realm, now)?;
        let batch = realm.drain_writes(now);
        let write = self.store.dispatch(batch);
        Ok(Committed { value, write })
    }

    /// Infallible variant of [`Engine::mutate`], used by the sweeps.
    pub(crate) fn step<T>(&self, f: impl FnOnce(&mut Realm, DateTime<Utc>) -> T) -> Committed<T> {
        let now = self.clock.now();
        let mut realm = self.lock();
        let value = f(&mut realm, now);
        let batch = realm.drain_writes(now);
        let write = self.store.dispatch(batch);
        Committed { value, write }
    }

    /// Write out anything still pending and wait for it.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let batch: WriteBatch = {
            let now = self.clock.now();
            self.lock().drain_writes(now)
        };
        self.store.commit(batch).await
    }

    /// Flush and close the pool.
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        let flushed = self.flush().await;
        self.store.close().await;
        info!("engine stopped");
        flushed
    }

    // ----- nations ----------------------------------------------------------

    pub fn register_member(&self, player: PlayerId, display_name: &str) -> Committed<()> {
        self.step(|realm, _| realm.register_member(player, display_name))
    }

    pub fn create_nation(
        &self,
        name: &str,
        founder: PlayerId,
    ) -> Result<Committed<Nation>, NationError> {
        self.mutate(|realm, now| realm.create_nation(name, founder, now))
    }

    pub fn disband(
        &self,
        nation: NationId,
        requester: PlayerId,
    ) -> Result<Committed<Disbanded>, NationError> {
        self.mutate(|realm, now| realm.disband_nation(nation, requester, now))
    }

    pub fn rename(
        &self,
        nation: NationId,
        requester: PlayerId,
        name: &str,
    ) -> Result<Committed<()>, NationError> {
        self.mutate(|realm, _| realm.rename_nation(nation, requester, name))
    }

    pub fn admit(
        &self,
        nation: NationId,
        requester: PlayerId,
        player: PlayerId,
    ) -> Result<Committed<()>, NationError> {
        self.mutate(|realm, _| realm.admit(nation, requester, player))
    }

    pub fn leave(&self, player: PlayerId) -> Result<Committed<NationId>, NationError> {
        self.mutate(|realm, _| realm.leave(player))
    }

    pub fn kick(
        &self,
        nation: NationId,
        requester: PlayerId,
        target: PlayerId,
    ) -> Result<Committed<()>, NationError> {
        self.mutate(|realm, _| realm.kick(nation, requester, target))
    }

    pub fn set_role(
        &self,
        nation: NationId,
        requester: PlayerId,
        target: PlayerId,
        role: Role,
    ) -> Result<Committed<()>, NationError> {
        self.mutate(|realm, _| realm.set_role(nation, requester, target, role))
    }

    pub fn transfer_presidency(
        &self,
        nation: NationId,
        requester: PlayerId,
        successor: PlayerId,
    ) -> Result<Committed<()>, NationError> {
        self.mutate(|realm, _| realm.transfer_presidency(nation, requester, successor))
    }

    /// Schedule a whole-row save of a nation.
    pub fn save(&self, nation: NationId) -> Result<PendingWrite, NationError> {
        self.mutate(|realm, _| {
            if realm.touch(nation) {
                Ok(())
            } else {
                Err(NationError::NoSuchNation(nation))
            }
        })
        .map(|c| c.write)
    }

    pub fn nation(&self, id: NationId) -> Option<Nation> {
        self.read(|realm| realm.registry().get(id).cloned())
    }

    pub fn nation_by_name(&self, name: &str) -> Option<Nation> {
        self.read(|realm| realm.registry().get_by_name(name).cloned())
    }

    pub fn nations(&self) -> Vec<Nation> {
        self.read(|realm| realm.registry().list_all().cloned().collect())
    }

    pub fn member(&self, player: PlayerId) -> Option<Member> {
        self.read(|realm| realm.registry().member(player).cloned())
    }

    // ----- territory --------------------------------------------------------

    pub fn claim(
        &self,
        nation: NationId,
        coord: ChunkCoordinate,
    ) -> Result<Committed<()>, NationError> {
        self.mutate(|realm, _| realm.claim(nation, coord))
    }

    pub fn unclaim(
        &self,
        nation: NationId,
        coord: &ChunkCoordinate,
    ) -> Result<Committed<()>, NationError> {
        self.mutate(|realm, _| realm.unclaim(nation, coord))
    }

    pub fn annex(
        &self,
        conqueror: NationId,
        requester: PlayerId,
        coord: &ChunkCoordinate,
    ) -> Result<Committed<NationId>, NationError> {
        self.mutate(|realm, _| realm.annex(conqueror, requester, coord))
    }

    pub fn owner_of(&self, coord: &ChunkCoordinate) -> Option<NationId> {
        self.read(|realm| realm.registry().chunk_index().owner(coord))
    }

    // ----- wars -------------------------------------------------------------

    pub fn declare_war(
        &self,
        requester: PlayerId,
        target: NationId,
    ) -> Result<Committed<War>, WarError> {
        self.mutate(|realm, now| realm.declare_war(requester, target, now))
    }

    pub fn record_kill(
        &self,
        killer: PlayerId,
        victim: PlayerId,
    ) -> Result<Committed<KillOutcome>, WarError> {
        self.mutate(|realm, now| realm.record_kill(killer, victim, now))
    }

    pub fn end_war(
        &self,
        war: WarId,
        winner: NationId,
    ) -> Result<Committed<WarEnded>, WarError> {
        self.mutate(|realm, now| realm.end_war(war, winner, now))
    }

    pub fn cancel_war(&self, war: WarId) -> Result<Committed<()>, WarError> {
        self.mutate(|realm, now| realm.cancel_war(war, now))
    }

    pub fn is_at_war(&self, a: NationId, b: NationId) -> bool {
        self.read(|realm| realm.wars().is_at_war(a, b))
    }

    pub fn war_between(&self, a: NationId, b: NationId) -> Option<War> {
        self.read(|realm| realm.wars().between(a, b).cloned())
    }

    // ----- alliances --------------------------------------------------------

    pub fn propose_alliance(
        &self,
        sender: NationId,
        receiver: NationId,
        requester: PlayerId,
    ) -> Result<Committed<Proposal>, AllianceError> {
        self.mutate(|realm, _| realm.propose_alliance(sender, receiver, requester))
    }

    pub fn accept_alliance(
        &self,
        receiver: NationId,
        sender: NationId,
        requester: PlayerId,
    ) -> Result<Committed<()>, AllianceError> {
        self.mutate(|realm, _| realm.accept_alliance(receiver, sender, requester))
    }

    pub fn deny_alliance(
        &self,
        receiver: NationId,
        sender: NationId,
        requester: PlayerId,
    ) -> Result<Committed<()>, AllianceError> {
        self.mutate(|realm, _| realm.deny_alliance(receiver, sender, requester))
    }

    pub fn break_alliance(
        &self,
        nation: NationId,
        ally: NationId,
        requester: PlayerId,
    ) -> Result<Committed<()>, AllianceError> {
        self.mutate(|realm, _| realm.break_alliance(nation, ally, requester))
    }

    pub fn pending_alliances(&self, receiver: NationId) -> Vec<NationId> {
        self.read(|realm| realm.alliances().pending_for(receiver))
    }

    // ----- trades -----------------------------------------------------------

    pub fn create_trade(
        &self,
        requester: PlayerId,
        terms: TradeTerms,
    ) -> Result<Committed<Trade>, TradeError> {
        self.mutate(|realm, now| realm.create_trade(requester, terms, now))
    }

    pub fn cancel_trade(
        &self,
        trade: TradeId,
        requester: PlayerId,
    ) -> Result<Committed<Trade>, TradeError> {
        self.mutate(|realm, _| realm.cancel_trade(trade, requester))
    }

    pub fn trade(&self, id: TradeId) -> Option<Trade> {
        self.read(|realm| realm.trades().get(id).cloned())
    }

    pub fn trades_for(&self, nation: NationId) -> Vec<Trade> {
        self.read(|realm| realm.trades().list_for(nation).into_iter().cloned().collect())
    }

    // ----- operator ---------------------------------------------------------

    pub fn force_power(&self, nation: NationId, power: f64) -> Result<Committed<()>, NationError> {
        self.mutate(|realm, _| realm.force_power(nation, power))
    }

    pub fn clear_override(&self, nation: NationId) -> Result<Committed<()>, NationError> {
        self.mutate(|realm, _| realm.clear_override(nation))
    }

    // ----- markers ----------------------------------------------------------

    pub fn register_marker(&self, entity_id: u64, target: MarkerTarget) {
        self.lock().register_marker(entity_id, target);
    }

    pub fn marker_target(&self, entity_id: u64) -> Option<MarkerTarget> {
        self.read(|realm| realm.marker_target(entity_id))
    }

    // ----- sweeps and export ------------------------------------------------

    /// Run one pass of a sweep now and wait for its writes.
    pub async fn run_sweep(&self, kind: SweepKind) -> SweepReport {
        sweep::run_once(self, sweep::for_kind(kind).as_ref()).await
    }

    /// Write the current state as JSONL files under `dir`.
    pub fn export_jsonl(&self, dir: &Path) -> io::Result<()> {
        self.read(|realm| flush::flush_to_jsonl(realm, dir))
    }
}
