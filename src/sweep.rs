//! Periodic background sweeps: power recomputation, trade execution and
//! overflow expiry.
//!
//! A sweep lists its due items under one short lock, then takes the lock
//! again for each item. Commands from players interleave between items, and
//! no lock is held while waiting on the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::db::PendingWrite;
use crate::engine::Engine;
use crate::error::TradeError;
use crate::model::{NationId, TradeId};
use crate::realm::Realm;
use crate::trade::Execution;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SweepKind {
    Power,
    Trade,
    Overflow,
}

impl SweepKind {
    pub const ALL: [SweepKind; 3] = [SweepKind::Power, SweepKind::Trade, SweepKind::Overflow];
}

/// One unit of sweep work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepItem {
    Nation(NationId),
    Trade(TradeId),
    Purge,
}

/// A periodic job over the realm.
///
/// Object-safe so sweeps can be stored as `Box<dyn Sweep>`.
pub trait Sweep: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> SweepKind;
    fn period(&self, config: &EngineConfig) -> Duration;
    /// Items to process in this pass.
    fn due(&self, realm: &Realm, now: DateTime<Utc>) -> Vec<SweepItem>;
    /// Process one item. Returns whether anything changed.
    fn apply(&self, realm: &mut Realm, item: SweepItem, now: DateTime<Utc>) -> bool;
}

/// Recomputes derived power for every nation without an override.
#[derive(Debug, Default)]
pub struct PowerSweep;

impl Sweep for PowerSweep {
    fn name(&self) -> &str {
        "power"
    }

    fn kind(&self) -> SweepKind {
        SweepKind::Power
    }

    fn period(&self, config: &EngineConfig) -> Duration {
        Duration::from_secs(config.power_sweep_secs)
    }

    fn due(&self, realm: &Realm, _now: DateTime<Utc>) -> Vec<SweepItem> {
        realm
            .power_sweep_targets()
            .into_iter()
            .map(SweepItem::Nation)
            .collect()
    }

    fn apply(&self, realm: &mut Realm, item: SweepItem, _now: DateTime<Utc>) -> bool {
        match item {
            SweepItem::Nation(id) => realm.recalculate_power(id),
            _ => false,
        }
    }
}

/// Executes every trade whose next execution time has passed.
#[derive(Debug, Default)]
pub struct TradeSweep;

impl Sweep for TradeSweep {
    fn name(&self) -> &str {
        "trade"
    }

    fn kind(&self) -> SweepKind {
        SweepKind::Trade
    }

    fn period(&self, config: &EngineConfig) -> Duration {
        Duration::from_secs(config.trade_sweep_secs)
    }

    fn due(&self, realm: &Realm, now: DateTime<Utc>) -> Vec<SweepItem> {
        realm
            .trades()
            .ready(now)
            .into_iter()
            .map(SweepItem::Trade)
            .collect()
    }

    fn apply(&self, realm: &mut Realm, item: SweepItem, now: DateTime<Utc>) -> bool {
        let SweepItem::Trade(id) = item else {
            return false;
        };
        match realm.execute_trade(id, now) {
            Ok(Execution::Delivered { .. }) => true,
            Ok(Execution::NotDue | Execution::Idle) => false,
            // Cancelled between listing and execution.
            Err(TradeError::NotFound(_)) => false,
            Err(err) => {
                warn!(trade = %id, error = %err, "trade execution failed");
                false
            }
        }
    }
}

/// Drops overflow vault entries past their expiry.
#[derive(Debug, Default)]
pub struct OverflowSweep;

impl Sweep for OverflowSweep {
    fn name(&self) -> &str {
        "overflow"
    }

    fn kind(&self) -> SweepKind {
        SweepKind::Overflow
    }

    fn period(&self, config: &EngineConfig) -> Duration {
        Duration::from_secs(config.overflow_sweep_secs)
    }

    fn due(&self, _realm: &Realm, _now: DateTime<Utc>) -> Vec<SweepItem> {
        vec![SweepItem::Purge]
    }

    fn apply(&self, realm: &mut Realm, _item: SweepItem, now: DateTime<Utc>) -> bool {
        realm.vault().purge_expired(now) > 0
    }
}

pub fn for_kind(kind: SweepKind) -> Box<dyn Sweep> {
    match kind {
        SweepKind::Power => Box::new(PowerSweep),
        SweepKind::Trade => Box::new(TradeSweep),
        SweepKind::Overflow => Box::new(OverflowSweep),
    }
}

/// What a single pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub visited: usize,
    pub changed: usize,
    pub failed_writes: usize,
}

/// Run one full pass and wait for its writes.
pub async fn run_once(engine: &Engine, sweep: &dyn Sweep) -> SweepReport {
    run_pass(engine, sweep, || false).await
}

#[tracing::instrument(skip_all, fields(sweep = sweep.name()))]
async fn run_pass(engine: &Engine, sweep: &dyn Sweep, stop: impl Fn() -> bool) -> SweepReport {
    let now = engine.now();
    let items = engine.read(|realm| sweep.due(realm, now));
    let mut report = SweepReport::default();
    let mut writes: Vec<PendingWrite> = Vec::new();
    for item in items {
        if stop() {
            debug!(sweep = sweep.name(), "sweep interrupted by shutdown");
            break;
        }
        let committed = engine.step(|realm, now| sweep.apply(realm, item, now));
        report.visited += 1;
        if committed.value {
            report.changed += 1;
        }
        writes.push(committed.write);
    }
    for write in writes {
        if write.wait().await.is_err() {
            report.failed_writes += 1;
        }
    }
    if report.changed > 0 || report.failed_writes > 0 {
        info!(
            sweep = sweep.name(),
            visited = report.visited,
            changed = report.changed,
            failed_writes = report.failed_writes,
            "sweep pass complete"
        );
    }
    report
}

/// Start every sweep on its own interval. Each task exits when `shutdown`
/// flips to `true`, finishing at most the item in hand.
pub fn spawn_sweeps(engine: &Engine, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
    let config = engine.read(|realm| realm.config().clone());
    SweepKind::ALL
        .into_iter()
        .map(|kind| {
            let sweep: Arc<dyn Sweep> = Arc::from(for_kind(kind));
            let period = sweep.period(&config).max(Duration::from_secs(1));
            let engine = engine.clone();
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // The first tick completes immediately; skip it so a restart
                // does not sweep before commands are accepted.
                ticker.tick().await;
                let flag = shutdown.clone();
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            run_pass(&engine, sweep.as_ref(), || *flag.borrow()).await;
                        }
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
                debug!(sweep = sweep.name(), "sweep stopped");
            })
        })
        .collect()
}
