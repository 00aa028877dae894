mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use chrono::Duration;
use sovereignty::db::{self, Write, WriteBatch};
use sovereignty::{
    ChunkCoordinate, ItemStack, ManualClock, MemoryVault, NationError, PlayerId, SweepKind,
    TradeSide, TradeStatus, TradeTerms, WarError, WarStatus,
};

#[tokio::test]
async fn second_nation_cannot_claim_a_taken_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _, _) = common::sqlite_engine(dir.path()).await;
    let rome = common::found_on(&engine, "Rome", 1).await;
    let gaul = common::found_on(&engine, "Gaul", 2).await;

    let nation = engine.nation(rome).unwrap();
    assert_eq!(nation.power, 1.0);
    assert_eq!(nation.power_level, 1);

    let origin = ChunkCoordinate::new("world", 0, 0);
    engine.claim(rome, origin.clone()).unwrap().durable().await.unwrap();
    assert_eq!(
        engine.claim(gaul, origin.clone()).unwrap_err(),
        NationError::AlreadyClaimed(origin.clone())
    );
    assert_eq!(engine.owner_of(&origin), Some(rome));
}

#[tokio::test]
async fn war_ends_on_the_required_kill() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _, _) = common::sqlite_engine(dir.path()).await;
    let rome = common::found_on(&engine, "Rome", 1).await;
    let gaul = common::found_on(&engine, "Gaul", 2).await;
    engine.force_power(gaul, 2.0).unwrap().durable().await.unwrap();

    let war = engine
        .declare_war(PlayerId(1), gaul)
        .unwrap()
        .durable()
        .await
        .unwrap();
    assert_eq!(war.status, WarStatus::Active);
    assert_eq!(war.required_kills, 10);

    for kill in 1..10 {
        let outcome = engine.record_kill(PlayerId(1), PlayerId(2)).unwrap().into_value();
        assert_eq!(outcome.kills, kill);
        assert!(outcome.ended.is_none());
    }
    let last = engine
        .record_kill(PlayerId(1), PlayerId(2))
        .unwrap()
        .durable()
        .await
        .unwrap();
    let ended = last.ended.unwrap();
    assert_eq!(ended.winner_id, rome);
    assert!(ended.bonus_awarded);
    assert_eq!(engine.nation(rome).unwrap().power, 1.5);

    assert_eq!(
        engine.record_kill(PlayerId(1), PlayerId(2)).unwrap_err(),
        WarError::NoActiveWar
    );
    assert_eq!(engine.nation(rome).unwrap().power, 1.5);
    assert_eq!(
        common::count_where(&engine, "wars", "status = 'ended'").await,
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_final_kills_end_the_war_once() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _, _) = common::sqlite_engine(dir.path()).await;
    let rome = common::found_on(&engine, "Rome", 1).await;
    let gaul = common::found_on(&engine, "Gaul", 2).await;
    let war = engine.declare_war(PlayerId(1), gaul).unwrap().into_value();
    assert_eq!(war.required_kills, 5);
    for _ in 0..4 {
        engine.record_kill(PlayerId(1), PlayerId(2)).unwrap();
        engine.record_kill(PlayerId(2), PlayerId(1)).unwrap();
    }

    let contenders = 16;
    let start = Arc::new(Barrier::new(contenders));
    let threads: Vec<_> = (0..contenders)
        .map(|i| {
            let engine = engine.clone();
            let start = Arc::clone(&start);
            let (killer, victim) = if i % 2 == 0 { (1, 2) } else { (2, 1) };
            thread::spawn(move || {
                start.wait();
                engine.record_kill(PlayerId(killer), PlayerId(victim))
            })
        })
        .collect();

    let mut endings = Vec::new();
    for handle in threads {
        match handle.join().unwrap() {
            Ok(committed) => {
                let outcome = committed.durable().await.unwrap();
                endings.push(outcome.ended.unwrap());
            }
            Err(err) => assert_eq!(err, WarError::NoActiveWar),
        }
    }
    assert_eq!(endings.len(), 1);
    let ended = &endings[0];
    assert_eq!(ended.war_id, war.id);
    let (winner, loser) = (ended.winner_id, ended.loser_id);
    assert!(winner == rome || winner == gaul);
    assert_eq!(engine.nation(winner).unwrap().power, 1.5);
    assert_eq!(engine.nation(loser).unwrap().power, 1.0);
    assert!(!engine.is_at_war(rome, gaul));

    engine.store().settle().await;
    assert_eq!(
        common::count_where(&engine, "wars", "status = 'ended'").await,
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn commands_from_plain_threads_reach_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _, _) = common::sqlite_engine(dir.path()).await;
    let rome = common::found_on(&engine, "Rome", 1).await;
    let origin = ChunkCoordinate::new("world", 3, 3);

    let worker = engine.clone();
    let coord = origin.clone();
    let committed = thread::spawn(move || worker.claim(rome, coord))
        .join()
        .unwrap()
        .unwrap();
    committed.durable().await.unwrap();

    assert_eq!(engine.owner_of(&origin), Some(rome));
    let snapshot = db::load_snapshot(engine.store()).await.unwrap();
    assert!(snapshot.nations[0].claimed_chunks.contains(&origin));
}

#[tokio::test]
async fn trade_waits_for_staged_goods() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, vault, clock) = common::sqlite_engine(dir.path()).await;
    let rome = common::found_on(&engine, "Rome", 1).await;
    let gaul = common::found_on(&engine, "Gaul", 2).await;

    let trade = engine
        .create_trade(
            PlayerId(1),
            TradeTerms {
                sending_id: rome,
                receiving_id: gaul,
                interval_minutes: 3,
                max_executions: None,
            },
        )
        .unwrap()
        .durable()
        .await
        .unwrap();
    assert_eq!(
        trade.next_execution_at,
        Some(common::epoch() + Duration::minutes(60))
    );

    clock.advance(Duration::minutes(60));
    let idle = engine.run_sweep(SweepKind::Trade).await;
    assert_eq!((idle.visited, idle.changed), (1, 0));
    let unchanged = engine.trade(trade.id).unwrap();
    assert_eq!(unchanged.status, TradeStatus::Pending);
    assert_eq!(unchanged.consecutive_fulfillments, 0);
    assert_eq!(unchanged.next_execution_at, trade.next_execution_at);

    vault.stage(trade.id, TradeSide::Outbound, vec![ItemStack::new("wheat", 64)]);
    let delivered = engine.run_sweep(SweepKind::Trade).await;
    assert_eq!(delivered.changed, 1);
    let active = engine.trade(trade.id).unwrap();
    assert_eq!(active.status, TradeStatus::Active);
    assert_eq!(active.consecutive_fulfillments, 1);
    assert_eq!(vault.storage(gaul), vec![ItemStack::new("wheat", 64)]);
    assert_eq!(
        common::count_where(&engine, "trades", "status = 'active'").await,
        1
    );
}

#[tokio::test]
async fn disband_clears_every_reference() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _, _) = common::sqlite_engine(dir.path()).await;
    let rome = common::found_on(&engine, "Rome", 1).await;
    let gaul = common::found_on(&engine, "Gaul", 2).await;
    let iceni = common::found_on(&engine, "Iceni", 3).await;

    engine.propose_alliance(rome, iceni, PlayerId(1)).unwrap();
    engine.accept_alliance(iceni, rome, PlayerId(3)).unwrap();
    engine.declare_war(PlayerId(1), gaul).unwrap();
    engine
        .create_trade(
            PlayerId(3),
            TradeTerms {
                sending_id: iceni,
                receiving_id: rome,
                interval_minutes: 1,
                max_executions: None,
            },
        )
        .unwrap();

    let disbanded = engine
        .disband(rome, PlayerId(1))
        .unwrap()
        .durable()
        .await
        .unwrap();
    assert_eq!(disbanded.nation.id, rome);

    assert!(engine.nation(rome).is_none());
    assert!(engine.nation(iceni).unwrap().alliance_ids.is_empty());
    assert!(engine.nation(gaul).unwrap().war_ids.is_empty());
    assert!(!engine.is_at_war(rome, gaul));
    assert!(engine.trades_for(iceni).is_empty());
    assert_eq!(engine.member(PlayerId(1)).unwrap().nation_id, None);
    assert_eq!(
        common::count_where(&engine, "nations", "disbanded_at IS NOT NULL").await,
        1
    );
    assert_eq!(
        common::count_where(&engine, "wars", "status = 'cancelled'").await,
        1
    );
}

#[tokio::test]
async fn state_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::sqlite_config(dir.path());
    let vault = Arc::new(MemoryVault::default());
    let clock = Arc::new(ManualClock::new(common::epoch()));

    let (rome, gaul, war_id) = {
        let engine = common::start(config.clone(), vault.clone(), clock.clone()).await;
        let rome = common::found_on(&engine, "Rome", 1).await;
        let gaul = common::found_on(&engine, "Gaul", 2).await;
        let carthage = common::found_on(&engine, "Carthage", 3).await;
        engine
            .claim(rome, ChunkCoordinate::new("world", 4, -2))
            .unwrap();
        let war = engine.declare_war(PlayerId(1), gaul).unwrap().into_value();
        engine.disband(carthage, PlayerId(3)).unwrap();
        engine.shutdown().await.unwrap();
        (rome, gaul, war.id)
    };

    let engine = common::start(config, vault, clock).await;
    let restored = engine.nation(rome).unwrap();
    assert!(restored.claimed_chunks.contains(&ChunkCoordinate::new("world", 4, -2)));
    assert!(restored.war_ids.contains(&war_id));
    assert_eq!(engine.war_between(rome, gaul).unwrap().id, war_id);
    assert!(engine.nation_by_name("Carthage").is_none());
    assert_eq!(engine.member(PlayerId(3)).unwrap().nation_id, None);

    // Fresh ids never reuse a tombstoned one.
    let rebuilt = common::found_on(&engine, "Carthage", 3).await;
    assert!(rebuilt.get() > war_id.get());
}

#[tokio::test]
async fn stale_revisions_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _, _) = common::sqlite_engine(dir.path()).await;
    let rome = common::found_on(&engine, "Rome", 1).await;
    let current = engine.nation(rome).unwrap();

    let mut stale = current.clone();
    stale.name = "Stale".to_string();
    stale.revision = current.revision - 1;
    let batch: WriteBatch = [Write::Nation {
        nation: stale,
        disbanded_at: None,
    }]
    .into_iter()
    .collect();
    engine.store().commit(batch).await.unwrap();

    let snapshot = db::load_snapshot(engine.store()).await.unwrap();
    assert_eq!(snapshot.nations[0].name, "Rome");
    assert_eq!(snapshot.nations[0].revision, current.revision);
}

#[tokio::test]
async fn migrations_apply_once() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _, _) = common::sqlite_engine(dir.path()).await;
    assert!(db::migrate(engine.store()).await.unwrap().is_empty());
    let versions: Vec<i64> = db::MIGRATIONS.iter().map(|m| m.version).collect();
    assert_eq!(db::applied_versions(engine.store()).await.unwrap(), versions);
    assert_eq!(common::count(&engine, "nations").await, 0);
}

#[tokio::test]
async fn export_writes_live_state() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _, _) = common::sqlite_engine(dir.path()).await;
    common::found_on(&engine, "Rome", 1).await;
    let out = dir.path().join("export");
    engine.export_jsonl(&out).unwrap();
    assert_eq!(common::read_lines(&out.join("nations.jsonl")).len(), 1);
    assert_eq!(common::read_lines(&out.join("members.jsonl")).len(), 1);
}
