mod common;

use std::sync::Arc;

use sovereignty::db::WriteMode;
use sovereignty::{
    ChunkCoordinate, Config, EngineConfig, ManualClock, MemoryVault, PlayerId, StoreConfig,
};
use testcontainers::ContainerAsync;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;

async fn setup() -> (Config, ContainerAsync<Postgres>) {
    let container = Postgres::default().start().await.unwrap();
    let host = container.get_host().await.unwrap();
    let port = container.get_host_port_ipv4(5432).await.unwrap();
    let config = Config {
        engine: EngineConfig::default(),
        store: StoreConfig::postgres(format!(
            "postgres://postgres:postgres@{}:{}/postgres",
            host, port
        )),
    };
    (config, container)
}

#[tokio::test]
#[ignore]
async fn nations_and_wars_survive_a_restart() {
    let (config, _container) = setup().await;
    let vault = Arc::new(MemoryVault::default());
    let clock = Arc::new(ManualClock::new(common::epoch()));

    let (rome, gaul) = {
        let engine = common::start(config.clone(), vault.clone(), clock.clone()).await;
        assert_eq!(engine.store().mode(), WriteMode::MultiWriter);
        let rome = common::found_on(&engine, "Rome", 1).await;
        let gaul = common::found_on(&engine, "Gaul", 2).await;
        engine
            .claim(rome, ChunkCoordinate::new("world", 0, 0))
            .unwrap();
        engine.declare_war(PlayerId(1), gaul).unwrap();
        engine.shutdown().await.unwrap();
        (rome, gaul)
    };

    let engine = common::start(config, vault, clock).await;
    assert_eq!(engine.nations().len(), 2);
    assert_eq!(
        engine.owner_of(&ChunkCoordinate::new("world", 0, 0)),
        Some(rome)
    );
    assert!(engine.is_at_war(rome, gaul));
    assert_eq!(common::count(&engine, "wars").await, 1);
}

#[tokio::test]
#[ignore]
async fn concurrent_commands_all_land() {
    let (config, _container) = setup().await;
    let vault = Arc::new(MemoryVault::default());
    let clock = Arc::new(ManualClock::new(common::epoch()));
    let engine = common::start(config, vault, clock).await;

    let mut tasks = Vec::new();
    for player in 1..=8u64 {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            common::found_on(&engine, &format!("Nation{player}"), player).await
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    engine.store().settle().await;
    assert_eq!(common::count(&engine, "nations").await, 8);
    assert_eq!(common::count(&engine, "members").await, 8);
}
