#![allow(dead_code)]

use sovereignty::Engine;
use sqlx::Row;

pub use sovereignty::testutil::{epoch, found_on, sqlite_config, sqlite_engine, start};

/// Row count of `table` as the store sees it.
pub async fn count(engine: &Engine, table: &str) -> i64 {
    sqlx::query(&format!("SELECT COUNT(*) AS n FROM {table}"))
        .fetch_one(engine.store().pool())
        .await
        .unwrap()
        .try_get("n")
        .unwrap()
}

pub async fn count_where(engine: &Engine, table: &str, filter: &str) -> i64 {
    sqlx::query(&format!("SELECT COUNT(*) AS n FROM {table} WHERE {filter}"))
        .fetch_one(engine.store().pool())
        .await
        .unwrap()
        .try_get("n")
        .unwrap()
}

pub fn read_lines(path: &std::path::Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}
