use chrono::Utc;
use sqlx::{AnyConnection, Row};
use tracing::info;

use super::coordinator::Coordinator;
use super::rows::millis;
use crate::error::StoreError;

/// A numbered schema change. Applied in order, each exactly once.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "core",
        sql: include_str!("../../sql/migrations/0001_core.sql"),
    },
    Migration {
        version: 2,
        name: "vaults",
        sql: include_str!("../../sql/migrations/0002_vaults.sql"),
    },
];

const LEDGER: &str = "\
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    BIGINT PRIMARY KEY,
    name       TEXT NOT NULL,
    applied_at BIGINT NOT NULL
)";

/// Versions recorded in the ledger, ascending.
pub async fn applied_versions(coordinator: &Coordinator) -> Result<Vec<i64>, StoreError> {
    coordinator
        .unit_of_work("applied_versions", |conn| {
            Box::pin(async move {
                sqlx::query(LEDGER).execute(&mut *conn).await?;
                let rows = sqlx::query("SELECT version FROM schema_migrations ORDER BY version")
                    .fetch_all(&mut *conn)
                    .await?;
                rows.iter()
                    .map(|row| row.try_get::<i64, _>("version").map_err(StoreError::from))
                    .collect()
            })
        })
        .await
}

/// Apply every migration not yet in the ledger. Each migration and its
/// ledger entry commit together. Returns the versions applied now.
pub async fn migrate(coordinator: &Coordinator) -> Result<Vec<i64>, StoreError> {
    let applied = applied_versions(coordinator).await?;
    let mut ran = Vec::new();
    for migration in MIGRATIONS.iter().filter(|m| !applied.contains(&m.version)) {
        let m = *migration;
        coordinator
            .unit_of_work("migrate", move |conn| Box::pin(apply_migration(conn, m)))
            .await?;
        info!(version = m.version, name = m.name, "migration applied");
        ran.push(m.version);
    }
    Ok(ran)
}

async fn apply_migration(conn: &mut AnyConnection, m: Migration) -> Result<(), StoreError> {
    let fail = |source| StoreError::Migration {
        version: m.version,
        source,
    };
    for statement in statements(m.sql) {
        sqlx::query(&statement)
            .execute(&mut *conn)
            .await
            .map_err(fail)?;
    }
    sqlx::query("INSERT INTO schema_migrations (version, name, applied_at) VALUES ($1, $2, $3)")
        .bind(m.version)
        .bind(m.name.to_string())
        .bind(millis(Utc::now()))
        .execute(&mut *conn)
        .await
        .map_err(fail)?;
    Ok(())
}

/// Split a migration script into single statements. Drops `--` comment
/// lines; statements are separated by `;`.
fn statements(sql: &str) -> Vec<String> {
    let body: String = sql
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .map(|line| format!("{line}\n"))
        .collect();
    body.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_are_strictly_increasing() {
        assert!(MIGRATIONS.windows(2).all(|w| w[0].version < w[1].version));
        assert_eq!(MIGRATIONS[0].version, 1);
    }

    #[test]
    fn every_table_is_covered() {
        let all: String = MIGRATIONS.iter().map(|m| m.sql).collect();
        for table in ["nations", "members", "wars", "trades", "trade_vault_items", "nation_vault_items"] {
            assert!(all.contains(&format!("CREATE TABLE IF NOT EXISTS {table} (")), "{table}");
        }
    }

    #[test]
    fn scripts_split_into_statements() {
        let split = statements("-- header; with a semicolon\nCREATE TABLE a (x BIGINT);\n\n  CREATE INDEX i ON a (x);\n");
        assert_eq!(split, vec!["CREATE TABLE a (x BIGINT)", "CREATE INDEX i ON a (x)"]);
    }

    #[test]
    fn shipped_scripts_have_no_empty_statements() {
        let core = statements(MIGRATIONS[0].sql);
        assert_eq!(core.len(), 8);
        assert!(core.iter().all(|s| s.starts_with("CREATE ")));
        assert_eq!(statements(MIGRATIONS[1].sql).len(), 3);
    }
}
