use chrono::{DateTime, Utc};
use sqlx::AnyConnection;
use tracing::debug;

use super::rows::{millis, opt_millis, to_blob};
use crate::error::StoreError;
use crate::model::{Member, Nation, NationId, Trade, TradeId, War};

const UPSERT_NATION: &str = "\
INSERT INTO nations (id, name, power, power_level, bonus_power, admin_override,
    claimed_chunks, annexed_chunks, alliance_ids, war_ids, president_id,
    senator_ids, soldier_ids, citizen_ids, last_victory_at, created_at,
    updated_at, disbanded_at, revision)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
ON CONFLICT (id) DO UPDATE SET
    name = excluded.name,
    power = excluded.power,
    power_level = excluded.power_level,
    bonus_power = excluded.bonus_power,
    admin_override = excluded.admin_override,
    claimed_chunks = excluded.claimed_chunks,
    annexed_chunks = excluded.annexed_chunks,
    alliance_ids = excluded.alliance_ids,
    war_ids = excluded.war_ids,
    president_id = excluded.president_id,
    senator_ids = excluded.senator_ids,
    soldier_ids = excluded.soldier_ids,
    citizen_ids = excluded.citizen_ids,
    last_victory_at = excluded.last_victory_at,
    updated_at = excluded.updated_at,
    disbanded_at = excluded.disbanded_at,
    revision = excluded.revision
WHERE nations.revision < excluded.revision";

const UPSERT_MEMBER: &str = "\
INSERT INTO members (id, display_name, nation_id, role, soldier_lives, revision)
VALUES ($1, $2, $3, $4, $5, $6)
ON CONFLICT (id) DO UPDATE SET
    display_name = excluded.display_name,
    nation_id = excluded.nation_id,
    role = excluded.role,
    soldier_lives = excluded.soldier_lives,
    revision = excluded.revision
WHERE members.revision < excluded.revision";

const UPSERT_WAR: &str = "\
INSERT INTO wars (id, attacker_id, defender_id, attacker_kills, defender_kills,
    required_kills, status, winner_id, started_at, ended_at, revision)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
ON CONFLICT (id) DO UPDATE SET
    attacker_kills = excluded.attacker_kills,
    defender_kills = excluded.defender_kills,
    status = excluded.status,
    winner_id = excluded.winner_id,
    ended_at = excluded.ended_at,
    revision = excluded.revision
WHERE wars.revision < excluded.revision";

const UPSERT_TRADE: &str = "\
INSERT INTO trades (id, sending_id, receiving_id, status, consecutive_fulfillments,
    total_executions, max_executions, volume_since_reward, interval_minutes,
    last_executed_at, next_execution_at, created_at, revision)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
ON CONFLICT (id) DO UPDATE SET
    status = excluded.status,
    consecutive_fulfillments = excluded.consecutive_fulfillments,
    total_executions = excluded.total_executions,
    volume_since_reward = excluded.volume_since_reward,
    last_executed_at = excluded.last_executed_at,
    next_execution_at = excluded.next_execution_at,
    revision = excluded.revision
WHERE trades.revision < excluded.revision";

/// One record-level change headed for the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Whole-row nation save. `disbanded_at` turns the row into a tombstone
    /// that later, older saves cannot revive.
    Nation {
        nation: Nation,
        disbanded_at: Option<DateTime<Utc>>,
    },
    Member(Member),
    War(War),
    Trade(Trade),
    ClearTradeVault(TradeId),
    ClearNationVault(NationId),
}

/// Writes applied together in one transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, write: Write) {
        self.writes.push(write);
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Write> {
        self.writes.iter()
    }

    pub fn merge(&mut self, other: WriteBatch) {
        self.writes.extend(other.writes);
    }

    pub async fn apply(&self, conn: &mut AnyConnection) -> Result<(), StoreError> {
        for write in &self.writes {
            match write {
                Write::Nation {
                    nation,
                    disbanded_at,
                } => upsert_nation(conn, nation, *disbanded_at).await?,
                Write::Member(member) => upsert_member(conn, member).await?,
                Write::War(war) => upsert_war(conn, war).await?,
                Write::Trade(trade) => upsert_trade(conn, trade).await?,
                Write::ClearTradeVault(id) => {
                    sqlx::query("DELETE FROM trade_vault_items WHERE trade_id = $1")
                        .bind(id.as_db())
                        .execute(&mut *conn)
                        .await?;
                }
                Write::ClearNationVault(id) => {
                    sqlx::query("DELETE FROM nation_vault_items WHERE nation_id = $1")
                        .bind(id.as_db())
                        .execute(&mut *conn)
                        .await?;
                }
            }
        }
        debug!(writes = self.writes.len(), "batch applied");
        Ok(())
    }
}

impl FromIterator<Write> for WriteBatch {
    fn from_iter<I: IntoIterator<Item = Write>>(iter: I) -> Self {
        Self {
            writes: iter.into_iter().collect(),
        }
    }
}

async fn upsert_nation(
    conn: &mut AnyConnection,
    nation: &Nation,
    disbanded_at: Option<DateTime<Utc>>,
) -> Result<(), StoreError> {
    sqlx::query(UPSERT_NATION)
        .bind(nation.id.as_db())
        .bind(nation.name.clone())
        .bind(nation.power)
        .bind(i64::from(nation.power_level))
        .bind(nation.bonus_power)
        .bind(i64::from(nation.admin_override))
        .bind(to_blob(&nation.claimed_chunks)?)
        .bind(to_blob(&nation.annexed_chunks)?)
        .bind(to_blob(&nation.alliance_ids)?)
        .bind(to_blob(&nation.war_ids)?)
        .bind(nation.president_id.as_db())
        .bind(to_blob(&nation.senator_ids)?)
        .bind(to_blob(&nation.soldier_ids)?)
        .bind(to_blob(&nation.citizen_ids)?)
        .bind(opt_millis(nation.last_victory_at))
        .bind(millis(nation.created_at))
        .bind(millis(nation.updated_at))
        .bind(opt_millis(disbanded_at))
        .bind(nation.revision as i64)
        .execute(conn)
        .await?;
    Ok(())
}

async fn upsert_member(conn: &mut AnyConnection, member: &Member) -> Result<(), StoreError> {
    sqlx::query(UPSERT_MEMBER)
        .bind(member.id.as_db())
        .bind(member.display_name.clone())
        .bind(member.nation_id.map(NationId::as_db))
        .bind(member.role.map(String::from))
        .bind(i64::from(member.soldier_lives))
        .bind(member.revision as i64)
        .execute(conn)
        .await?;
    Ok(())
}

async fn upsert_war(conn: &mut AnyConnection, war: &War) -> Result<(), StoreError> {
    sqlx::query(UPSERT_WAR)
        .bind(war.id.as_db())
        .bind(war.attacker_id.as_db())
        .bind(war.defender_id.as_db())
        .bind(i64::from(war.attacker_kills))
        .bind(i64::from(war.defender_kills))
        .bind(i64::from(war.required_kills))
        .bind(String::from(war.status))
        .bind(war.winner_id.map(NationId::as_db))
        .bind(millis(war.started_at))
        .bind(opt_millis(war.ended_at))
        .bind(war.revision as i64)
        .execute(conn)
        .await?;
    Ok(())
}

async fn upsert_trade(conn: &mut AnyConnection, trade: &Trade) -> Result<(), StoreError> {
    sqlx::query(UPSERT_TRADE)
        .bind(trade.id.as_db())
        .bind(trade.sending_id.as_db())
        .bind(trade.receiving_id.as_db())
        .bind(String::from(trade.status))
        .bind(i64::from(trade.consecutive_fulfillments))
        .bind(i64::from(trade.total_executions))
        .bind(trade.max_executions.map(i64::from))
        .bind(trade.volume_since_reward as i64)
        .bind(i64::from(trade.interval_minutes))
        .bind(opt_millis(trade.last_executed_at))
        .bind(opt_millis(trade.next_execution_at))
        .bind(millis(trade.created_at))
        .bind(trade.revision as i64)
        .execute(conn)
        .await?;
    Ok(())
}
