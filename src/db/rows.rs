//! Row codecs.
//!
//! Timestamps are epoch milliseconds, flags are 0/1, id sets and chunk sets
//! are JSON list blobs. Only `i64`, `f64` and `String` cross the driver
//! boundary so the same code serves both backends.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::Row;
use sqlx::any::AnyRow;

use crate::error::StoreError;
use crate::model::{Member, Nation, NationId, PlayerId, Role, Trade, TradeId, TradeStatus, War, WarId, WarStatus};

pub(crate) fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn opt_millis(at: Option<DateTime<Utc>>) -> Option<i64> {
    at.map(millis)
}

pub(crate) fn from_millis(raw: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(raw)
        .ok_or_else(|| StoreError::Malformed(format!("timestamp {raw} out of range")))
}

fn opt_from_millis(raw: Option<i64>) -> Result<Option<DateTime<Utc>>, StoreError> {
    raw.map(from_millis).transpose()
}

pub(crate) fn to_blob<T: Serialize>(value: &T) -> Result<String, StoreError> {
    Ok(serde_json::to_string(value)?)
}

fn from_blob<T: DeserializeOwned>(raw: &str) -> Result<T, StoreError> {
    Ok(serde_json::from_str(raw)?)
}

fn count(raw: i64, column: &str) -> Result<u32, StoreError> {
    u32::try_from(raw).map_err(|_| StoreError::Malformed(format!("{column} = {raw}")))
}

fn text_enum<T: TryFrom<String, Error = String>>(raw: String) -> Result<T, StoreError> {
    T::try_from(raw).map_err(StoreError::Malformed)
}

pub(crate) fn nation_from_row(row: &AnyRow) -> Result<Nation, StoreError> {
    let level: i64 = row.try_get("power_level")?;
    Ok(Nation {
        id: NationId::from_db(row.try_get("id")?),
        name: row.try_get("name")?,
        power: row.try_get("power")?,
        power_level: u8::try_from(level)
            .map_err(|_| StoreError::Malformed(format!("power_level = {level}")))?,
        bonus_power: row.try_get("bonus_power")?,
        admin_override: row.try_get::<i64, _>("admin_override")? != 0,
        claimed_chunks: from_blob(&row.try_get::<String, _>("claimed_chunks")?)?,
        annexed_chunks: from_blob(&row.try_get::<String, _>("annexed_chunks")?)?,
        alliance_ids: from_blob(&row.try_get::<String, _>("alliance_ids")?)?,
        war_ids: from_blob(&row.try_get::<String, _>("war_ids")?)?,
        president_id: PlayerId::from_db(row.try_get("president_id")?),
        senator_ids: from_blob(&row.try_get::<String, _>("senator_ids")?)?,
        soldier_ids: from_blob(&row.try_get::<String, _>("soldier_ids")?)?,
        citizen_ids: from_blob(&row.try_get::<String, _>("citizen_ids")?)?,
        last_victory_at: opt_from_millis(row.try_get("last_victory_at")?)?,
        created_at: from_millis(row.try_get("created_at")?)?,
        updated_at: from_millis(row.try_get("updated_at")?)?,
        revision: row.try_get::<i64, _>("revision")? as u64,
    })
}

pub(crate) fn member_from_row(row: &AnyRow) -> Result<Member, StoreError> {
    let role: Option<String> = row.try_get("role")?;
    Ok(Member {
        id: PlayerId::from_db(row.try_get("id")?),
        display_name: row.try_get("display_name")?,
        nation_id: row.try_get::<Option<i64>, _>("nation_id")?.map(NationId::from_db),
        role: role.map(text_enum::<Role>).transpose()?,
        soldier_lives: count(row.try_get("soldier_lives")?, "soldier_lives")?,
        revision: row.try_get::<i64, _>("revision")? as u64,
    })
}

pub(crate) fn war_from_row(row: &AnyRow) -> Result<War, StoreError> {
    Ok(War {
        id: WarId::from_db(row.try_get("id")?),
        attacker_id: NationId::from_db(row.try_get("attacker_id")?),
        defender_id: NationId::from_db(row.try_get("defender_id")?),
        attacker_kills: count(row.try_get("attacker_kills")?, "attacker_kills")?,
        defender_kills: count(row.try_get("defender_kills")?, "defender_kills")?,
        required_kills: count(row.try_get("required_kills")?, "required_kills")?,
        status: text_enum::<WarStatus>(row.try_get("status")?)?,
        winner_id: row.try_get::<Option<i64>, _>("winner_id")?.map(NationId::from_db),
        started_at: from_millis(row.try_get("started_at")?)?,
        ended_at: opt_from_millis(row.try_get("ended_at")?)?,
        revision: row.try_get::<i64, _>("revision")? as u64,
    })
}

pub(crate) fn trade_from_row(row: &AnyRow) -> Result<Trade, StoreError> {
    let max: Option<i64> = row.try_get("max_executions")?;
    Ok(Trade {
        id: TradeId::from_db(row.try_get("id")?),
        sending_id: NationId::from_db(row.try_get("sending_id")?),
        receiving_id: NationId::from_db(row.try_get("receiving_id")?),
        status: text_enum::<TradeStatus>(row.try_get("status")?)?,
        consecutive_fulfillments: count(
            row.try_get("consecutive_fulfillments")?,
            "consecutive_fulfillments",
        )?,
        total_executions: count(row.try_get("total_executions")?, "total_executions")?,
        max_executions: max.map(|m| count(m, "max_executions")).transpose()?,
        volume_since_reward: row.try_get::<i64, _>("volume_since_reward")? as u64,
        interval_minutes: count(row.try_get("interval_minutes")?, "interval_minutes")?,
        last_executed_at: opt_from_millis(row.try_get("last_executed_at")?)?,
        next_execution_at: opt_from_millis(row.try_get("next_execution_at")?)?,
        created_at: from_millis(row.try_get("created_at")?)?,
        revision: row.try_get::<i64, _>("revision")? as u64,
    })
}
