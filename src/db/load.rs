use sqlx::{AnyConnection, Row};
use tracing::info;

use super::coordinator::Coordinator;
use super::rows::{member_from_row, nation_from_row, trade_from_row, war_from_row};
use crate::error::StoreError;
use crate::model::{Member, Nation, Trade, War};

/// Everything the engine needs at startup.
#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    /// Nations that are not disbanded.
    pub nations: Vec<Nation>,
    pub members: Vec<Member>,
    /// Active wars only.
    pub wars: Vec<War>,
    /// Pending and Active trades only.
    pub trades: Vec<Trade>,
    /// Highest id in any id-bearing table, tombstones and history included.
    pub highest_id: u64,
}

/// Read the live state from the store in one unit of work.
pub async fn load_snapshot(coordinator: &Coordinator) -> Result<Snapshot, StoreError> {
    let snapshot = coordinator
        .unit_of_work("load", |conn| Box::pin(read_snapshot(conn)))
        .await?;
    info!(
        nations = snapshot.nations.len(),
        members = snapshot.members.len(),
        wars = snapshot.wars.len(),
        trades = snapshot.trades.len(),
        highest_id = snapshot.highest_id,
        "state loaded"
    );
    Ok(snapshot)
}

async fn read_snapshot(conn: &mut AnyConnection) -> Result<Snapshot, StoreError> {
    let nations = sqlx::query("SELECT * FROM nations WHERE disbanded_at IS NULL ORDER BY id")
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(nation_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    let members = sqlx::query("SELECT * FROM members ORDER BY id")
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(member_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    let wars = sqlx::query("SELECT * FROM wars WHERE status = 'active' ORDER BY id")
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(war_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    let trades = sqlx::query(
        "SELECT * FROM trades WHERE status IN ('pending', 'active') ORDER BY id",
    )
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(trade_from_row)
    .collect::<Result<Vec<_>, _>>()?;

    let mut highest_id = 0u64;
    for table in ["nations", "wars", "trades"] {
        let row = sqlx::query(&format!("SELECT COALESCE(MAX(id), 0) AS top FROM {table}"))
            .fetch_one(&mut *conn)
            .await?;
        let top: i64 = row.try_get("top")?;
        highest_id = highest_id.max(top.max(0) as u64);
    }

    Ok(Snapshot {
        nations,
        members,
        wars,
        trades,
        highest_id,
    })
}
