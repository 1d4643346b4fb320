use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite};

use crate::models::LedgerEntry;

/// (id, uuid, operator, master, slave, amount, date_created, comment)
type EntryRow = (i64, String, String, String, String, i64, DateTime<Utc>, String);

const SELECT_ENTRY: &str = "SELECT e.id, e.uuid, o.name, m.name, s.name, e.amount, e.date_created, e.comment \
     FROM ledger_entry e \
     JOIN participant o ON o.id = e.operator_id \
     JOIN participant m ON m.id = e.master_id \
     JOIN participant s ON s.id = e.slave_id";

fn from_row(row: EntryRow) -> LedgerEntry {
    LedgerEntry {
        id: row.0,
        uuid: row.1,
        operator: row.2,
        master: row.3,
        slave: row.4,
        amount: row.5,
        date_created: row.6,
        comment: row.7,
    }
}

/// Append an entry with an empty comment, returning its id
pub async fn create_entry<'e, E>(
    executor: E,
    uuid: &str,
    operator_id: i64,
    master_id: i64,
    slave_id: i64,
    amount: i64,
    date_created: DateTime<Utc>,
) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "INSERT INTO ledger_entry (uuid, operator_id, master_id, slave_id, amount, date_created, comment) \
         VALUES (?, ?, ?, ?, ?, ?, '')",
    )
    .bind(uuid)
    .bind(operator_id)
    .bind(master_id)
    .bind(slave_id)
    .bind(amount)
    .bind(date_created)
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Most recent entry authored by an operator
pub async fn get_last_by_operator<'e, E>(
    executor: E,
    operator_id: i64,
) -> Result<Option<LedgerEntry>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, EntryRow>(&format!(
        "{} WHERE e.operator_id = ? ORDER BY e.id DESC LIMIT 1",
        SELECT_ENTRY
    ))
    .bind(operator_id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(from_row))
}

pub async fn set_comment<'e, E>(executor: E, entry_id: i64, comment: &str) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE ledger_entry SET comment = ? WHERE id = ?")
        .bind(comment)
        .bind(entry_id)
        .execute(executor)
        .await?;

    Ok(())
}

/// Newest `limit` entries where the participant is master or slave, newest first
pub async fn get_recent_for<'e, E>(
    executor: E,
    participant_id: i64,
    limit: u32,
) -> Result<Vec<LedgerEntry>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, EntryRow>(&format!(
        "{} WHERE e.master_id = ? OR e.slave_id = ? ORDER BY e.id DESC LIMIT ?",
        SELECT_ENTRY
    ))
    .bind(participant_id)
    .bind(participant_id)
    .bind(i64::from(limit))
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(from_row).collect())
}

/// Every entry, oldest first
#[cfg(test)]
pub async fn get_all<'e, E>(executor: E) -> Result<Vec<LedgerEntry>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, EntryRow>(&format!("{} ORDER BY e.id", SELECT_ENTRY))
        .fetch_all(executor)
        .await?;

    Ok(rows.into_iter().map(from_row).collect())
}
