use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite};

use crate::models::{Address, Participant};

type ParticipantRow = (i64, String, i64, i64, DateTime<Utc>);

const SELECT_PARTICIPANT: &str =
    "SELECT id, name, address, balance, date_created FROM participant";

fn from_row(row: ParticipantRow) -> Participant {
    Participant {
        id: row.0,
        name: row.1,
        address: row.2,
        balance: row.3,
        date_created: row.4,
    }
}

/// Insert a participant with a zero balance, returning its id
pub async fn create_participant<'e, E>(
    executor: E,
    name: &str,
    address: Address,
) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "INSERT INTO participant (name, address, balance, date_created) VALUES (?, ?, 0, ?)",
    )
    .bind(name)
    .bind(address)
    .bind(Utc::now())
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn get_by_address<'e, E>(
    executor: E,
    address: Address,
) -> Result<Option<Participant>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, ParticipantRow>(&format!("{} WHERE address = ?", SELECT_PARTICIPANT))
        .bind(address)
        .fetch_optional(executor)
        .await?;

    Ok(row.map(from_row))
}

pub async fn get_by_name<'e, E>(executor: E, name: &str) -> Result<Option<Participant>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, ParticipantRow>(&format!("{} WHERE name = ?", SELECT_PARTICIPANT))
        .bind(name)
        .fetch_optional(executor)
        .await?;

    Ok(row.map(from_row))
}

/// Get participant ID by name
pub async fn get_id_by_name<'e, E>(executor: E, name: &str) -> Result<Option<i64>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar::<_, i64>("SELECT id FROM participant WHERE name = ?")
        .bind(name)
        .fetch_optional(executor)
        .await
}

/// All names except `except`, alphabetically
pub async fn list_names_except<'e, E>(executor: E, except: &str) -> Result<Vec<String>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar::<_, String>("SELECT name FROM participant WHERE name <> ? ORDER BY name")
        .bind(except)
        .fetch_all(executor)
        .await
}

pub async fn get_balance<'e, E>(executor: E, name: &str) -> Result<Option<i64>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar::<_, i64>("SELECT balance FROM participant WHERE name = ?")
        .bind(name)
        .fetch_optional(executor)
        .await
}

pub async fn get_balance_by_id<'e, E>(executor: E, participant_id: i64) -> Result<Option<i64>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar::<_, i64>("SELECT balance FROM participant WHERE id = ?")
        .bind(participant_id)
        .fetch_optional(executor)
        .await
}

/// Add a signed delta to a participant's balance
pub async fn update_balance<'e, E>(executor: E, participant_id: i64, delta: i64) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE participant SET balance = balance + ? WHERE id = ?")
        .bind(delta)
        .bind(participant_id)
        .execute(executor)
        .await?;

    Ok(())
}
