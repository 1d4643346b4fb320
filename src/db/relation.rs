use sqlx::{Executor, Sqlite};

/// Add `delta` to relation(source, target), creating the row on first use
pub async fn add_to_relation<'e, E>(
    executor: E,
    source_id: i64,
    target_id: i64,
    delta: i64,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO relation (source_id, target_id, balance) VALUES (?, ?, ?) \
         ON CONFLICT (source_id, target_id) DO UPDATE SET balance = balance + excluded.balance",
    )
    .bind(source_id)
    .bind(target_id)
    .bind(delta)
    .execute(executor)
    .await?;

    Ok(())
}

/// Relations out of a participant - returns (counterpart_name, balance)
pub async fn get_relations_for<'e, E>(
    executor: E,
    source_id: i64,
) -> Result<Vec<(String, i64)>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, (String, i64)>(
        "SELECT p.name, r.balance FROM relation r \
         JOIN participant p ON p.id = r.target_id \
         WHERE r.source_id = ? ORDER BY p.name",
    )
    .bind(source_id)
    .fetch_all(executor)
    .await
}

/// Current value of relation(source, target), if the row exists
pub async fn get_relation<'e, E>(
    executor: E,
    source_id: i64,
    target_id: i64,
) -> Result<Option<i64>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar::<_, i64>("SELECT balance FROM relation WHERE source_id = ? AND target_id = ?")
        .bind(source_id)
        .bind(target_id)
        .fetch_optional(executor)
        .await
}
