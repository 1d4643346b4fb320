use std::collections::BTreeMap;

use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use tracing::{debug, info, warn};

use crate::db;
use crate::models::{Address, HistoryItem, LedgerEntry, Participant, Registration, Role, MAX_AMOUNT};
use crate::utils::errors::{is_unique_violation, LedgerError};

/// Participants, balances, the pairwise relation cache and the audit log
#[derive(Clone)]
pub struct LedgerStore {
    pool: SqlitePool,
}

impl LedgerStore {
    pub fn new(pool: SqlitePool) -> Self {
        LedgerStore { pool }
    }

    /// Register `name` for `address` unless the address is already on file.
    ///
    /// Names are immutable: an address that is already registered keeps its
    /// name and the call reports `created: false`.
    pub async fn ensure_participant(&self, name: &str, address: Address) -> Result<Registration, LedgerError> {
        let mut tx = self.pool.begin().await?;

        if db::participant::get_by_address(&mut *tx, address).await?.is_some() {
            return Ok(Registration { created: false });
        }

        if db::participant::get_id_by_name(&mut *tx, name).await?.is_some() {
            return Err(LedgerError::NameTaken(name.to_string()));
        }

        match db::participant::create_participant(&mut *tx, name, address).await {
            Ok(id) => debug!("Created participant {} (id {}, address {})", name, id, address),
            Err(e) if is_unique_violation(&e) => return Err(LedgerError::NameTaken(name.to_string())),
            Err(e) => return Err(e.into()),
        }

        tx.commit().await?;
        info!("Registered participant {} at address {}", name, address);

        Ok(Registration { created: true })
    }

    pub async fn find_by_address(&self, address: Address) -> Result<Option<Participant>, LedgerError> {
        Ok(db::participant::get_by_address(&self.pool, address).await?)
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Participant>, LedgerError> {
        Ok(db::participant::get_by_name(&self.pool, name).await?)
    }

    /// Names of every participant except `except`, for target pickers
    pub async fn list_names(&self, except: &str) -> Result<Vec<String>, LedgerError> {
        Ok(db::participant::list_names_except(&self.pool, except).await?)
    }

    /// Record that `slave` owes `master` the `amount`, on behalf of `operator`.
    ///
    /// Both balances, both relation rows and the log entry are written in one
    /// database transaction. Amounts above `MAX_AMOUNT`, or entries that would
    /// overflow a balance, are rejected with `InvalidAmount` and nothing is written.
    pub async fn record_transaction(
        &self,
        operator: &str,
        master: &str,
        slave: &str,
        amount: i64,
    ) -> Result<LedgerEntry, LedgerError> {
        if amount <= 0 || amount > MAX_AMOUNT {
            return Err(LedgerError::InvalidAmount(amount.to_string()));
        }

        // START ATOMIC TRANSACTION
        let mut tx = self.pool.begin().await?;

        let operator_id = resolve_id(&mut tx, operator).await?;
        let master_id = resolve_id(&mut tx, master).await?;
        let slave_id = resolve_id(&mut tx, slave).await?;

        if master_id == slave_id {
            return Err(LedgerError::SameParticipant);
        }

        // SQLite turns an overflowing integer sum into REAL, so check before writing
        let overflows = {
            let master_balance = db::participant::get_balance_by_id(&mut *tx, master_id).await?.unwrap_or(0);
            let slave_balance = db::participant::get_balance_by_id(&mut *tx, slave_id).await?.unwrap_or(0);
            let forward = db::relation::get_relation(&mut *tx, master_id, slave_id).await?.unwrap_or(0);
            let backward = db::relation::get_relation(&mut *tx, slave_id, master_id).await?.unwrap_or(0);

            master_balance.checked_add(amount).is_none()
                || slave_balance.checked_sub(amount).is_none()
                || forward.checked_add(amount).is_none()
                || backward.checked_sub(amount).is_none()
        };
        if overflows {
            warn!("Entry {} -> {} : {} would overflow a balance", master, slave, amount);
            return Err(LedgerError::InvalidAmount(amount.to_string()));
        }

        db::participant::update_balance(&mut *tx, master_id, amount).await?;
        db::participant::update_balance(&mut *tx, slave_id, -amount).await?;

        db::relation::add_to_relation(&mut *tx, master_id, slave_id, amount).await?;
        db::relation::add_to_relation(&mut *tx, slave_id, master_id, -amount).await?;

        let uuid = uuid::Uuid::new_v4().to_string();
        let date_created = Utc::now();
        let entry_id = db::ledger_entry::create_entry(
            &mut *tx,
            &uuid,
            operator_id,
            master_id,
            slave_id,
            amount,
            date_created,
        )
        .await?;

        tx.commit().await?;

        info!(
            "Recorded entry {} ({}): {} -> {} : {} by {}",
            entry_id, uuid, master, slave, amount, operator
        );

        Ok(LedgerEntry {
            id: entry_id,
            uuid,
            operator: operator.to_string(),
            master: master.to_string(),
            slave: slave.to_string(),
            amount,
            date_created,
            comment: String::new(),
        })
    }

    /// Overwrite the comment of the operator's newest entry and describe that entry
    pub async fn attach_comment_to_last_entry(&self, operator: &str, comment: &str) -> Result<String, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let operator_id = resolve_id(&mut tx, operator).await?;
        let entry = db::ledger_entry::get_last_by_operator(&mut *tx, operator_id)
            .await?
            .ok_or_else(|| LedgerError::NoPriorEntry(operator.to_string()))?;

        db::ledger_entry::set_comment(&mut *tx, entry.id, comment).await?;
        tx.commit().await?;

        debug!("Comment attached to entry {} by {}", entry.id, operator);

        Ok(format!("{} -> {} : {} - {}", entry.master, entry.slave, entry.amount, comment))
    }

    /// Net balance of a participant, 0 if unknown
    pub async fn get_balance(&self, name: &str) -> Result<i64, LedgerError> {
        Ok(db::participant::get_balance(&self.pool, name).await?.unwrap_or(0))
    }

    /// Counterpart name -> signed balance ("counterpart owes `name`")
    pub async fn get_outstanding_relations(
        &self,
        name: &str,
        nonzero_only: bool,
    ) -> Result<BTreeMap<String, i64>, LedgerError> {
        let Some(id) = db::participant::get_id_by_name(&self.pool, name).await? else {
            return Ok(BTreeMap::new());
        };

        Ok(db::relation::get_relations_for(&self.pool, id)
            .await?
            .into_iter()
            .filter(|(_, balance)| !nonzero_only || *balance != 0)
            .collect())
    }

    /// Newest `limit` entries involving `name`, returned oldest first
    pub async fn get_recent_history(&self, name: &str, limit: u32) -> Result<Vec<HistoryItem>, LedgerError> {
        let Some(id) = db::participant::get_id_by_name(&self.pool, name).await? else {
            return Ok(Vec::new());
        };

        let mut entries = db::ledger_entry::get_recent_for(&self.pool, id, limit).await?;
        entries.reverse();

        Ok(entries
            .into_iter()
            .map(|entry| {
                let (role, counterpart, signed_amount) = if entry.master == name {
                    (Role::Master, entry.slave, entry.amount)
                } else {
                    (Role::Slave, entry.master, -entry.amount)
                };
                HistoryItem {
                    entry_id: entry.id,
                    date_created: entry.date_created,
                    role,
                    counterpart,
                    signed_amount,
                    comment: entry.comment,
                }
            })
            .collect())
    }

    #[cfg(test)]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn resolve_id(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, name: &str) -> Result<i64, LedgerError> {
    db::participant::get_id_by_name(&mut **tx, name)
        .await?
        .ok_or_else(|| LedgerError::UnknownParticipant(name.to_string()))
}
