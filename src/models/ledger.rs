//! Ledger entry models

use chrono::{DateTime, Utc};

/// Largest amount a single entry may carry
pub const MAX_AMOUNT: i64 = i32::MAX as i64;

/// One recorded transaction: `slave` owes `master` the `amount`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub id: i64,
    pub uuid: String,
    pub operator: String,
    pub master: String,
    pub slave: String,
    pub amount: i64,
    pub date_created: DateTime<Utc>,
    pub comment: String,
}

/// Which side of an entry the queried participant was on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Master,
    Slave,
}

/// A ledger entry seen from one participant's perspective
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryItem {
    pub entry_id: i64,
    pub date_created: DateTime<Utc>,
    pub role: Role,
    pub counterpart: String,
    /// Positive when the counterpart owes the participant
    pub signed_amount: i64,
    pub comment: String,
}
