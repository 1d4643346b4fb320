//! Participant models

use chrono::{DateTime, Utc};

/// External address of a participant (the chat user id supplied by the transport)
pub type Address = i64;

/// A registered participant of the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: i64,
    pub name: String,
    pub address: Address,
    pub balance: i64,
    pub date_created: DateTime<Utc>,
}

/// Outcome of `ensure_participant`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub created: bool,
}
