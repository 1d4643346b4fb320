use thiserror::Error;

/// Errors raised by the ledger and the dialogue that drives it
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Name '{0}' is already taken")]
    NameTaken(String),
    #[error("Invalid name: {0}")]
    InvalidName(String),
    #[error("Unknown participant: {0}")]
    UnknownParticipant(String),
    #[error("Unknown target: {0}")]
    UnknownTarget(String),
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("A participant cannot owe themselves")]
    SameParticipant,
    #[error("No prior entry recorded by {0}")]
    NoPriorEntry(String),
    #[error("No active dialogue in the expected state for {0}")]
    NoActiveDialogue(String),
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),
}

impl LedgerError {
    /// Dialogue-protocol errors are recovered by restarting the conversation
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            LedgerError::UnknownCommand(_)
                | LedgerError::UnknownTarget(_)
                | LedgerError::InvalidAmount(_)
                | LedgerError::NoActiveDialogue(_)
        )
    }
}

/// Whether a database error came from a UNIQUE constraint
pub fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .map(|db_err| db_err.is_unique_violation())
        .unwrap_or(false)
}
