//! Data models for the ledger and the dialogue
//!
//! Rows read from the ledger tables, the per-participant dialogue state,
//! and the transport-neutral inbound/outbound message types.

pub mod participant;
pub mod ledger;
pub mod dialogue;
pub mod directive;

// Re-export commonly used types for convenience
pub use participant::{Address, Participant, Registration};
pub use ledger::{HistoryItem, LedgerEntry, Role, MAX_AMOUNT};
pub use dialogue::{DialogueState, Direction, Session};
pub use directive::{Directive, InboundEvent, Keyboard, MAX_TEXT_CHARS};
