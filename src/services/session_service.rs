use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::models::{Address, DialogueState, Direction, Session, MAX_AMOUNT};
use crate::utils::errors::LedgerError;

/// Token that removes the last buffered digit
pub const BACKSPACE_TOKEN: &str = "<<";

/// Open debt-entry dialogues keyed by participant name, plus the set of
/// unregistered addresses that were asked for a display name.
///
/// Nothing here is persisted: a restart drops every open dialogue.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<String, Session>,
    awaiting_name: HashSet<Address>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, participant: &str) -> DialogueState {
        self.sessions
            .get(participant)
            .map(|s| s.state)
            .unwrap_or(DialogueState::None)
    }

    pub fn session(&self, participant: &str) -> Option<&Session> {
        self.sessions.get(participant)
    }

    /// Start a dialogue, discarding any previous one
    pub fn begin(&mut self, participant: &str, direction: Direction) {
        debug!("{} begins a {:?} dialogue", participant, direction);
        self.sessions.insert(participant.to_string(), Session::new(direction));
    }

    /// Select the counterpart; valid only while awaiting a target
    pub fn set_target(&mut self, participant: &str, target: &str) -> Result<(), LedgerError> {
        let session = self
            .sessions
            .get_mut(participant)
            .filter(|s| matches!(s.state, DialogueState::AwaitingTarget(_)))
            .ok_or_else(|| LedgerError::NoActiveDialogue(participant.to_string()))?;

        session.target = Some(target.to_string());
        session.amount_buffer.clear();
        session.state = DialogueState::AwaitingAmount;
        Ok(())
    }

    /// Feed one keypad token into the amount buffer.
    ///
    /// Returns the buffer text and whether the token itself completed the
    /// amount (a multi-digit paste). Unrecognised tokens change nothing.
    pub fn feed_digit(&mut self, participant: &str, token: &str) -> Result<(String, bool), LedgerError> {
        let session = self.amount_session(participant)?;
        let buffer = &mut session.amount_buffer;

        let mut complete = false;
        if token == BACKSPACE_TOKEN {
            buffer.pop();
        } else if !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()) {
            if token.len() > 1 {
                *buffer = token.to_string();
                complete = true;
            } else {
                buffer.push_str(token);
            }
        }

        Ok((buffer.clone(), complete))
    }

    /// Parse the buffer into an amount in `1..=MAX_AMOUNT` and move on to the comment step
    pub fn finalize_amount(&mut self, participant: &str) -> Result<i64, LedgerError> {
        let session = self.amount_session(participant)?;

        let amount = session
            .amount_buffer
            .parse::<i64>()
            .ok()
            .filter(|amount| (1..=MAX_AMOUNT).contains(amount))
            .ok_or_else(|| LedgerError::InvalidAmount(session.amount_buffer.clone()))?;

        session.state = DialogueState::AwaitingComment;
        Ok(amount)
    }

    /// Close a finished dialogue
    pub fn complete(&mut self, participant: &str) {
        if self.sessions.remove(participant).is_some() {
            debug!("{} completed a dialogue", participant);
        }
    }

    /// Force the participant back to `None` from any state
    pub fn reset(&mut self, participant: &str) {
        if self.sessions.remove(participant).is_some() {
            debug!("{} dialogue reset", participant);
        }
    }

    pub fn await_name(&mut self, address: Address) {
        self.awaiting_name.insert(address);
    }

    pub fn is_awaiting_name(&self, address: Address) -> bool {
        self.awaiting_name.contains(&address)
    }

    pub fn clear_name_wait(&mut self, address: Address) {
        self.awaiting_name.remove(&address);
    }

    fn amount_session(&mut self, participant: &str) -> Result<&mut Session, LedgerError> {
        self.sessions
            .get_mut(participant)
            .filter(|s| s.state == DialogueState::AwaitingAmount)
            .ok_or_else(|| LedgerError::NoActiveDialogue(participant.to_string()))
    }
}
