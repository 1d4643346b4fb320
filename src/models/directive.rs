//! Transport-neutral message types

use super::participant::Address;

/// One text message received from a participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub address: Address,
    pub text: String,
    /// Display name the transport already knows for this address, if any
    pub display_name: Option<String>,
}

impl InboundEvent {
    pub fn new(address: Address, text: impl Into<String>) -> Self {
        InboundEvent {
            address,
            text: text.into(),
            display_name: None,
        }
    }
}

/// Selectable replies attached to an outbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyboard {
    /// Leave whatever the participant currently sees
    Keep,
    /// Rows of buttons, each sending its label back as text
    Grid(Vec<Vec<String>>),
    /// Digit pad with backspace (`<<`) and confirmation (`OK`)
    DigitPad,
    /// No buttons, free text expected next
    Remove,
}

/// Layout of the digit pad
pub const DIGIT_PAD: [[&str; 3]; 4] = [
    ["1", "2", "3"],
    ["4", "5", "6"],
    ["7", "8", "9"],
    ["<<", "0", "OK"],
];

impl Keyboard {
    /// Chunk labels into a grid of `columns` buttons per row
    pub fn grid<S: AsRef<str>>(labels: &[S], columns: usize) -> Self {
        let columns = columns.max(1);
        Keyboard::Grid(
            labels
                .chunks(columns)
                .map(|row| row.iter().map(|l| l.as_ref().to_string()).collect())
                .collect(),
        )
    }

    /// Button rows to render, `None` when the keyboard carries no buttons
    pub fn rows(&self) -> Option<Vec<Vec<String>>> {
        match self {
            Keyboard::Keep | Keyboard::Remove => None,
            Keyboard::Grid(rows) => Some(rows.clone()),
            Keyboard::DigitPad => Some(
                DIGIT_PAD
                    .iter()
                    .map(|row| row.iter().map(|l| l.to_string()).collect())
                    .collect(),
            ),
        }
    }
}

/// Longest text a directive may carry (Discord's message content limit)
pub const MAX_TEXT_CHARS: usize = 2000;

/// An outbound message for the transport to deliver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub address: Address,
    pub text: String,
    pub keyboard: Keyboard,
}

impl Directive {
    pub fn new(address: Address, text: impl Into<String>, keyboard: Keyboard) -> Self {
        Directive {
            address,
            text: text.into(),
            keyboard,
        }
    }
}
