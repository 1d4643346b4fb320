//! Debt-entry dialogue models

/// Whether the initiating participant is the debtor or the creditor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Initiator owes the target (initiator is the slave)
    IPay,
    /// Target owes the initiator (initiator is the master)
    PayMe,
}

impl Direction {
    /// Order `(self_name, target)` into `(master, slave)`
    pub fn master_slave<'a>(&self, me: &'a str, target: &'a str) -> (&'a str, &'a str) {
        match self {
            Direction::IPay => (target, me),
            Direction::PayMe => (me, target),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DialogueState {
    #[default]
    None,
    AwaitingTarget(Direction),
    AwaitingAmount,
    AwaitingComment,
}

/// An open dialogue for one participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub state: DialogueState,
    pub direction: Direction,
    pub target: Option<String>,
    pub amount_buffer: String,
}

impl Session {
    pub fn new(direction: Direction) -> Self {
        Session {
            state: DialogueState::AwaitingTarget(direction),
            direction,
            target: None,
            amount_buffer: String::new(),
        }
    }
}
