use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::models::{
    Address, DialogueState, Direction, Directive, InboundEvent, Keyboard, Participant, MAX_TEXT_CHARS,
};
use crate::services::ledger_service::LedgerStore;
use crate::services::session_service::SessionStore;
use crate::utils::errors::LedgerError;
use crate::utils::{Align, Table};

/// Always returns the participant to the main menu
pub const RESTART_TOKEN: &str = "/start";
/// Asks for (or reports) the participant's display name
pub const NAME_TOKEN: &str = "/name";
/// Confirms the amount typed on the digit pad
pub const CONFIRM_TOKEN: &str = "OK";

pub const MENU_I_OWE: &str = "I owe someone";
pub const MENU_OWES_ME: &str = "Someone owes me";
pub const MENU_BALANCE: &str = "Balance";
pub const MENU_HISTORY: &str = "History";

const NAME_MAX_CHARS: usize = 32;
const COMMENT_MAX_CHARS: usize = 100;
const PICKER_COLUMNS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuAction {
    Begin(Direction),
    Balance,
    History,
}

impl MenuAction {
    fn from_label(label: &str) -> Option<Self> {
        match label {
            MENU_I_OWE => Some(MenuAction::Begin(Direction::IPay)),
            MENU_OWES_ME => Some(MenuAction::Begin(Direction::PayMe)),
            MENU_BALANCE => Some(MenuAction::Balance),
            MENU_HISTORY => Some(MenuAction::History),
            _ => None,
        }
    }
}

fn main_menu_keyboard() -> Keyboard {
    Keyboard::grid(&[MENU_I_OWE, MENU_OWES_ME, MENU_BALANCE, MENU_HISTORY], 2)
}

fn main_menu(address: Address) -> Directive {
    Directive::new(address, "What would you like to do?", main_menu_keyboard())
}

/// Turns inbound text into ledger operations and reply directives.
///
/// Messages from one address are handled strictly one at a time, in the order
/// they acquire that address's lock.
pub struct DialogueController {
    ledger: LedgerStore,
    sessions: Mutex<SessionStore>,
    address_locks: StdMutex<HashMap<Address, Arc<Mutex<()>>>>,
    history_limit: u32,
}

impl DialogueController {
    pub fn new(ledger: LedgerStore, history_limit: u32) -> Self {
        DialogueController {
            ledger,
            sessions: Mutex::new(SessionStore::new()),
            address_locks: StdMutex::new(HashMap::new()),
            history_limit,
        }
    }

    /// Handle one inbound message and return what to send back
    pub async fn handle(&self, event: &InboundEvent) -> Vec<Directive> {
        let lock = self.address_lock(event.address);
        let directives = {
            let _guard = lock.lock().await;

            let text = event.text.trim();
            debug!("Handling message from {}: {:?}", event.address, text);

            match self.dispatch(event, text).await {
                Ok(directives) => directives,
                Err(e) => {
                    error!("Failed to handle message from {}: {}", event.address, e);
                    vec![Directive::new(
                        event.address,
                        format!("⚠️ Something went wrong, nothing was saved. Please try again or send {}.", RESTART_TOKEN),
                        Keyboard::Remove,
                    )]
                }
            }
        };

        drop(lock);
        self.release_address_lock(event.address);
        directives
    }

    fn address_lock(&self, address: Address) -> Arc<Mutex<()>> {
        let mut locks = self
            .address_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(address).or_default().clone()
    }

    /// Forget the address's lock once no task holds or waits on it
    fn release_address_lock(&self, address: Address) {
        let mut locks = self
            .address_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if locks.get(&address).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&address);
        }
    }

    async fn dispatch(&self, event: &InboundEvent, text: &str) -> Result<Vec<Directive>, LedgerError> {
        let Some(participant) = self.ledger.find_by_address(event.address).await? else {
            return self.handle_unregistered(event, text).await;
        };
        let me = participant.name.as_str();

        if text == RESTART_TOKEN {
            let mut sessions = self.sessions.lock().await;
            sessions.reset(me);
            sessions.clear_name_wait(participant.address);
            return Ok(vec![main_menu(participant.address)]);
        }

        if text == NAME_TOKEN {
            return Ok(vec![
                Directive::new(
                    participant.address,
                    format!("You are registered as {}. Names cannot be changed.", me),
                    Keyboard::Keep,
                ),
                main_menu(participant.address),
            ]);
        }

        match self.advance(&participant, text).await {
            Ok(directives) => Ok(directives),
            Err(e) if e.is_protocol_error() => {
                debug!("Restarting dialogue for {}: {}", me, e);
                self.sessions.lock().await.reset(me);
                Ok(recovery(participant.address, &e))
            }
            Err(e) => {
                self.sessions.lock().await.reset(me);
                Err(e)
            }
        }
    }

    async fn advance(&self, participant: &Participant, text: &str) -> Result<Vec<Directive>, LedgerError> {
        let state = self.sessions.lock().await.state(&participant.name);
        match state {
            DialogueState::None => self.handle_menu(participant, text).await,
            DialogueState::AwaitingTarget(_) => self.handle_target(participant, text).await,
            DialogueState::AwaitingAmount => self.handle_amount(participant, text).await,
            DialogueState::AwaitingComment => self.handle_comment(participant, text).await,
        }
    }

    async fn handle_menu(&self, participant: &Participant, text: &str) -> Result<Vec<Directive>, LedgerError> {
        let action = MenuAction::from_label(text).ok_or_else(|| LedgerError::UnknownCommand(text.to_string()))?;
        let address = participant.address;

        match action {
            MenuAction::Begin(direction) => {
                let names = self.ledger.list_names(&participant.name).await?;
                if names.is_empty() {
                    return Ok(vec![
                        Directive::new(address, "Nobody else is registered yet.", Keyboard::Keep),
                        main_menu(address),
                    ]);
                }

                self.sessions.lock().await.begin(&participant.name, direction);
                Ok(vec![Directive::new(
                    address,
                    "Who is it about?",
                    Keyboard::grid(&names, PICKER_COLUMNS),
                )])
            }
            MenuAction::Balance => Ok(vec![Directive::new(
                address,
                self.balance_text(&participant.name).await?,
                main_menu_keyboard(),
            )]),
            MenuAction::History => Ok(vec![Directive::new(
                address,
                self.history_text(&participant.name).await?,
                main_menu_keyboard(),
            )]),
        }
    }

    async fn handle_target(&self, participant: &Participant, text: &str) -> Result<Vec<Directive>, LedgerError> {
        if text == participant.name || self.ledger.find_by_name(text).await?.is_none() {
            return Err(LedgerError::UnknownTarget(text.to_string()));
        }

        self.sessions.lock().await.set_target(&participant.name, text)?;
        Ok(vec![Directive::new(participant.address, "How much?", Keyboard::DigitPad)])
    }

    async fn handle_amount(&self, participant: &Participant, text: &str) -> Result<Vec<Directive>, LedgerError> {
        let me = participant.name.as_str();
        let address = participant.address;

        let (amount, direction, target) = {
            let mut sessions = self.sessions.lock().await;

            if !text.eq_ignore_ascii_case(CONFIRM_TOKEN) {
                let (buffer, complete) = sessions.feed_digit(me, text)?;
                if !complete {
                    let shown = if buffer.is_empty() { "(empty)" } else { buffer.as_str() };
                    return Ok(vec![Directive::new(address, format!("Amount: {}", shown), Keyboard::Keep)]);
                }
            }

            let amount = sessions.finalize_amount(me)?;
            let session = sessions
                .session(me)
                .ok_or_else(|| LedgerError::NoActiveDialogue(me.to_string()))?;
            let target = session
                .target
                .clone()
                .ok_or_else(|| LedgerError::NoActiveDialogue(me.to_string()))?;
            (amount, session.direction, target)
        };

        let (master, slave) = direction.master_slave(me, &target);
        let entry = self.ledger.record_transaction(me, master, slave, amount).await?;

        let mut directives = vec![Directive::new(
            address,
            format!(
                "Got it: {} (ref {})\nHow should I label it? Send a comment, or {} to skip.",
                amount, entry.uuid, RESTART_TOKEN
            ),
            Keyboard::Remove,
        )];

        if let Some(counterpart) = self.ledger.find_by_name(&target).await? {
            let notice = match direction {
                Direction::IPay => format!("{} says they owe you {}", me, amount),
                Direction::PayMe => format!("{} says you owe them {}", me, amount),
            };
            directives.push(Directive::new(counterpart.address, notice, Keyboard::Keep));
        }

        Ok(directives)
    }

    async fn handle_comment(&self, participant: &Participant, text: &str) -> Result<Vec<Directive>, LedgerError> {
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let comment: String = text.chars().take(COMMENT_MAX_CHARS).collect();
        let description = self
            .ledger
            .attach_comment_to_last_entry(&participant.name, &comment)
            .await?;
        self.sessions.lock().await.complete(&participant.name);

        Ok(vec![
            Directive::new(participant.address, format!("Saved: {}", description), Keyboard::Keep),
            main_menu(participant.address),
        ])
    }

    async fn handle_unregistered(&self, event: &InboundEvent, text: &str) -> Result<Vec<Directive>, LedgerError> {
        let address = event.address;

        {
            let mut sessions = self.sessions.lock().await;
            if !sessions.is_awaiting_name(address) || text == RESTART_TOKEN || text == NAME_TOKEN {
                sessions.await_name(address);
                return Ok(vec![name_prompt(event, "What's your name?")]);
            }
        }

        if let Err(LedgerError::InvalidName(reason)) = validate_name(text) {
            debug!("Rejected name {:?} from {}: {}", text, address, reason);
            return Ok(vec![name_prompt(event, &format!("{}. Try another one.", reason))]);
        }

        match self.ledger.ensure_participant(text, address).await {
            Ok(_) => {
                self.sessions.lock().await.clear_name_wait(address);
                info!("Address {} joined as {}", address, text);
                Ok(vec![
                    Directive::new(address, format!("You're in. Your name is {}.", text), Keyboard::Keep),
                    main_menu(address),
                ])
            }
            Err(LedgerError::NameTaken(name)) => Ok(vec![name_prompt(
                event,
                &format!("The name {} is already taken. Try another one.", name),
            )]),
            Err(e) => Err(e),
        }
    }

    async fn balance_text(&self, name: &str) -> Result<String, LedgerError> {
        let balance = self.ledger.get_balance(name).await?;
        let relations = self.ledger.get_outstanding_relations(name, true).await?;

        let mut text = format!("Your balance: {}", balance);
        for (counterpart, amount) in relations {
            if amount > 0 {
                text.push_str(&format!("\n{} owes you {}", counterpart, amount));
            } else {
                text.push_str(&format!("\nYou owe {} {}", counterpart, -amount));
            }
        }
        Ok(text)
    }

    async fn history_text(&self, name: &str) -> Result<String, LedgerError> {
        let history = self.ledger.get_recent_history(name, self.history_limit).await?;
        if history.is_empty() {
            return Ok("No operations yet.".to_string());
        }

        let mut table = Table::new(vec![Align::Left, Align::Right, Align::Left, Align::Left]);
        for item in history {
            table.add_row(vec![
                item.date_created.format("%d.%m %H:%M").to_string(),
                format!("{:+}", item.signed_amount),
                item.counterpart,
                item.comment,
            ]);
        }
        Ok(table.render_within(MAX_TEXT_CHARS))
    }
}

fn recovery(address: Address, error: &LedgerError) -> Vec<Directive> {
    let hint = match error {
        LedgerError::UnknownTarget(name) => Some(format!("I don't know anyone called {}.", name)),
        LedgerError::InvalidAmount(amount) => Some(format!(
            "What should I do with the number '{}'? Let's start over.",
            amount
        )),
        _ => None,
    };

    let mut directives: Vec<Directive> = hint
        .into_iter()
        .map(|text| Directive::new(address, text, Keyboard::Remove))
        .collect();
    directives.push(main_menu(address));
    directives
}

fn name_prompt(event: &InboundEvent, text: &str) -> Directive {
    let keyboard = match event.display_name.as_deref().map(str::trim) {
        Some(name) if validate_name(name).is_ok() => Keyboard::grid(&[name], 1),
        _ => Keyboard::Remove,
    };
    Directive::new(event.address, text, keyboard)
}

fn validate_name(name: &str) -> Result<(), LedgerError> {
    let reason = if name.is_empty() {
        "A name cannot be empty"
    } else if name.chars().count() > NAME_MAX_CHARS {
        "That name is too long"
    } else if name.starts_with('/') {
        "A name cannot start with '/'"
    } else {
        return Ok(());
    };
    Err(LedgerError::InvalidName(reason.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    const ALICE: Address = 1;
    const BOB: Address = 2;
    const CAROL: Address = 3;

    async fn controller() -> DialogueController {
        DialogueController::new(LedgerStore::new(db::init_memory_db().await), 10)
    }

    async fn controller_with_alice_bob() -> DialogueController {
        let controller = controller().await;
        controller.ledger.ensure_participant("Alice", ALICE).await.unwrap();
        controller.ledger.ensure_participant("Bob", BOB).await.unwrap();
        controller
    }

    async fn say(controller: &DialogueController, address: Address, text: &str) -> Vec<Directive> {
        controller.handle(&InboundEvent::new(address, text)).await
    }

    async fn state(controller: &DialogueController, name: &str) -> DialogueState {
        controller.sessions.lock().await.state(name)
    }

    async fn entries(controller: &DialogueController) -> Vec<crate::models::LedgerEntry> {
        db::ledger_entry::get_all(controller.ledger.pool()).await.unwrap()
    }

    fn is_main_menu(directive: &Directive) -> bool {
        directive.keyboard == main_menu_keyboard()
    }

    #[tokio::test]
    async fn test_registration_flow() {
        let controller = controller().await;

        let first = controller
            .handle(&InboundEvent {
                address: ALICE,
                text: "hello".into(),
                display_name: Some("Alice".into()),
            })
            .await;
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].keyboard, Keyboard::Grid(vec![vec!["Alice".to_string()]]));

        let joined = say(&controller, ALICE, "Alice").await;
        assert!(joined[0].text.contains("Alice"));
        assert!(is_main_menu(joined.last().unwrap()));
        assert!(controller.ledger.find_by_address(ALICE).await.unwrap().is_some());

        // Bob tries to take the same name and is asked again
        say(&controller, BOB, "/start").await;
        let taken = say(&controller, BOB, "Alice").await;
        assert_eq!(taken.len(), 1);
        assert!(taken[0].text.contains("already taken"));
        assert!(controller.sessions.lock().await.is_awaiting_name(BOB));

        let invalid = say(&controller, BOB, "/weird").await;
        assert_eq!(invalid.len(), 1);
        assert!(controller.ledger.find_by_address(BOB).await.unwrap().is_none());

        let joined = say(&controller, BOB, "Bob").await;
        assert!(is_main_menu(joined.last().unwrap()));
        assert!(!controller.sessions.lock().await.is_awaiting_name(BOB));
    }

    #[tokio::test]
    async fn test_name_command_keeps_name() {
        let controller = controller_with_alice_bob().await;
        let reply = say(&controller, ALICE, "/name").await;
        assert!(reply[0].text.contains("registered as Alice"));
        assert_eq!(controller.ledger.find_by_address(ALICE).await.unwrap().unwrap().name, "Alice");
    }

    #[tokio::test]
    async fn test_i_pay_dialogue_records_one_entry() {
        let controller = controller_with_alice_bob().await;

        let picker = say(&controller, ALICE, MENU_I_OWE).await;
        assert_eq!(picker[0].keyboard, Keyboard::Grid(vec![vec!["Bob".to_string()]]));
        assert_eq!(state(&controller, "Alice").await, DialogueState::AwaitingTarget(Direction::IPay));

        let pad = say(&controller, ALICE, "Bob").await;
        assert_eq!(pad[0].keyboard, Keyboard::DigitPad);

        let echo = say(&controller, ALICE, "5").await;
        assert_eq!(echo[0].text, "Amount: 5");

        let confirmed = say(&controller, ALICE, "OK").await;
        assert_eq!(state(&controller, "Alice").await, DialogueState::AwaitingComment);
        assert_eq!(confirmed.len(), 2);
        assert_eq!(confirmed[1].address, BOB);
        assert_eq!(confirmed[1].text, "Alice says they owe you 5");

        let done = say(&controller, ALICE, "lunch").await;
        assert_eq!(done[0].text, "Saved: Bob -> Alice : 5 - lunch");
        assert!(is_main_menu(&done[1]));
        assert_eq!(state(&controller, "Alice").await, DialogueState::None);

        let entries = entries(&controller).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].master, "Bob");
        assert_eq!(entries[0].slave, "Alice");
        assert_eq!(entries[0].operator, "Alice");
        assert_eq!(entries[0].amount, 5);
        assert_eq!(entries[0].comment, "lunch");
    }

    #[tokio::test]
    async fn test_pay_me_scenario_via_dialogue() {
        let controller = controller_with_alice_bob().await;

        say(&controller, ALICE, MENU_OWES_ME).await;
        say(&controller, ALICE, "Bob").await;
        say(&controller, ALICE, "1").await;
        say(&controller, ALICE, "0").await;
        let confirmed = say(&controller, ALICE, "ok").await;
        assert_eq!(confirmed[1].text, "Alice says you owe them 10");

        let ledger = &controller.ledger;
        assert_eq!(ledger.get_balance("Alice").await.unwrap(), 10);
        assert_eq!(ledger.get_balance("Bob").await.unwrap(), -10);
        assert_eq!(ledger.get_outstanding_relations("Alice", false).await.unwrap().get("Bob"), Some(&10));
        assert_eq!(ledger.get_outstanding_relations("Bob", false).await.unwrap().get("Alice"), Some(&-10));

        let entries = entries(&controller).await;
        assert_eq!(entries.len(), 1);
        assert_eq!((entries[0].master.as_str(), entries[0].slave.as_str(), entries[0].amount), ("Alice", "Bob", 10));
    }

    #[tokio::test]
    async fn test_paste_completes_amount() {
        let controller = controller_with_alice_bob().await;
        say(&controller, ALICE, MENU_OWES_ME).await;
        say(&controller, ALICE, "Bob").await;

        let confirmed = say(&controller, ALICE, "42").await;
        assert!(confirmed[0].text.starts_with("Got it: 42"));
        assert_eq!(state(&controller, "Alice").await, DialogueState::AwaitingComment);
        assert_eq!(controller.ledger.get_balance("Bob").await.unwrap(), -42);
    }

    #[tokio::test]
    async fn test_backspace_on_empty_buffer_keeps_state() {
        let controller = controller_with_alice_bob().await;
        say(&controller, ALICE, MENU_I_OWE).await;
        say(&controller, ALICE, "Bob").await;

        let echo = say(&controller, ALICE, "<<").await;
        assert_eq!(echo[0].text, "Amount: (empty)");
        assert_eq!(state(&controller, "Alice").await, DialogueState::AwaitingAmount);
    }

    #[tokio::test]
    async fn test_unknown_menu_label_shows_menu() {
        let controller = controller_with_alice_bob().await;

        let reply = say(&controller, ALICE, "pay everyone").await;
        assert_eq!(reply.len(), 1);
        assert!(is_main_menu(&reply[0]));
        assert_eq!(state(&controller, "Alice").await, DialogueState::None);
        assert!(entries(&controller).await.is_empty());
        assert_eq!(controller.ledger.get_balance("Alice").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_or_self_target_resets() {
        let controller = controller_with_alice_bob().await;

        for target in ["Zed", "Alice"] {
            say(&controller, ALICE, MENU_I_OWE).await;
            let reply = say(&controller, ALICE, target).await;
            assert!(reply[0].text.contains(target));
            assert!(is_main_menu(reply.last().unwrap()));
            assert_eq!(state(&controller, "Alice").await, DialogueState::None);
        }
    }

    #[tokio::test]
    async fn test_zero_amount_resets_without_entry() {
        let controller = controller_with_alice_bob().await;
        say(&controller, ALICE, MENU_I_OWE).await;
        say(&controller, ALICE, "Bob").await;
        say(&controller, ALICE, "0").await;

        let reply = say(&controller, ALICE, "OK").await;
        assert!(reply[0].text.contains("'0'"));
        assert!(is_main_menu(reply.last().unwrap()));
        assert_eq!(state(&controller, "Alice").await, DialogueState::None);
        assert!(entries(&controller).await.is_empty());
    }

    #[tokio::test]
    async fn test_restart_mid_dialogue() {
        let controller = controller_with_alice_bob().await;
        say(&controller, ALICE, MENU_OWES_ME).await;
        say(&controller, ALICE, "Bob").await;
        say(&controller, ALICE, "7").await;

        let reply = say(&controller, ALICE, "/start").await;
        assert_eq!(reply.len(), 1);
        assert!(is_main_menu(&reply[0]));
        assert_eq!(state(&controller, "Alice").await, DialogueState::None);
        assert!(entries(&controller).await.is_empty());
    }

    #[tokio::test]
    async fn test_skipping_comment_keeps_entry() {
        let controller = controller_with_alice_bob().await;
        say(&controller, ALICE, MENU_OWES_ME).await;
        say(&controller, ALICE, "Bob").await;
        say(&controller, ALICE, "12").await;

        assert!(say(&controller, ALICE, "   ").await.is_empty());
        assert_eq!(state(&controller, "Alice").await, DialogueState::AwaitingComment);

        say(&controller, ALICE, "/start").await;
        let entries = entries(&controller).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].comment, "");
    }

    #[tokio::test]
    async fn test_long_comment_is_truncated() {
        let controller = controller_with_alice_bob().await;
        say(&controller, ALICE, MENU_OWES_ME).await;
        say(&controller, ALICE, "Bob").await;
        say(&controller, ALICE, "3").await;
        say(&controller, ALICE, "OK").await;
        say(&controller, ALICE, &"x".repeat(150)).await;

        assert_eq!(entries(&controller).await[0].comment.len(), COMMENT_MAX_CHARS);
    }

    #[tokio::test]
    async fn test_balance_and_history() {
        let controller = controller_with_alice_bob().await;
        controller.ledger.ensure_participant("Carol", CAROL).await.unwrap();
        controller.ledger.record_transaction("Alice", "Alice", "Bob", 10).await.unwrap();
        controller.ledger.record_transaction("Carol", "Carol", "Alice", 4).await.unwrap();
        controller.ledger.attach_comment_to_last_entry("Carol", "cinema").await.unwrap();

        let balance = say(&controller, ALICE, MENU_BALANCE).await;
        assert_eq!(balance[0].text, "Your balance: 6\nBob owes you 10\nYou owe Carol 4");
        assert!(is_main_menu(&balance[0]));

        let history = say(&controller, ALICE, MENU_HISTORY).await;
        let text = &history[0].text;
        assert!(text.starts_with("```\n"));
        let bob_line = text.find("+10").unwrap();
        let carol_line = text.find("-4").unwrap();
        assert!(bob_line < carol_line);
        assert!(text.contains("cinema"));

        let empty = controller.ledger.ensure_participant("Dave", 4).await.unwrap();
        assert!(empty.created);
        assert_eq!(say(&controller, 4, MENU_HISTORY).await[0].text, "No operations yet.");
    }

    #[tokio::test]
    async fn test_lonely_participant_cannot_start_dialogue() {
        let controller = controller().await;
        controller.ledger.ensure_participant("Alice", ALICE).await.unwrap();

        let reply = say(&controller, ALICE, MENU_I_OWE).await;
        assert!(reply[0].text.contains("Nobody else"));
        assert_eq!(state(&controller, "Alice").await, DialogueState::None);
    }

    #[tokio::test]
    async fn test_concurrent_participants() {
        let controller = Arc::new(controller_with_alice_bob().await);
        controller.ledger.ensure_participant("Carol", CAROL).await.unwrap();

        let script = |address: Address, target: &'static str| {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move {
                for text in [MENU_OWES_ME, target, "2", "OK", "shared"] {
                    controller.handle(&InboundEvent::new(address, text)).await;
                }
            })
        };

        let a = script(ALICE, "Bob");
        let c = script(CAROL, "Bob");
        a.await.unwrap();
        c.await.unwrap();

        assert_eq!(controller.ledger.get_balance("Bob").await.unwrap(), -4);
        let entries = entries(&controller).await;
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.comment == "shared"));
    }

    #[tokio::test]
    async fn test_storage_failure_resets_dialogue() {
        let controller = controller_with_alice_bob().await;
        sqlx::raw_sql(
            "CREATE TRIGGER reject_entries BEFORE INSERT ON ledger_entry \
             BEGIN SELECT RAISE(ABORT, 'log unavailable'); END;",
        )
        .execute(controller.ledger.pool())
        .await
        .unwrap();

        say(&controller, ALICE, MENU_I_OWE).await;
        say(&controller, ALICE, "Bob").await;
        say(&controller, ALICE, "5").await;
        let reply = say(&controller, ALICE, "OK").await;

        assert_eq!(reply.len(), 1);
        assert_eq!(reply[0].address, ALICE);
        assert!(reply[0].text.contains("nothing was saved"));
        assert_eq!(state(&controller, "Alice").await, DialogueState::None);
        assert!(entries(&controller).await.is_empty());
        assert_eq!(controller.ledger.get_balance("Alice").await.unwrap(), 0);
        assert_eq!(controller.ledger.get_balance("Bob").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_oversized_paste_is_rejected() {
        let controller = controller_with_alice_bob().await;
        say(&controller, ALICE, MENU_OWES_ME).await;
        say(&controller, ALICE, "Bob").await;

        let reply = say(&controller, ALICE, "9223372036854775807").await;
        assert!(reply[0].text.contains("'9223372036854775807'"));
        assert!(is_main_menu(reply.last().unwrap()));
        assert_eq!(state(&controller, "Alice").await, DialogueState::None);
        assert!(entries(&controller).await.is_empty());
        assert_eq!(controller.ledger.get_balance("Alice").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_queued_presses_keep_arrival_order() {
        let controller = Arc::new(controller_with_alice_bob().await);
        say(&controller, ALICE, MENU_I_OWE).await;
        say(&controller, ALICE, "Bob").await;

        // Hold Alice's lock so every press queues behind it
        let lock = controller.address_lock(ALICE);
        let guard = lock.lock().await;

        let mut presses = Vec::new();
        for digit in ["1", "2", "3"] {
            let controller = Arc::clone(&controller);
            presses.push(tokio::spawn(async move {
                controller.handle(&InboundEvent::new(ALICE, digit)).await
            }));
            tokio::task::yield_now().await;
        }

        drop(guard);
        for press in presses {
            press.await.unwrap();
        }
        drop(lock);

        let sessions = controller.sessions.lock().await;
        assert_eq!(sessions.session("Alice").unwrap().amount_buffer, "123");
    }

    #[tokio::test]
    async fn test_address_locks_are_released() {
        let controller = controller_with_alice_bob().await;
        say(&controller, ALICE, MENU_BALANCE).await;
        say(&controller, 99, "hello").await;

        assert!(controller.address_locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_long_history_keeps_closing_fence() {
        let controller = DialogueController::new(LedgerStore::new(db::init_memory_db().await), 200);
        controller.ledger.ensure_participant("Alice", ALICE).await.unwrap();
        controller.ledger.ensure_participant("Bob", BOB).await.unwrap();
        for amount in 1..=120 {
            controller.ledger.record_transaction("Alice", "Alice", "Bob", amount).await.unwrap();
            controller
                .ledger
                .attach_comment_to_last_entry("Alice", &format!("entry number {}", amount))
                .await
                .unwrap();
        }

        let history = say(&controller, ALICE, MENU_HISTORY).await;
        let text = &history[0].text;
        assert!(text.chars().count() <= MAX_TEXT_CHARS);
        assert!(text.starts_with("```\n"));
        assert!(text.ends_with("\n```"));
        assert!(text.contains("entry number 120"));
        assert!(!text.contains("entry number 1\n"));
    }
}
