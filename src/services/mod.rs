pub mod ledger_service;
pub mod session_service;
pub mod dialogue_service;
