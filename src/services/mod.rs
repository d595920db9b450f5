pub mod answer_ledger;
pub mod classifier_service;
pub mod grading_service;
pub mod notification_service;
pub mod reaper_service;
pub mod session_clock;
pub mod session_orchestrator;
pub mod state_machine;
pub mod violation_tracker;
