pub mod run_error;
pub mod run_logger;
pub mod run_orchestrator;
pub mod run_state;
