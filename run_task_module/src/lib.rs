pub mod run_task;

pub use run_task::{
    execution_log_path, init_execution_logging, report_setup_failure, BrokerContext,
    RunTaskError, EXIT_FAILURE, EXIT_SUCCESS, EXIT_USAGE,
};
