mod constants;
mod core;
mod errors;
mod logging;

pub use constants::{EXIT_FAILURE, EXIT_SUCCESS, EXIT_USAGE};
pub use core::{report_setup_failure, BrokerContext};
pub use errors::RunTaskError;
pub use logging::{execution_log_path, init_execution_logging};
