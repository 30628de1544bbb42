//! CLI command implementations.
//!
//! Each handler returns the process exit code for a completed command, or an
//! error that `run.rs` reports.

mod common;
mod order;
mod review;
mod run;
mod status;

pub use order::execute_order_command;
pub use review::{execute_review_prepare_command, execute_review_submit_command};
pub use run::execute_run_command;
pub use status::execute_status_command;
