pub mod atomic_write;
pub mod canonicalization;
pub mod component_id;
pub mod error;
pub mod exit_codes;
pub mod logging;
pub mod paths;
pub mod types;
