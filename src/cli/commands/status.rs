//! `specforge status`

use anyhow::Result;

use super::common::{open_store, print_json};
use crate::{Config, ExitCode, StatusReport};

/// Print the persisted state of the output directory. Never calls the
/// generator and never writes.
pub fn execute_status_command(json: bool, config: &Config) -> Result<ExitCode> {
    let store = open_store(config)?;
    let report = StatusReport::load(&*store)?;

    if json {
        print_json(&report)?;
    } else if report.is_empty() {
        println!("No run found in {}", store.root());
    } else {
        print!("{}", report.render_text());
    }
    Ok(ExitCode::SUCCESS)
}
