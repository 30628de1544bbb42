//! CLI entry point and dispatch logic
//!
//! `run()` parses arguments, discovers configuration, installs tracing,
//! creates the tokio runtime, dispatches to a command handler, and prints
//! every error itself.

use clap::Parser;

use super::args::{Cli, Commands, ReviewCommands};
use super::commands;

use crate::{CliArgs, Config, ExitCode, SpecforgeError};
use specforge_utils::logging::init_tracing;

/// Main CLI execution function.
///
/// Returns `Err(ExitCode)` for any non-zero outcome; main.rs only exits with
/// it and never prints.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    let guidance = match &cli.command {
        Commands::Run { guidance, .. } => guidance.clone(),
        _ => Vec::new(),
    };
    let cli_args = CliArgs {
        config_path: cli.config.clone(),
        model: cli.model.clone(),
        max_depth: cli.max_depth,
        max_revisions: cli.max_revisions,
        concurrency: cli.concurrency,
        dispatch_delay_ms: cli.delay_ms,
        fail_fast: cli.fail_fast.then_some(true),
        generation_timeout_secs: cli.generation_timeout,
        llm_provider: cli.provider.clone(),
        output_dir: cli.out.clone(),
        verbose: cli.verbose.then_some(true),
        guidance,
    };

    let config = match Config::discover(&cli_args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("✗ Configuration error: {err:#}");
            return Err(ExitCode::CLI_ARGS);
        }
    };

    if let Err(e) = init_tracing(config.verbose()) {
        eprintln!("Warning: failed to initialize logging: {e}");
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let result = rt.block_on(async {
        match cli.command {
            Commands::Run {
                spec,
                fresh,
                step_through,
                json,
                ..
            } => commands::execute_run_command(&spec, fresh, step_through, json, &config).await,
            Commands::Status { json } => commands::execute_status_command(json, &config),
            Commands::Review(ReviewCommands::Prepare { id }) => {
                commands::execute_review_prepare_command(&id, &config)
            }
            Commands::Review(ReviewCommands::Submit { id, file }) => {
                commands::execute_review_submit_command(&id, &file, &config).await
            }
            Commands::Order { json } => commands::execute_order_command(json, &config).await,
        }
    });

    match result {
        Ok(code) if code == ExitCode::SUCCESS => Ok(()),
        Ok(code) => Err(code),
        Err(error) => {
            if let Some(specforge_error) = error.downcast_ref::<SpecforgeError>() {
                eprintln!("{}", specforge_error.display_for_user());
                Err(specforge_error.to_exit_code())
            } else {
                eprintln!("✗ Unexpected error: {error:#}");
                eprintln!("\n  Run with --verbose for more detailed output");
                Err(ExitCode::INTERNAL)
            }
        }
    }
}
