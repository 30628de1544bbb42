//! Structured logging for specforge
//!
//! All engine code logs through `tracing` with `component_id`, `step`,
//! `revision` and `depth` fields. The CLI installs the subscriber once via
//! [`init_tracing`].

use tracing::{Level, info, span, warn};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV_VAR: &str = "SPECFORGE_LOG";

/// Initialize the tracing subscriber.
///
/// Filter precedence: `SPECFORGE_LOG`, then `RUST_LOG`, then a default of
/// `specforge=info,warn` (or `specforge=debug,info` when verbose). Verbose
/// mode also emits span close events so per-step durations show up.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("specforge=debug,info")
            } else {
                EnvFilter::try_new("specforge=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(false)
        .with_file(false);

    if verbose {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                layer
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer.with_target(false).compact())
            .try_init()?;
    }

    Ok(())
}

/// Span wrapping one component's pass through the processor.
pub fn component_span(component_id: &str, revision: u32) -> tracing::Span {
    span!(
        Level::INFO,
        "component",
        component_id = %component_id,
        revision = revision,
    )
}

/// Span wrapping one decomposition node.
pub fn decompose_span(component_id: &str, depth: usize) -> tracing::Span {
    span!(
        Level::INFO,
        "decompose",
        component_id = %component_id,
        depth = depth,
    )
}

/// Span wrapping a whole pipeline stage (decompose, process, order).
pub fn stage_span(stage: &str) -> tracing::Span {
    span!(Level::INFO, "stage", stage = %stage)
}

pub fn log_step_complete(component_id: &str, step: &str, key: &str, reused: bool) {
    info!(
        component_id = %component_id,
        step = %step,
        artifact = %key,
        reused = reused,
        "Step complete"
    );
}

pub fn log_step_failed(component_id: &str, step: &str, error: &str) {
    warn!(
        component_id = %component_id,
        step = %step,
        error = %error,
        "Step failed; component left at its last persisted status"
    );
}
