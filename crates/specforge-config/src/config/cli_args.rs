use std::path::PathBuf;

/// Configuration overrides gathered from the command line.
///
/// Every field is optional; `None` leaves the file or default value in place.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub model: Option<String>,
    pub max_depth: Option<usize>,
    pub max_revisions: Option<u32>,
    pub concurrency: Option<usize>,
    pub dispatch_delay_ms: Option<u64>,
    pub fail_fast: Option<bool>,
    pub generation_timeout_secs: Option<u64>,
    pub llm_provider: Option<String>,
    pub output_dir: Option<String>,
    pub verbose: Option<bool>,
    /// Extra guidance documents, appended to the configured ones
    pub guidance: Vec<String>,
}
