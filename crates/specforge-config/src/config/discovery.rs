use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use super::{CliArgs, Config, ConfigSource, Defaults, GuidanceConfig, LlmConfig};
use super::model::DEFAULT_PROVIDER;

/// Environment variable overriding `[llm] provider` (below the CLI flag).
pub const PROVIDER_ENV_VAR: &str = "SPECFORGE_LLM_PROVIDER";

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    defaults: Option<PartialDefaults>,
    llm: Option<LlmConfig>,
    guidance: Option<GuidanceConfig>,
}

/// `[defaults]` as written in a file: everything optional, nothing defaulted.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct PartialDefaults {
    model: Option<String>,
    max_depth: Option<usize>,
    max_revisions: Option<u32>,
    concurrency: Option<usize>,
    dispatch_delay_ms: Option<u64>,
    fail_fast: Option<bool>,
    generation_timeout_secs: Option<u64>,
    output_dir: Option<String>,
    verbose: Option<bool>,
}

/// Overwrite `slot` when `value` is set, recording where it came from.
fn apply<T>(
    slot: &mut Option<T>,
    value: Option<T>,
    key: &str,
    source: &ConfigSource,
    attribution: &mut HashMap<String, ConfigSource>,
) {
    if value.is_some() {
        *slot = value;
        attribution.insert(key.to_string(), source.clone());
    }
}

impl Config {
    /// Discover and load configuration with precedence: CLI > file > defaults
    ///
    /// Uses the current working directory for config file discovery when no
    /// explicit path is provided in `cli_args`.
    pub fn discover(cli_args: &CliArgs) -> Result<Self> {
        let start_dir = env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&start_dir, cli_args)
    }

    /// Discover and load configuration starting from a specific directory.
    ///
    /// This is the path-driven variant used by tests to avoid process-global state.
    pub fn discover_from(start_dir: &Path, cli_args: &CliArgs) -> Result<Self> {
        let mut source_attribution = HashMap::new();
        let mut defaults = Defaults::default();
        let mut llm = LlmConfig::default();
        let mut guidance = GuidanceConfig::default();

        for key in [
            "model",
            "max_depth",
            "max_revisions",
            "concurrency",
            "dispatch_delay_ms",
            "fail_fast",
            "generation_timeout_secs",
            "output_dir",
            "verbose",
        ] {
            source_attribution.insert(key.to_string(), ConfigSource::Defaults);
        }

        let config_path = match &cli_args.config_path {
            Some(explicit) => Some(explicit.clone()),
            None => Self::discover_config_file_from(start_dir)?,
        };

        if let Some(path) = &config_path {
            let file_config = Self::load_config_file(path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?;
            let source = ConfigSource::ConfigFile(path.clone());
            let attr = &mut source_attribution;

            if let Some(file) = file_config.defaults {
                apply(&mut defaults.model, file.model, "model", &source, attr);
                apply(&mut defaults.max_depth, file.max_depth, "max_depth", &source, attr);
                apply(
                    &mut defaults.max_revisions,
                    file.max_revisions,
                    "max_revisions",
                    &source,
                    attr,
                );
                apply(
                    &mut defaults.concurrency,
                    file.concurrency,
                    "concurrency",
                    &source,
                    attr,
                );
                apply(
                    &mut defaults.dispatch_delay_ms,
                    file.dispatch_delay_ms,
                    "dispatch_delay_ms",
                    &source,
                    attr,
                );
                apply(&mut defaults.fail_fast, file.fail_fast, "fail_fast", &source, attr);
                apply(
                    &mut defaults.generation_timeout_secs,
                    file.generation_timeout_secs,
                    "generation_timeout_secs",
                    &source,
                    attr,
                );
                apply(&mut defaults.output_dir, file.output_dir, "output_dir", &source, attr);
                apply(&mut defaults.verbose, file.verbose, "verbose", &source, attr);
            }

            if let Some(file_llm) = file_config.llm {
                apply(&mut llm.provider, file_llm.provider, "llm_provider", &source, attr);
                apply(&mut llm.budget, file_llm.budget, "llm_budget", &source, attr);
                apply(
                    &mut llm.anthropic,
                    file_llm.anthropic,
                    "llm_anthropic",
                    &source,
                    attr,
                );
            }

            if let Some(file_guidance) = file_config.guidance
                && !file_guidance.documents.is_empty()
            {
                guidance = file_guidance;
                attr.insert("guidance".to_string(), source.clone());
            }
        }

        // Environment sits between the file and the CLI for the provider only.
        if let Ok(env_provider) = env::var(PROVIDER_ENV_VAR)
            && !env_provider.is_empty()
        {
            llm.provider = Some(env_provider);
            source_attribution.insert("llm_provider".to_string(), ConfigSource::Cli);
        }

        let cli = ConfigSource::Cli;
        let attr = &mut source_attribution;
        apply(&mut defaults.model, cli_args.model.clone(), "model", &cli, attr);
        apply(&mut defaults.max_depth, cli_args.max_depth, "max_depth", &cli, attr);
        apply(
            &mut defaults.max_revisions,
            cli_args.max_revisions,
            "max_revisions",
            &cli,
            attr,
        );
        apply(&mut defaults.concurrency, cli_args.concurrency, "concurrency", &cli, attr);
        apply(
            &mut defaults.dispatch_delay_ms,
            cli_args.dispatch_delay_ms,
            "dispatch_delay_ms",
            &cli,
            attr,
        );
        apply(&mut defaults.fail_fast, cli_args.fail_fast, "fail_fast", &cli, attr);
        apply(
            &mut defaults.generation_timeout_secs,
            cli_args.generation_timeout_secs,
            "generation_timeout_secs",
            &cli,
            attr,
        );
        apply(
            &mut defaults.output_dir,
            cli_args.output_dir.clone(),
            "output_dir",
            &cli,
            attr,
        );
        apply(&mut defaults.verbose, cli_args.verbose, "verbose", &cli, attr);
        apply(
            &mut llm.provider,
            cli_args.llm_provider.clone(),
            "llm_provider",
            &cli,
            attr,
        );

        if !cli_args.guidance.is_empty() {
            guidance.documents.extend(cli_args.guidance.iter().cloned());
            attr.insert("guidance".to_string(), ConfigSource::Cli);
        }

        if llm.provider.is_none() {
            llm.provider = Some(DEFAULT_PROVIDER.to_string());
            attr.insert("llm_provider".to_string(), ConfigSource::Defaults);
        }

        let config = Self {
            defaults,
            llm,
            guidance,
            source_attribution,
        };

        config.validate()?;

        Ok(config)
    }

    /// Discover config file by searching upward from a given directory.
    ///
    /// Walks up the directory tree looking for `.specforge/config.toml`,
    /// stopping at repository root markers (.git, .hg, .svn) or the
    /// filesystem root.
    pub fn discover_config_file_from(start_dir: &Path) -> Result<Option<PathBuf>> {
        let mut current_dir = start_dir.to_path_buf();

        loop {
            let config_path = current_dir.join(".specforge").join("config.toml");
            if config_path.is_file() {
                return Ok(Some(config_path));
            }

            if [".git", ".hg", ".svn"]
                .iter()
                .any(|marker| current_dir.join(marker).exists())
            {
                break;
            }

            match current_dir.parent() {
                Some(parent) => current_dir = parent.to_path_buf(),
                None => break,
            }
        }

        Ok(None)
    }

    fn load_config_file(path: &Path) -> Result<TomlConfig> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config file: {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TomlConfig::default()),
            Err(e) => Err(anyhow::anyhow!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            )),
        }
    }
}
