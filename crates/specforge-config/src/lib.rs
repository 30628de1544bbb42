//! Configuration for specforge
//!
//! Hierarchical configuration with discovery and precedence
//! CLI > file > defaults. The file is `.specforge/config.toml`, found by
//! searching upward from the working directory.

pub mod config;

pub use config::{
    AnthropicConfig, CliArgs, Config, ConfigBuilder, ConfigSource, Defaults, GuidanceConfig,
    LlmConfig,
};
