//! CLI argument parsing for couchdb-check
//!
//! This module provides the command-line interface using clap derive macros.
//!
//! # Options
//!
//! - `--config` / `-c`: Check configuration file (default: couchdb.yaml, env: COUCHDB_CHECK_CONFIG)
//! - `--interval` / `-i`: Re-run every N seconds until interrupted (env: COUCHDB_CHECK_INTERVAL)
//! - `--validate`: Validate configuration without running the check
//! - `--log-level` / `-l`: Log level (trace/debug/info/warn/error, env: COUCHDB_CHECK_LOG_LEVEL)
//! - `--log-format`: Log output format (text/json)
//! - `--output-format`: Output format for run results (text/json/yaml)
//! - `--timestamps`: Include emission timestamps in text output

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// couchdb-check - CouchDB statistics check
///
/// Polls the CouchDB statistics endpoints of every configured instance and
/// prints the resulting gauges and service checks.
#[derive(Parser, Debug)]
#[command(name = "couchdb-check")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "couchdb.yaml",
        env = "COUCHDB_CHECK_CONFIG"
    )]
    pub config: PathBuf,

    /// Run the check every SECS seconds instead of once
    #[arg(short, long, value_name = "SECS", env = "COUCHDB_CHECK_INTERVAL")]
    pub interval: Option<u64>,

    /// Validate configuration without running the check
    #[arg(long)]
    pub validate: bool,

    /// Log level
    #[arg(
        short,
        long,
        value_enum,
        default_value = "info",
        env = "COUCHDB_CHECK_LOG_LEVEL"
    )]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Output format for run results
    #[arg(long, value_enum, default_value = "text")]
    pub output_format: OutputFormat,

    /// Include emission timestamps in text output
    #[arg(long)]
    pub timestamps: bool,
}

/// Log level options
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Trace level - most verbose
    Trace,
    /// Debug level
    Debug,
    /// Info level - default
    Info,
    /// Warn level
    Warn,
    /// Error level - least verbose
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Log output format
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

/// Output format options for run results
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Yaml => write!(f, "yaml"),
        }
    }
}
