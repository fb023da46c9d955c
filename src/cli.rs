//! CLI argument parsing for shadowtrace

use crate::config::TraceConfig;
use crate::error::Result;
use crate::filter::ExclusionPolicy;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use crate::flatten::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "shadowtrace")]
#[command(version)]
#[command(about = "Reconstruct caller/callee attribution from call event logs", long_about = None)]
pub struct Cli {
    /// Enable debug tracing output to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Recompute caller attribution from one or more raw event logs
    Flatten(FlattenArgs),

    /// Summarize call/return balance of a raw event log
    Stats {
        /// Raw event log (`.gz` accepted)
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
pub struct FlattenArgs {
    /// Raw event logs (`.gz` accepted); each starts from an empty stack
    #[arg(value_name = "INPUT", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Write records to file instead of stdout (`.gz` compresses)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// TOML configuration file; flags below override it
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Suppress records for paths matching PATTERN (literal substring, or regex:EXPR)
    #[arg(short = 'x', long = "exclude", value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Only emit records for paths matching PATTERN (literal substring, or regex:EXPR)
    #[arg(short = 'i', long = "include", value_name = "PATTERN")]
    pub include: Vec<String>,

    /// Which frame's path the filters test
    #[arg(long = "policy", value_enum)]
    pub policy: Option<ExclusionPolicy>,

    /// Reduced output: entity and method names only
    #[arg(long = "compact")]
    pub compact: bool,

    /// Emit each distinct row once
    #[arg(short = 'u', long = "unique")]
    pub unique: bool,

    #[arg(long = "format", value_enum, default_value = "csv")]
    pub format: OutputFormat,
}

impl FlattenArgs {
    /// Load the config file (if any) and apply flag overrides
    pub fn trace_config(&self) -> Result<TraceConfig> {
        let mut config = match &self.config {
            Some(path) => TraceConfig::from_file(path)?,
            None => TraceConfig::default(),
        };

        config.exclude_patterns.extend(self.exclude.iter().cloned());
        config.include_patterns.extend(self.include.iter().cloned());
        if self.policy.is_some() {
            config.exclusion_policy = self.policy;
        }
        if self.compact {
            config.detailed_output = false;
        }
        if self.unique {
            config.unique = true;
        }

        config.validate()?;
        Ok(config)
    }
}
