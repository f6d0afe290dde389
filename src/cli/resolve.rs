//! Resolve subcommand.

use crate::format::ReportFormat;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the resolve subcommand
#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Template file (defaults to the built-in lpjml_magpie scenario)
    #[arg(short, long, value_name = "FILE")]
    pub template: Option<PathBuf>,

    /// Activate a flag or select a group member: NAME, NAME=off, GROUP=MEMBER
    #[arg(short, long = "flag", value_name = "ASSIGNMENT")]
    pub flags: Vec<String>,

    /// Define or replace a base macro: NAME=VALUE
    #[arg(short = 'D', long = "define", value_name = "NAME=VALUE")]
    pub defines: Vec<String>,

    /// Declared input datasets (YAML list or map); derived from the manifest if omitted
    #[arg(long, value_name = "FILE")]
    pub inputs: Option<PathBuf>,

    /// Output format: json (default) or markdown
    #[arg(long, default_value = "json", value_name = "FORMAT")]
    pub format: ReportFormat,

    /// Stop validating at the first error
    #[arg(long)]
    pub fail_fast: bool,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

impl ResolveArgs {
    /// Split `NAME=VALUE` macro definitions.
    pub fn macro_definitions(&self) -> anyhow::Result<Vec<(&str, &str)>> {
        self.defines
            .iter()
            .map(|raw| {
                raw.split_once('=')
                    .filter(|(name, _)| !name.trim().is_empty())
                    .map(|(name, value)| (name.trim(), value))
                    .ok_or_else(|| anyhow::anyhow!("Invalid define '{}': expected NAME=VALUE", raw))
            })
            .collect()
    }
}
