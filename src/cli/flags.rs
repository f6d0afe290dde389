//! Flags subcommand.

use crate::format::ReportFormat;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the flags subcommand
#[derive(Args, Debug)]
pub struct FlagsArgs {
    /// Template file (defaults to the built-in lpjml_magpie scenario)
    #[arg(short, long, value_name = "FILE")]
    pub template: Option<PathBuf>,

    /// Output format: markdown (default) or json
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: ReportFormat,
}
