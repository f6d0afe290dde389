//! CLI command definitions for simconf
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod flags;
pub mod matrix;
pub mod resolve;

use crate::scenario;
use crate::template::TemplateDocument;
use anyhow::Result;
use clap::{Parser, Subcommand};
use flags::FlagsArgs;
use matrix::MatrixArgs;
use resolve::ResolveArgs;
use std::path::Path;

/// Resolve flag-gated LPJmL run templates into validated manifests
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to settings file (skips the project and user tiers)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve one flag combination into a manifest
    Resolve(ResolveArgs),

    /// Resolve every combination of groups and toggles
    Matrix(MatrixArgs),

    /// List the exclusive groups and flag names a template tests
    Flags(FlagsArgs),
}

/// Load a template file, or the built-in scenario when no path is given.
pub fn load_document(template: Option<&Path>) -> Result<TemplateDocument> {
    match template {
        Some(path) => TemplateDocument::from_path(path),
        None => Ok(scenario::lpjml_magpie()?),
    }
}
