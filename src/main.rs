//! simconf command-line tool
//!
//! Resolves LPJmL run templates under flag combinations and prints the
//! validated manifest.

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use simconf::batch::{default_jobs, resolve_batch};
use simconf::cli::flags::FlagsArgs;
use simconf::cli::matrix::MatrixArgs;
use simconf::cli::resolve::ResolveArgs;
use simconf::cli::{Cli, Command, load_document};
use simconf::config::{Settings, SettingsLoader};
use simconf::engine::Engine;
use simconf::format::{self, ReportFormat};
use simconf::logging::{self, LogTarget};
use simconf::validator::InputDeclarations;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    logging::init(&LogTarget::parse(&cli.log), cli.verbose)?;

    let loader = match &cli.config {
        Some(path) => SettingsLoader::load_file(Path::new(path))?,
        None => SettingsLoader::load()?,
    };
    for (tier, path) in loader.sources() {
        debug!(tier = ?tier, path = %path.display(), "Loaded settings");
    }
    let settings = loader.into_settings();

    match cli.command {
        Command::Resolve(args) => run_resolve(settings, args),
        Command::Matrix(args) => run_matrix(settings, args),
        Command::Flags(args) => run_flags(args),
    }
}

/// Write a report to a file, or stdout when no file is given.
fn emit(report: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, report)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Wrote {}", path.display());
        }
        None => println!("{}", report.trim_end()),
    }
    Ok(())
}

/// Run the resolve command
fn run_resolve(mut settings: Settings, args: ResolveArgs) -> Result<ExitCode> {
    let mut document = load_document(args.template.as_deref())?;
    for (name, value) in args.macro_definitions()? {
        document.macros.define(name, value)?;
    }

    let mut builder = document.flag_builder();
    for raw in &args.flags {
        builder = builder.assign(raw)?;
    }
    let flags = builder.build()?;

    let inputs = args
        .inputs
        .as_deref()
        .map(InputDeclarations::from_path)
        .transpose()?;

    if args.fail_fast {
        settings.validator.fail_fast = true;
    }
    let engine = Engine::new(settings);
    let label = flags.label();

    let (report, code) = match engine.resolve_document(&document, &flags, inputs.as_ref()) {
        Ok(resolution) => {
            let report = match args.format {
                ReportFormat::Json => format::resolution_json(&resolution)?,
                ReportFormat::Markdown => format::format_resolution_markdown(&label, &resolution),
            };
            (report, ExitCode::SUCCESS)
        }
        Err(failure) => {
            let report = match args.format {
                ReportFormat::Json => {
                    serde_json::to_string_pretty(&format::failure_json(&failure))?
                }
                ReportFormat::Markdown => format::format_failure_markdown(&label, &failure),
            };
            eprintln!("Resolution failed for {}: {}", label, failure);
            (report, ExitCode::FAILURE)
        }
    };

    emit(&report, args.output.as_deref())?;
    Ok(code)
}

/// Run the matrix command
fn run_matrix(settings: Settings, args: MatrixArgs) -> Result<ExitCode> {
    let document = load_document(args.template.as_deref())?;
    let flag_sets = args.matrix(&document)?.combinations()?;
    let jobs = args.jobs.unwrap_or_else(default_jobs);

    info!(
        template = document.template.name(),
        combinations = flag_sets.len(),
        jobs,
        "Resolving flag matrix"
    );

    let engine = Engine::new(settings);
    let results = resolve_batch(
        &engine,
        &document.template,
        &document.macros,
        &flag_sets,
        None,
        jobs,
    );
    let results: Vec<_> = flag_sets.iter().map(|f| f.label()).zip(results).collect();

    if let Some(ref dir) = args.out_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        for (label, result) in &results {
            if let Ok(resolution) = result {
                let path: PathBuf = dir.join(format!("{}.json", label));
                std::fs::write(&path, format::resolution_json(resolution)?)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
        }
    }

    let report = match args.format {
        ReportFormat::Markdown => format::format_matrix_markdown(&results),
        ReportFormat::Json => {
            let entries: Vec<_> = results
                .iter()
                .map(|(label, result)| match result {
                    Ok(resolution) => json!({
                        "flags": label,
                        "ok": true,
                        "manifest": resolution.manifest,
                        "warnings": resolution.warnings,
                    }),
                    Err(failure) => {
                        let mut value = format::failure_json(failure);
                        value["flags"] = json!(label);
                        value["ok"] = json!(false);
                        value
                    }
                })
                .collect();
            serde_json::to_string_pretty(&entries)?
        }
    };
    emit(&report, None)?;

    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Run the flags command
fn run_flags(args: FlagsArgs) -> Result<ExitCode> {
    let document = load_document(args.template.as_deref())?;
    let referenced = document.template.referenced_flags();

    let report = match args.format {
        ReportFormat::Markdown => {
            format::format_flags_markdown(document.template.name(), &document.groups, &referenced)
        }
        ReportFormat::Json => serde_json::to_string_pretty(&json!({
            "template": document.template.name(),
            "groups": document.groups,
            "flags": referenced,
            "fragments": document.template.fragment_names().collect::<Vec<_>>(),
        }))?,
    };
    emit(&report, None)?;
    Ok(ExitCode::SUCCESS)
}
