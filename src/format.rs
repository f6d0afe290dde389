//! Report formatting for markdown and JSON.

use crate::engine::{Resolution, ResolutionFailure};
use crate::error::Diagnostic;
use crate::flags::ExclusiveGroup;
use crate::validator::ValidationError;
use serde_json::{Value, json};
use std::collections::BTreeSet;

/// Output format for command reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    /// The manifest document itself (default).
    #[default]
    Json,
    Markdown,
}

impl ReportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(ReportFormat::Json),
            "markdown" | "md" => Some(ReportFormat::Markdown),
            _ => None,
        }
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown format '{}' (expected json or markdown)", s))
    }
}

/// The manifest document, pretty-printed.
pub fn resolution_json(resolution: &Resolution) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&resolution.manifest)
}

/// Errors and warnings of a failed resolution as a JSON value.
pub fn failure_json(failure: &ResolutionFailure) -> Value {
    json!({
        "errors": failure.errors.iter().map(Diagnostic::from).collect::<Vec<_>>(),
        "warnings": failure.warnings,
    })
}

fn push_warnings(md: &mut String, warnings: &[ValidationError]) {
    if warnings.is_empty() {
        return;
    }
    md.push_str(&format!("\n### Warnings ({})\n", warnings.len()));
    for w in warnings {
        md.push_str(&format!("- **{}** `{}`: {}\n", w.rule, w.fields.join(", "), w.message));
    }
}

/// Summary of a resolved manifest.
pub fn format_resolution_markdown(label: &str, resolution: &Resolution) -> String {
    let manifest = &resolution.manifest;
    let run = manifest.run();
    let mut md = String::new();

    md.push_str(&format!("## Manifest: {}\n", label));
    if let Some(dir) = manifest.output_dir() {
        md.push_str(&format!("- **output_dir**: `{}`\n", dir));
    }
    md.push_str(&format!("- **years**: {}-{}\n", run.firstyear, run.lastyear));
    md.push_str(&format!("- **spinup**: {} years, cycle {}\n", run.nspinup, run.nspinyear));
    md.push_str(&format!("- **restart**: {}\n", run.restart));
    if let Some(ref file) = run.restart_filename {
        md.push_str(&format!("- **restart_filename**: `{}`\n", file));
    }
    if run.write_restart
        && let Some(ref file) = run.write_restart_filename
    {
        md.push_str(&format!("- **write_restart_filename**: `{}`\n", file));
    }
    if let Some(year) = run.restart_year {
        md.push_str(&format!("- **restart_year**: {}\n", year));
    }

    if !manifest.outputs().is_empty() {
        md.push_str(&format!("\n### Outputs ({})\n", manifest.outputs().len()));
        for product in manifest.outputs() {
            md.push_str(&format!("- `{}` {} `{}`\n", product.id, product.format, product.path));
        }
    }

    push_warnings(&mut md, &resolution.warnings);
    md
}

/// Every error of a failed resolution.
pub fn format_failure_markdown(label: &str, failure: &ResolutionFailure) -> String {
    let mut md = String::new();
    md.push_str(&format!("## Failed: {}\n", label));
    for err in &failure.errors {
        let diag = Diagnostic::from(err);
        md.push_str(&format!("- **{}**: {}\n", diag.code, diag.message));
        if let Some(rule) = diag.rule {
            md.push_str(&format!("  - rule `{}`, fields `{}`\n", rule, diag.fields.join(", ")));
        }
    }
    push_warnings(&mut md, &failure.warnings);
    md
}

/// One line per combination of a batch.
pub fn format_matrix_markdown(
    results: &[(String, Result<Resolution, ResolutionFailure>)],
) -> String {
    let ok = results.iter().filter(|(_, r)| r.is_ok()).count();
    let mut md = String::new();
    md.push_str(&format!(
        "# Flag matrix ({} combinations, {} resolved, {} failed)\n\n",
        results.len(),
        ok,
        results.len() - ok
    ));
    md.push_str("| flags | status | outputs | warnings |\n");
    md.push_str("|---|---|---|---|\n");
    for (label, result) in results {
        match result {
            Ok(res) => md.push_str(&format!(
                "| {} | ok | {} | {} |\n",
                label,
                res.manifest.outputs().len(),
                res.warnings.len()
            )),
            Err(failure) => md.push_str(&format!(
                "| {} | {} | - | {} |\n",
                label,
                failure,
                failure.warnings.len()
            )),
        }
    }
    md
}

/// Declared groups and referenced flags of a template.
pub fn format_flags_markdown(
    template: &str,
    groups: &[ExclusiveGroup],
    referenced: &BTreeSet<String>,
) -> String {
    let mut md = String::new();
    md.push_str(&format!("# Flags: {}\n\n", template));

    if !groups.is_empty() {
        md.push_str("## Exclusive groups\n");
        for group in groups {
            md.push_str(&format!("- **{}**: {}\n", group.name, group.members.join(" | ")));
        }
        md.push('\n');
    }

    let members: BTreeSet<&str> = groups
        .iter()
        .flat_map(|g| g.members.iter().map(String::as_str))
        .chain(groups.iter().map(|g| g.name.as_str()))
        .collect();
    let toggles: Vec<&str> = referenced
        .iter()
        .map(String::as_str)
        .filter(|name| !members.contains(name))
        .collect();
    if !toggles.is_empty() {
        md.push_str("## Tested names\n");
        for name in toggles {
            md.push_str(&format!("- `{}`\n", name));
        }
    }
    md
}
