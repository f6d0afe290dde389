//! Matrix subcommand: resolve many flag combinations in parallel.

use crate::batch::FlagMatrix;
use crate::flags::parse_assignment;
use crate::format::ReportFormat;
use crate::template::TemplateDocument;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the matrix subcommand
#[derive(Args, Debug)]
pub struct MatrixArgs {
    /// Template file (defaults to the built-in lpjml_magpie scenario)
    #[arg(short, long, value_name = "FILE")]
    pub template: Option<PathBuf>,

    /// Exclusive groups to vary (comma-separated); all declared groups if omitted
    #[arg(short, long, value_name = "LIST", value_delimiter = ',')]
    pub groups: Option<Vec<String>>,

    /// Boolean flag to vary over off and on
    #[arg(long = "toggle", value_name = "NAME")]
    pub toggles: Vec<String>,

    /// Pin a flag or group in every combination: NAME, NAME=off, GROUP=MEMBER
    #[arg(long = "fix", value_name = "ASSIGNMENT")]
    pub fixed: Vec<String>,

    /// Worker threads (defaults to available parallelism)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Write each resolved manifest to <DIR>/<flags>.json
    #[arg(long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Summary format: markdown (default) or json
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: ReportFormat,
}

impl MatrixArgs {
    /// Build the flag matrix against a document's declared groups.
    pub fn matrix(&self, document: &TemplateDocument) -> anyhow::Result<FlagMatrix> {
        let varied = match &self.groups {
            Some(names) => {
                for name in names {
                    if !document.groups.iter().any(|g| &g.name == name) {
                        anyhow::bail!("Template declares no group '{}'", name);
                    }
                }
                document
                    .groups
                    .iter()
                    .filter(|g| names.contains(&g.name))
                    .cloned()
                    .collect()
            }
            None => document.groups.clone(),
        };

        let mut matrix = FlagMatrix::new(varied);
        for toggle in &self.toggles {
            matrix = matrix.toggle(toggle.clone());
        }
        for raw in &self.fixed {
            let (name, value) = parse_assignment(raw)?;
            matrix = matrix.fix(name, value);
        }
        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use crate::scenario;
    use clap::Parser;

    fn args(extra: &[&str]) -> MatrixArgs {
        let mut argv = vec!["simconf", "matrix"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Command::Matrix(args) => args,
            other => panic!("expected matrix, got {:?}", other),
        }
    }

    #[test]
    fn test_matrix_over_selected_group() {
        let document = scenario::lpjml_magpie().unwrap();
        let matrix = args(&["--groups", "climate", "--toggle", "NOCO2"])
            .matrix(&document)
            .unwrap();
        assert_eq!(matrix.len(), 12);
    }

    #[test]
    fn test_fixed_group_is_not_varied() {
        let document = scenario::lpjml_magpie().unwrap();
        let matrix = args(&["--fix", "pathway=RCP2p6"]).matrix(&document).unwrap();
        assert_eq!(matrix.len(), 6);
    }

    #[test]
    fn test_unknown_group_is_rejected() {
        let document = scenario::lpjml_magpie().unwrap();
        assert!(args(&["--groups", "ocean"]).matrix(&document).is_err());
    }
}
