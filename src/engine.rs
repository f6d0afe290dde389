//! Resolve-then-validate entry point.
//!
//! [`Engine::resolve`] either returns a complete [`Manifest`] or a non-empty
//! list of attributed errors. A partially resolved document is never handed
//! back as success.

use crate::config::Settings;
use crate::error::Error;
use crate::flags::FlagSet;
use crate::macros::MacroTable;
use crate::manifest::{Candidate, Manifest};
use crate::resolver::Resolver;
use crate::template::{Template, TemplateDocument};
use crate::validator::{InputDeclarations, ValidationError, Validator};
use tracing::info;

/// A successful resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub manifest: Manifest,
    /// Non-fatal findings such as duplicate outputs.
    pub warnings: Vec<ValidationError>,
}

/// A failed resolution. `errors` is never empty.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}", summarize(.errors))]
pub struct ResolutionFailure {
    pub errors: Vec<Error>,
    /// Warnings raised alongside validation errors.
    pub warnings: Vec<ValidationError>,
}

fn summarize(errors: &[Error]) -> String {
    match errors {
        [] => "resolution failed".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{} (and {} more)", first, rest.len()),
    }
}

impl From<Error> for ResolutionFailure {
    fn from(err: Error) -> Self {
        Self {
            errors: vec![err],
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Engine {
    settings: Settings,
}

impl Engine {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Resolve without validating.
    pub fn candidate(
        &self,
        template: &Template,
        flags: &FlagSet,
        macros: &MacroTable,
    ) -> crate::Result<Candidate> {
        Resolver::new(template, flags)
            .with_macros(macros)
            .with_settings(&self.settings.resolver)
            .resolve()
    }

    pub fn resolve(
        &self,
        template: &Template,
        flags: &FlagSet,
        macros: &MacroTable,
        inputs: Option<&InputDeclarations>,
    ) -> Result<Resolution, ResolutionFailure> {
        let candidate = self.candidate(template, flags, macros)?;

        let validated = Validator::new()
            .with_settings(&self.settings.validator)
            .with_inputs(inputs)
            .validate(candidate)
            .map_err(|report| ResolutionFailure {
                errors: report.errors.into_iter().map(Error::Validation).collect(),
                warnings: report.warnings,
            })?;

        info!(
            template = template.name(),
            flags = %flags.label(),
            outputs = validated.manifest.outputs().len(),
            warnings = validated.warnings.len(),
            "Manifest resolved"
        );
        Ok(Resolution {
            manifest: validated.manifest,
            warnings: validated.warnings,
        })
    }

    /// Resolve a loaded document with its own base macros.
    pub fn resolve_document(
        &self,
        document: &TemplateDocument,
        flags: &FlagSet,
        inputs: Option<&InputDeclarations>,
    ) -> Result<Resolution, ResolutionFailure> {
        self.resolve(&document.template, flags, &document.macros, inputs)
    }
}
