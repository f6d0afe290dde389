//! Validation of resolved candidates.
//!
//! The [`Validator`] runs every rule over a [`Candidate`] in a fixed order
//! and collects all findings, unless fail-fast is set. Only a candidate with
//! no error-severity findings becomes a [`Manifest`]. Nothing is corrected.

mod inputs;
mod rules;

pub use inputs::{INPUT_KEY, INPUT_REQUIREMENTS, InputDeclarations, InputRequirement, Trigger};

use crate::config::ValidatorSettings;
use crate::manifest::{Candidate, Manifest, RunControl};
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

/// Identifies which check produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rule {
    YearOrdering,
    RestartConsistency,
    SpinupConsistency,
    OutputPath,
    InputReference,
    OptionCompatibility,
    DuplicateOutput,
    DuplicateKey,
}

impl Rule {
    pub fn id(&self) -> &'static str {
        match self {
            Rule::YearOrdering => "year-ordering",
            Rule::RestartConsistency => "restart-consistency",
            Rule::SpinupConsistency => "spinup-consistency",
            Rule::OutputPath => "output-path",
            Rule::InputReference => "input-reference",
            Rule::OptionCompatibility => "option-compatibility",
            Rule::DuplicateOutput => "duplicate-output",
            Rule::DuplicateKey => "duplicate-key",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// One finding: the rule, the offending fields and a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{rule}: {message}")]
pub struct ValidationError {
    pub rule: Rule,
    pub severity: Severity,
    pub fields: Vec<String>,
    pub message: String,
}

impl ValidationError {
    pub fn new<S: Into<String>>(
        rule: Rule,
        fields: impl IntoIterator<Item = S>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule,
            severity: Severity::Error,
            fields: fields.into_iter().map(Into::into).collect(),
            message: message.into(),
        }
    }

    pub fn warning<S: Into<String>>(
        rule: Rule,
        fields: impl IntoIterator<Item = S>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::new(rule, fields, message)
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// All findings of one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn push(&mut self, finding: ValidationError) {
        match finding.severity {
            Severity::Error => self.errors.push(finding),
            Severity::Warning => self.warnings.push(finding),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Findings from one rule, errors first.
    pub fn by_rule(&self, rule: Rule) -> impl Iterator<Item = &ValidationError> {
        self.errors
            .iter()
            .chain(self.warnings.iter())
            .filter(move |f| f.rule == rule)
    }
}

/// A candidate that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated {
    pub manifest: Manifest,
    pub warnings: Vec<ValidationError>,
}

#[derive(Debug, Clone, Default)]
pub struct Validator<'a> {
    settings: ValidatorSettings,
    inputs: Option<&'a InputDeclarations>,
}

impl<'a> Validator<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(mut self, settings: &ValidatorSettings) -> Self {
        self.settings = settings.clone();
        self
    }

    /// Declarations for the input-reference rule. Without them the rule uses
    /// the candidate's own input section, or is skipped.
    pub fn with_inputs(mut self, inputs: Option<&'a InputDeclarations>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn fail_fast(mut self, enabled: bool) -> Self {
        self.settings.fail_fast = enabled;
        self
    }

    /// Run every rule and collect the findings.
    pub fn check(&self, candidate: &Candidate) -> ValidationReport {
        let derived = match self.inputs {
            None if self.settings.derive_inputs => InputDeclarations::from_candidate(candidate),
            _ => None,
        };
        let ctx = rules::Context {
            candidate,
            inputs: self.inputs.or(derived.as_ref()),
            settings: &self.settings,
        };

        let mut report = ValidationReport::default();
        for rule in rules::RULES {
            for finding in rule(&ctx) {
                let stop = finding.is_error() && self.settings.fail_fast;
                report.push(finding);
                if stop {
                    debug!("Stopping validation at first error");
                    return report;
                }
            }
        }
        report
    }

    /// Validate and, when no errors were found, freeze the candidate.
    pub fn validate(&self, candidate: Candidate) -> Result<Validated, ValidationReport> {
        let mut report = self.check(&candidate);
        if report.has_errors() {
            return Err(report);
        }

        let Some(run) = RunControl::from_candidate(&candidate) else {
            report.push(ValidationError::new(
                Rule::YearOrdering,
                ["firstyear", "lastyear", "nspinup", "nspinyear"],
                "run-control fields are incomplete",
            ));
            return Err(report);
        };

        for finding in &report.warnings {
            warn!(rule = %finding.rule, fields = ?finding.fields, "{}", finding.message);
        }
        Ok(Validated {
            manifest: Manifest::new(candidate, run),
            warnings: report.warnings,
        })
    }
}
