//! Structured error types for flag, template, resolution and validation failures.

use crate::validator::ValidationError;
use serde::Serialize;
use std::fmt;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Flag set errors
    ConflictingFlags,
    InvalidFlagValue,

    // Resolution errors
    UndefinedMacro,
    MacroCycle,
    MacroDepthExceeded,
    UnknownInclude,
    IncludeDepthExceeded,
    MalformedCondition,

    // Template source errors
    TemplateSyntax,

    // Validation errors
    ValidationFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConflictingFlags => "CONFLICTING_FLAGS",
            ErrorCode::InvalidFlagValue => "INVALID_FLAG_VALUE",
            ErrorCode::UndefinedMacro => "UNDEFINED_MACRO",
            ErrorCode::MacroCycle => "MACRO_CYCLE",
            ErrorCode::MacroDepthExceeded => "MACRO_DEPTH_EXCEEDED",
            ErrorCode::UnknownInclude => "UNKNOWN_INCLUDE",
            ErrorCode::IncludeDepthExceeded => "INCLUDE_DEPTH_EXCEEDED",
            ErrorCode::MalformedCondition => "MALFORMED_CONDITION",
            ErrorCode::TemplateSyntax => "TEMPLATE_SYNTAX",
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every way a resolution can fail.
///
/// Resolver errors carry a `location`: the trail of template nodes that led
/// to the offending node. Errors raised below the resolver (for example by the
/// macro table on its own) start with an empty location which the resolver
/// fills in through [`Error::at`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("conflicting flags in exclusive group '{group}': {first} and {second} are both set")]
    ConflictingFlags {
        group: String,
        first: String,
        second: String,
    },

    #[error("invalid value '{value}' for flag '{flag}': {reason}")]
    InvalidFlagValue {
        flag: String,
        value: String,
        reason: String,
    },

    #[error("undefined macro '{name}'{}{}", referenced_by_suffix(.referenced_by), location_suffix(.location))]
    UndefinedMacro {
        name: String,
        referenced_by: Option<String>,
        location: String,
    },

    #[error("macro cycle: {}{}", .cycle.join(" -> "), location_suffix(.location))]
    MacroCycle { cycle: Vec<String>, location: String },

    #[error("macro expansion depth limit of {limit} exceeded while expanding '{name}'{}", location_suffix(.location))]
    MacroDepthExceeded {
        name: String,
        limit: usize,
        location: String,
    },

    #[error("unknown include '{fragment}'{}", location_suffix(.location))]
    UnknownInclude { fragment: String, location: String },

    #[error("include depth limit of {limit} exceeded while including '{fragment}'{}", location_suffix(.location))]
    IncludeDepthExceeded {
        fragment: String,
        limit: usize,
        location: String,
    },

    #[error("malformed condition '{condition}': {reason}{}", location_suffix(.location))]
    MalformedCondition {
        condition: String,
        reason: String,
        location: String,
    },

    #[error("template syntax error in {context}: {message}")]
    TemplateSyntax { context: String, message: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

fn referenced_by_suffix(referenced_by: &Option<String>) -> String {
    match referenced_by {
        Some(name) => format!(" (referenced by '{}')", name),
        None => String::new(),
    }
}

fn location_suffix(location: &str) -> String {
    if location.is_empty() {
        String::new()
    } else {
        format!(" at {}", location)
    }
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConflictingFlags { .. } => ErrorCode::ConflictingFlags,
            Error::InvalidFlagValue { .. } => ErrorCode::InvalidFlagValue,
            Error::UndefinedMacro { .. } => ErrorCode::UndefinedMacro,
            Error::MacroCycle { .. } => ErrorCode::MacroCycle,
            Error::MacroDepthExceeded { .. } => ErrorCode::MacroDepthExceeded,
            Error::UnknownInclude { .. } => ErrorCode::UnknownInclude,
            Error::IncludeDepthExceeded { .. } => ErrorCode::IncludeDepthExceeded,
            Error::MalformedCondition { .. } => ErrorCode::MalformedCondition,
            Error::TemplateSyntax { .. } => ErrorCode::TemplateSyntax,
            Error::Validation(_) => ErrorCode::ValidationFailed,
        }
    }

    /// Attach a node location to errors that do not carry one yet.
    pub fn at(mut self, here: &str) -> Self {
        match &mut self {
            Error::UndefinedMacro { location, .. }
            | Error::MacroCycle { location, .. }
            | Error::MacroDepthExceeded { location, .. }
            | Error::UnknownInclude { location, .. }
            | Error::IncludeDepthExceeded { location, .. }
            | Error::MalformedCondition { location, .. } => {
                if location.is_empty() {
                    *location = here.to_string();
                }
            }
            _ => {}
        }
        self
    }

    /// The node location, if this error carries one.
    pub fn location(&self) -> Option<&str> {
        match self {
            Error::UndefinedMacro { location, .. }
            | Error::MacroCycle { location, .. }
            | Error::MacroDepthExceeded { location, .. }
            | Error::UnknownInclude { location, .. }
            | Error::IncludeDepthExceeded { location, .. }
            | Error::MalformedCondition { location, .. } => {
                (!location.is_empty()).then_some(location.as_str())
            }
            _ => None,
        }
    }

    pub fn syntax(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::TemplateSyntax {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn malformed(condition: impl fmt::Display, reason: impl Into<String>) -> Self {
        Error::MalformedCondition {
            condition: condition.to_string(),
            reason: reason.into(),
            location: String::new(),
        }
    }
}

/// Serializable view of an [`Error`] for machine-readable reports.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

impl From<&Error> for Diagnostic {
    fn from(err: &Error) -> Self {
        let (rule, fields) = match err {
            Error::Validation(v) => (Some(v.rule.id().to_string()), v.fields.clone()),
            _ => (None, Vec::new()),
        };
        Self {
            code: err.code(),
            message: err.to_string(),
            location: err.location().map(str::to_string),
            rule,
            fields,
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_fills_empty_location_only() {
        let err = Error::UnknownInclude {
            fragment: "param".into(),
            location: String::new(),
        };
        let err = err.at("root#3").at("root#9");
        assert_eq!(err.location(), Some("root#3"));
    }

    #[test]
    fn test_display_includes_location_and_referrer() {
        let err = Error::UndefinedMacro {
            name: "scenario_dir".into(),
            referenced_by: Some("output".into()),
            location: "root#40".into(),
        };
        assert_eq!(
            err.to_string(),
            "undefined macro 'scenario_dir' (referenced by 'output') at root#40"
        );
    }

    #[test]
    fn test_macro_cycle_display() {
        let err = Error::MacroCycle {
            cycle: vec!["A".into(), "B".into(), "A".into()],
            location: String::new(),
        };
        assert_eq!(err.to_string(), "macro cycle: A -> B -> A");
        assert_eq!(err.code(), ErrorCode::MacroCycle);
    }

    #[test]
    fn test_diagnostic_serializes_code() {
        let err = Error::ConflictingFlags {
            group: "climate".into(),
            first: "HADGEM".into(),
            second: "CRU4".into(),
        };
        let json = serde_json::to_value(Diagnostic::from(&err)).unwrap();
        assert_eq!(json["code"], "CONFLICTING_FLAGS");
        assert!(json.get("location").is_none());
    }
}
