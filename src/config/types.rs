//! Settings types.
//!
//! Every field has a serde default so a partial YAML file (or none at all)
//! deserializes into a complete [`Settings`].

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default limit on nested `include` nodes.
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 32;

/// Default limit on nested macro references.
pub const DEFAULT_MAX_EXPANSION_DEPTH: usize = crate::macros::DEFAULT_MAX_EXPANSION_DEPTH;

/// What to do when a redundancy is found in a resolved document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Accept silently.
    Allow,
    /// Accept and report a warning (default).
    #[default]
    Warn,
    /// Report an error and fail the resolution.
    Reject,
}

/// Resolver behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverSettings {
    /// Maximum include nesting before resolution is aborted (default: 32).
    #[serde(default = "default_max_include_depth")]
    pub max_include_depth: usize,

    /// Maximum nesting of macro references in one expansion (default: 64).
    #[serde(default = "default_max_expansion_depth")]
    pub max_expansion_depth: usize,

    /// Top-level keys whose list values accumulate instead of being replaced.
    #[serde(default = "default_repeatable_keys")]
    pub repeatable_keys: Vec<String>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            max_include_depth: default_max_include_depth(),
            max_expansion_depth: default_max_expansion_depth(),
            repeatable_keys: default_repeatable_keys(),
        }
    }
}

impl ResolverSettings {
    pub fn is_repeatable(&self, key: &str) -> bool {
        self.repeatable_keys.iter().any(|k| k == key)
    }
}

fn default_max_include_depth() -> usize {
    DEFAULT_MAX_INCLUDE_DEPTH
}

fn default_max_expansion_depth() -> usize {
    DEFAULT_MAX_EXPANSION_DEPTH
}

fn default_repeatable_keys() -> Vec<String> {
    vec![crate::manifest::OUTPUT_KEY.to_string()]
}

/// Validator behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSettings {
    /// Stop at the first error instead of collecting all of them.
    #[serde(default)]
    pub fail_fast: bool,

    /// Policy for output products declared more than once.
    #[serde(default)]
    pub duplicate_outputs: DuplicatePolicy,

    /// Policy for top-level keys written more than once.
    #[serde(default)]
    pub duplicate_keys: DuplicatePolicy,

    /// Take input declarations from the document's own `input` section when
    /// none are supplied (default: true).
    #[serde(default = "default_true")]
    pub derive_inputs: bool,
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            fail_fast: false,
            duplicate_outputs: DuplicatePolicy::default(),
            duplicate_keys: DuplicatePolicy::default(),
            derive_inputs: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Root settings document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub resolver: ResolverSettings,

    #[serde(default)]
    pub validator: ValidatorSettings,
}

impl Settings {
    /// Load a single settings file without tier merging.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        // Empty or comment-only files parse as null
        let settings: Option<Settings> = serde_yaml::from_str(&content)?;
        Ok(settings.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.resolver.max_include_depth, 32);
        assert!(settings.resolver.is_repeatable("output"));
        assert!(!settings.resolver.is_repeatable("input"));
        assert_eq!(settings.validator.duplicate_outputs, DuplicatePolicy::Warn);
        assert!(settings.validator.derive_inputs);
        assert!(!settings.validator.fail_fast);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let settings: Settings = serde_yaml::from_str(
            r#"
validator:
  duplicate_keys: reject
"#,
        )
        .unwrap();
        assert_eq!(settings.validator.duplicate_keys, DuplicatePolicy::Reject);
        assert_eq!(settings.validator.duplicate_outputs, DuplicatePolicy::Warn);
        assert_eq!(settings.resolver, ResolverSettings::default());
    }

    #[test]
    fn test_load_empty_file() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), "# nothing here\n").unwrap();
        assert_eq!(Settings::load(temp.path()).unwrap(), Settings::default());
    }
}
