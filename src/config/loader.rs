//! Settings loader with tier-based merging.

use super::types::Settings;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the settings file looked up in each tier directory.
pub const SETTINGS_FILE: &str = "config.yaml";

/// Settings tier priority (lowest to highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigTier {
    /// Embedded defaults (lowest priority)
    Defaults = 0,
    /// Project-level settings (`./simconf/`)
    Project = 1,
    /// User-level settings (`~/.simconf/`)
    User = 2,
    /// Environment variables (highest priority)
    Environment = 3,
}

impl std::fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigTier::Defaults => write!(f, "defaults"),
            ConfigTier::Project => write!(f, "project"),
            ConfigTier::User => write!(f, "user"),
            ConfigTier::Environment => write!(f, "environment"),
        }
    }
}

/// Directories searched for each tier.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub project_dir: Option<PathBuf>,
    pub user_dir: Option<PathBuf>,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::discover()
    }
}

impl ConfigPaths {
    /// Discover directories from the environment and defaults.
    pub fn discover() -> Self {
        // User dir: SIMCONF_USER_DIR or ~/.simconf
        let user_dir = std::env::var("SIMCONF_USER_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".simconf")));

        // Project dir: SIMCONF_PROJECT_DIR or $CWD/simconf
        let project_dir = std::env::var("SIMCONF_PROJECT_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| Some(PathBuf::from("simconf")));

        Self {
            project_dir,
            user_dir,
        }
    }

    pub fn with_dirs(project_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self {
            project_dir,
            user_dir,
        }
    }

    fn tier_files(&self) -> impl Iterator<Item = (ConfigTier, PathBuf)> + '_ {
        [
            (ConfigTier::Project, self.project_dir.as_deref()),
            (ConfigTier::User, self.user_dir.as_deref()),
        ]
        .into_iter()
        .filter_map(|(tier, dir)| dir.map(|d| (tier, d.join(SETTINGS_FILE))))
    }
}

/// Loads [`Settings`] from every tier and remembers where they came from.
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    pub paths: ConfigPaths,
    settings: Settings,
    /// Files that contributed, lowest tier first.
    sources: Vec<(ConfigTier, PathBuf)>,
}

impl SettingsLoader {
    /// Load settings from all tiers.
    pub fn load() -> Result<Self> {
        Self::load_with_paths(ConfigPaths::discover())
    }

    /// Load with an explicit file from `--config`, bypassing the tier search.
    pub fn load_file(path: &Path) -> Result<Self> {
        let mut settings = Settings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?;
        Self::apply_env_overrides(&mut settings)?;
        Ok(Self {
            paths: ConfigPaths::with_dirs(None, None),
            settings,
            sources: vec![(ConfigTier::Project, path.to_path_buf())],
        })
    }

    /// Load settings with explicit tier directories.
    pub fn load_with_paths(paths: ConfigPaths) -> Result<Self> {
        // Explicit file overrides every tier
        if let Ok(explicit) = std::env::var("SIMCONF_CONFIG_PATH") {
            let mut loader = Self::load_file(Path::new(&explicit))?;
            loader.paths = paths;
            return Ok(loader);
        }

        let mut sources = Vec::new();

        // Tier 1: Defaults (embedded)
        let mut merged = serde_json::to_value(Settings::default())?;

        // Tiers 2 and 3: project then user
        for (tier, file) in paths.tier_files() {
            if !file.exists() {
                continue;
            }
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            match serde_yaml::from_str::<Value>(&content) {
                Ok(value) => {
                    debug!(tier = %tier, path = %file.display(), "Loaded settings tier");
                    overlay_tier(&mut merged, value);
                    sources.push((tier, file));
                }
                Err(e) => warn!(path = %file.display(), error = %e, "Ignoring unparseable settings file"),
            }
        }

        let mut settings: Settings =
            serde_json::from_value(merged).context("invalid settings after merging tiers")?;

        // Tier 4: Environment variable overrides
        Self::apply_env_overrides(&mut settings)?;

        Ok(Self {
            paths,
            settings,
            sources,
        })
    }

    fn apply_env_overrides(settings: &mut Settings) -> Result<()> {
        if let Ok(raw) = std::env::var("SIMCONF_FAIL_FAST") {
            settings.validator.fail_fast = matches!(
                raw.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }

        if let Ok(raw) = std::env::var("SIMCONF_MAX_INCLUDE_DEPTH") {
            settings.resolver.max_include_depth = raw
                .trim()
                .parse()
                .with_context(|| format!("SIMCONF_MAX_INCLUDE_DEPTH is not a number: '{}'", raw))?;
        }

        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn into_settings(self) -> Settings {
        self.settings
    }

    pub fn sources(&self) -> &[(ConfigTier, PathBuf)] {
        &self.sources
    }
}

/// Lay a higher tier over `base` in place. Sections merge key by key; lists,
/// scalars and mismatched shapes are replaced. Null leaves the base value.
fn overlay_tier(base: &mut Value, tier: Value) {
    match (base, tier) {
        (_, Value::Null) => {}
        (Value::Object(section), Value::Object(fields)) => {
            for (key, value) in fields {
                match section.get_mut(&key) {
                    Some(existing) => overlay_tier(existing, value),
                    None => {
                        section.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DuplicatePolicy;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_only() {
        let temp = TempDir::new().unwrap();
        let paths = ConfigPaths::with_dirs(
            Some(temp.path().join("project")),
            Some(temp.path().join("user")),
        );

        let loader = SettingsLoader::load_with_paths(paths).unwrap();
        assert_eq!(loader.settings().resolver.max_include_depth, 32);
        assert!(loader.sources().is_empty());
    }

    #[test]
    fn test_project_overrides_defaults() {
        let temp = TempDir::new().unwrap();
        let project_dir = temp.path().join("simconf");
        std::fs::create_dir_all(&project_dir).unwrap();
        std::fs::write(
            project_dir.join(SETTINGS_FILE),
            "resolver:\n  max_include_depth: 4\n",
        )
        .unwrap();

        let paths = ConfigPaths::with_dirs(Some(project_dir), Some(temp.path().join("user")));
        let loader = SettingsLoader::load_with_paths(paths).unwrap();

        assert_eq!(loader.settings().resolver.max_include_depth, 4);
        assert_eq!(loader.settings().resolver.repeatable_keys, vec!["output"]);
        assert_eq!(loader.sources().len(), 1);
        assert_eq!(loader.sources()[0].0, ConfigTier::Project);
    }

    #[test]
    fn test_user_overrides_project() {
        let temp = TempDir::new().unwrap();
        let project_dir = temp.path().join("simconf");
        let user_dir = temp.path().join("user");
        std::fs::create_dir_all(&project_dir).unwrap();
        std::fs::create_dir_all(&user_dir).unwrap();

        std::fs::write(
            project_dir.join(SETTINGS_FILE),
            "validator:\n  duplicate_keys: reject\n  duplicate_outputs: allow\n",
        )
        .unwrap();
        std::fs::write(
            user_dir.join(SETTINGS_FILE),
            "validator:\n  duplicate_outputs: reject\n",
        )
        .unwrap();

        let paths = ConfigPaths::with_dirs(Some(project_dir), Some(user_dir));
        let settings = SettingsLoader::load_with_paths(paths).unwrap().into_settings();

        assert_eq!(settings.validator.duplicate_outputs, DuplicatePolicy::Reject);
        assert_eq!(settings.validator.duplicate_keys, DuplicatePolicy::Reject);
    }

    #[test]
    fn test_tier_lists_replace_and_nulls_keep() {
        let temp = TempDir::new().unwrap();
        let project_dir = temp.path().join("simconf");
        std::fs::create_dir_all(&project_dir).unwrap();
        std::fs::write(
            project_dir.join(SETTINGS_FILE),
            "resolver:\n  repeatable_keys: [outputvar]\n  max_include_depth: ~\n",
        )
        .unwrap();

        let paths = ConfigPaths::with_dirs(Some(project_dir), Some(temp.path().join("user")));
        let settings = SettingsLoader::load_with_paths(paths).unwrap().into_settings();

        assert_eq!(settings.resolver.repeatable_keys, vec!["outputvar"]);
        assert_eq!(settings.resolver.max_include_depth, 32);
    }

    #[test]
    fn test_load_file_bypasses_tiers() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("custom.yaml");
        std::fs::write(&file, "validator:\n  fail_fast: true\n").unwrap();

        let loader = SettingsLoader::load_file(&file).unwrap();
        assert!(loader.settings().validator.fail_fast);
        assert_eq!(loader.sources()[0].1, file);
    }
}
