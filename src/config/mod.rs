//! Tiered settings.
//!
//! Settings come from four tiers merged field by field:
//! 1. **Defaults** - compiled in
//! 2. **Project** - `$CWD/simconf/config.yaml`
//! 3. **User** - `~/.simconf/config.yaml`
//! 4. **Environment** - `SIMCONF_*` variables
//!
//! ## Environment Variables
//! - `SIMCONF_CONFIG_PATH` - Explicit settings file (overrides all tiers)
//! - `SIMCONF_PROJECT_DIR` - Project settings dir (default: `./simconf`)
//! - `SIMCONF_USER_DIR` - User settings dir (default: `~/.simconf`)
//! - `SIMCONF_FAIL_FAST` - Stop validation at the first error
//! - `SIMCONF_MAX_INCLUDE_DEPTH` - Include nesting limit

mod loader;
mod types;

pub use loader::{ConfigPaths, ConfigTier, SETTINGS_FILE, SettingsLoader};
pub use types::*;
