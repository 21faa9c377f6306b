use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

use crate::model::resource::MAX_NESTING_DEPTH;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub serial: SerialConfig,
    pub hierarchy: HierarchyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Zero-pad width for generated serial numbers (PRJ-000001)
    pub pad_width: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyConfig {
    /// Upper bound on ancestor/descendant walk steps before the walk is
    /// treated as corrupted. Matches the nesting depth cap.
    pub walk_step_limit: usize,
    /// Maximum length of a generated slug before truncation
    pub slug_max_len: usize,
}

static CONFIG: Lazy<CoreConfig> = Lazy::new(CoreConfig::from_env);

impl CoreConfig {
    /// Global configuration, loaded once from the environment.
    pub fn get() -> &'static CoreConfig {
        &CONFIG
    }

    pub fn from_env() -> Self {
        Self::defaults().with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("LATTICE_SERIAL_PAD_WIDTH") {
            self.serial.pad_width = v.parse().unwrap_or(self.serial.pad_width);
        }
        if let Ok(v) = env::var("LATTICE_WALK_STEP_LIMIT") {
            self.hierarchy.walk_step_limit = v.parse().unwrap_or(self.hierarchy.walk_step_limit);
        }
        if let Ok(v) = env::var("LATTICE_SLUG_MAX_LEN") {
            self.hierarchy.slug_max_len = v.parse().unwrap_or(self.hierarchy.slug_max_len);
        }
        self
    }

    fn defaults() -> Self {
        Self {
            serial: SerialConfig { pad_width: 6 },
            hierarchy: HierarchyConfig {
                walk_step_limit: MAX_NESTING_DEPTH as usize,
                slug_max_len: 64,
            },
        }
    }
}
