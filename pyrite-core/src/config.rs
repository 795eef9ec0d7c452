//! Runtime configuration. Loaded from a `.ron` document through
//! the `Filesystem` trait, or constructed by `Default` when no override
//! file exists — the same fallback-to-defaults posture `rendy-factory`'s
//! config types take.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Bypass the on-disk pipeline-state blob cache entirely. Default
    /// `true`, matching the Dusk engine's `DisablePipelineCache`
    /// dev-variable default.
    #[serde(default = "default_true")]
    pub disable_pipeline_cache: bool,

    #[serde(default)]
    pub enable_vsync: bool,

    #[serde(default = "default_screen_size")]
    pub screen_size: (u32, u32),

    /// 0 means "pick the highest available refresh rate".
    #[serde(default)]
    pub refresh_rate: i32,

    #[serde(default)]
    pub use_debug_layer: bool,
}

fn default_true() -> bool {
    true
}

fn default_screen_size() -> (u32, u32) {
    (1920, 1080)
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            disable_pipeline_cache: true,
            enable_vsync: false,
            screen_size: default_screen_size(),
            refresh_rate: 0,
            use_debug_layer: false,
        }
    }
}

impl EngineConfig {
    pub fn from_ron_str(source: &str) -> Result<Self, crate::error::CoreError> {
        ron::de::from_str(source).map_err(|err| crate::error::CoreError::ConfigParse(err.to_string()))
    }

    pub fn to_ron_string(&self) -> Result<String, crate::error::CoreError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|err| crate::error::CoreError::ConfigParse(err.to_string()))
    }
}
