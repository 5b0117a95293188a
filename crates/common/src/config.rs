use serde::{Deserialize, Serialize};

/// Global engine/session configuration shared across planner layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on analyzer fixed-point passes over a statement. The
    /// analyzer stops earlier as soon as a full pass leaves the tree
    /// untouched.
    #[serde(default = "default_max_analyzer_passes")]
    pub max_analyzer_passes: usize,

    /// Database selected when a session does not choose one explicitly.
    #[serde(default)]
    pub default_database: Option<String>,
}

fn default_max_analyzer_passes() -> usize {
    8
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_analyzer_passes: default_max_analyzer_passes(),
            default_database: None,
        }
    }
}
