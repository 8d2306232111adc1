use serde::{Deserialize, Serialize};

/// Engine-level configuration supplied by the hosting application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Prefix for store-allocated season numbers, e.g. `SN-1001`.
    pub season_no_prefix: String,
    /// First sequence value handed out by the allocator.
    pub season_no_start: u64,
    pub currency: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            season_no_prefix: "SN".into(),
            season_no_start: 1000,
            currency: "SGD".into(),
        }
    }
}
