use serde::{Deserialize, Serialize};

use crate::zone::ZoneConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabConfig {
    pub zones: ZoneConfig,
    /// Category assigned to a newly created type when the caller doesn't
    /// supply one.
    pub default_category: String,
}

impl Default for VocabConfig {
    fn default() -> Self {
        Self {
            zones: ZoneConfig::default(),
            default_category: "uncategorized".to_string(),
        }
    }
}
