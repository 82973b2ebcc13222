//! Composition service resources

use super::Reference;
use serde::{Deserialize, Serialize};

/// Service that binds resource blocks into composed systems
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CompositionService {
    #[serde(default)]
    pub allow_overprovisioning: bool,
    #[serde(default)]
    pub allow_zone_affinity: bool,
    #[serde(default)]
    pub service_enabled: bool,
    #[serde(default)]
    pub resource_blocks: Option<Reference>,
    #[serde(default)]
    pub resource_zones: Option<Reference>,
}

/// Composition state of a resource block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CompositionStatus {
    #[serde(default)]
    pub composition_state: Option<String>,
    #[serde(default)]
    pub reserved_state: Option<bool>,
    #[serde(default)]
    pub sharing_capable: Option<bool>,
}

/// A unit of hardware that can be composed into a system
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceBlock {
    #[serde(default)]
    pub resource_block_type: Vec<String>,
    #[serde(default)]
    pub composition_status: Option<CompositionStatus>,
}

/// Grouping of resource blocks that can be composed together
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Zone {
    #[serde(default)]
    pub zone_type: Option<String>,
}
