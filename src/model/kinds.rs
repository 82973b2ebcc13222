//! Resource kind registry
//!
//! Maps `@odata.type` tags onto the typed variants this crate knows how to
//! decode. Only the schema name matters: `#Chassis.v1_14_0.Chassis` and
//! `#Chassis.v1_2_0.Chassis` both select [`ResourceKind::Chassis`], so newer
//! schema versions keep decoding. Tags that are not in the table decode as
//! [`ResourceKind::Opaque`].

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// Kind of an entity, or the kind a caller expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Accept any entity (only meaningful as an expectation)
    Any,
    ServiceRoot,
    Chassis,
    ComputerSystem,
    Assembly,
    AssemblyData,
    CompositionService,
    ResourceBlock,
    Zone,
    /// Decoded, but of a schema this crate does not model
    Opaque,
}

/// Schema names and the kind each one decodes as
const KIND_TABLE: &[(&str, ResourceKind)] = &[
    ("ServiceRoot", ResourceKind::ServiceRoot),
    ("Chassis", ResourceKind::Chassis),
    ("ComputerSystem", ResourceKind::ComputerSystem),
    ("Assembly", ResourceKind::Assembly),
    ("AssemblyData", ResourceKind::AssemblyData),
    ("CompositionService", ResourceKind::CompositionService),
    ("ResourceBlock", ResourceKind::ResourceBlock),
    ("Zone", ResourceKind::Zone),
];

static REGISTRY: OnceLock<HashMap<&'static str, ResourceKind>> = OnceLock::new();

fn registry() -> &'static HashMap<&'static str, ResourceKind> {
    REGISTRY.get_or_init(|| KIND_TABLE.iter().copied().collect())
}

/// Schema name from an `@odata.type` tag
///
/// `#Assembly.v1_2_1.Assembly` -> `Assembly`
pub fn schema_name(odata_type: &str) -> &str {
    let tag = odata_type.trim_start_matches('#');
    tag.rsplit('.').next().unwrap_or(tag)
}

/// Whether a tag names a collection schema
pub fn is_collection_tag(odata_type: &str) -> bool {
    schema_name(odata_type).ends_with("Collection")
}

impl ResourceKind {
    /// Look up the kind for an `@odata.type` tag
    ///
    /// Returns `None` for schemas missing from the table.
    pub fn from_type_tag(odata_type: &str) -> Option<Self> {
        registry().get(schema_name(odata_type)).copied()
    }

    /// Look up a kind by schema name, e.g. from the command line
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("any") {
            return Some(Self::Any);
        }
        registry()
            .iter()
            .find(|(schema, _)| schema.eq_ignore_ascii_case(name))
            .map(|(_, kind)| *kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "any entity",
            Self::ServiceRoot => "ServiceRoot",
            Self::Chassis => "Chassis",
            Self::ComputerSystem => "ComputerSystem",
            Self::Assembly => "Assembly",
            Self::AssemblyData => "AssemblyData",
            Self::CompositionService => "CompositionService",
            Self::ResourceBlock => "ResourceBlock",
            Self::Zone => "Zone",
            Self::Opaque => "an unmodeled resource",
        }
    }

    /// Whether an entity of kind `actual` satisfies this expectation
    pub fn accepts(&self, actual: ResourceKind) -> bool {
        *self == Self::Any || *self == actual
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
