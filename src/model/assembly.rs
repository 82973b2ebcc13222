//! Assembly resources

use super::Collection;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Assembly: the set of field-replaceable parts of a chassis or system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembly {
    /// Inline `Assemblies` array, as references
    pub assemblies: Collection,
}

/// One assembly entry
///
/// Appears inline in an [`Assembly`] and is also addressable on its own.
/// It has a `MemberId` rather than an `Id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AssemblyData {
    #[serde(default)]
    pub member_id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default, rename = "BinaryDataURI")]
    pub binary_data_uri: String,
    #[serde(default)]
    pub engineering_change_level: String,
    #[serde(default)]
    pub part_number: String,
    #[serde(default)]
    pub physical_context: String,
    #[serde(default)]
    pub producer: String,
    #[serde(default)]
    pub production_date: Option<DateTime<FixedOffset>>,
    #[serde(default, rename = "SKU")]
    pub sku: String,
    #[serde(default)]
    pub serial_number: String,
    #[serde(default)]
    pub spare_part_number: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use serde_json::json;

    #[test]
    fn test_assembly_data_fields() {
        let data: AssemblyData = serde_json::from_value(json!({
            "@odata.id": "/redfish/v1/Assembly/1/AssemblyData",
            "BinaryDataURI": "/image/path",
            "MemberId": "1",
            "Model": "AssemblyOne",
            "ProductionDate": "2013-09-11T17:03:55+00:00",
            "SKU": "1234",
            "SparePartNumber": "12345-1234"
        }))
        .unwrap();

        assert_eq!(data.member_id, "1");
        assert_eq!(data.binary_data_uri, "/image/path");
        assert_eq!(data.sku, "1234");
        assert_eq!(data.spare_part_number, "12345-1234");
        assert_eq!(data.production_date.map(|d| d.year()), Some(2013));
        assert!(data.vendor.is_empty());
    }

    #[test]
    fn test_bad_production_date_is_rejected() {
        let result: Result<AssemblyData, _> =
            serde_json::from_value(json!({"ProductionDate": "last tuesday"}));
        assert!(result.is_err());
    }
}
