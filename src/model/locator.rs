//! Resource locators
//!
//! Services hand out links in several spellings for the same resource:
//! absolute URLs, rooted paths, paths with trailing slashes. A [`Locator`]
//! is the one normalized form used for equality, hashing and cache keys.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use url::Url;

/// Normalized identifier of a remote resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    /// Wrap an already-rooted locator, stripping trailing slashes
    pub fn new(raw: &str) -> Self {
        Self(trim_trailing_slashes(raw.trim()))
    }

    /// Normalize `raw` against the service base URL
    ///
    /// Relative forms and dot segments are resolved against `base`. Links
    /// that stay on the service origin keep only their path, query and
    /// fragment; links to another origin stay absolute.
    pub fn parse(raw: &str, base: &Url) -> Result<Self, url::ParseError> {
        let joined = base.join(raw.trim())?;

        if joined.origin() != base.origin() {
            let mut absolute = joined.clone();
            absolute.set_path(&trim_trailing_slashes(joined.path()));
            return Ok(Self(absolute.to_string()));
        }

        let mut out = trim_trailing_slashes(joined.path());
        if let Some(query) = joined.query() {
            out.push('?');
            out.push_str(query);
        }
        if let Some(fragment) = joined.fragment() {
            out.push('#');
            out.push_str(fragment);
        }
        Ok(Self(out))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Locator of an inline member array, e.g. `/redfish/v1/Assembly/1#/Assemblies`
    pub fn inline(&self, field: &str) -> Self {
        let base = self.0.split('#').next().unwrap_or(&self.0);
        Self(format!("{}#/{}", base, field))
    }

    /// JSON pointer after `#`, for members embedded in another document
    pub fn fragment(&self) -> Option<&str> {
        self.0.split_once('#').map(|(_, fragment)| fragment)
    }

    /// Locator of the document this one lives in, without its fragment
    pub fn document(&self) -> Self {
        match self.0.split_once('#') {
            Some((document, _)) => Self(document.to_string()),
            None => self.clone(),
        }
    }

    /// Last path segment, useful for display
    pub fn leaf(&self) -> &str {
        let path = self.0.split(['?', '#']).next().unwrap_or(&self.0);
        path.rsplit('/').next().unwrap_or(path)
    }
}

fn trim_trailing_slashes(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Locator {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Locator {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl<'de> Deserialize<'de> for Locator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::new(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://bmc.example").unwrap()
    }

    #[test]
    fn test_trailing_slashes_are_stripped() {
        assert_eq!(Locator::new("/redfish/v1/").as_str(), "/redfish/v1");
        assert_eq!(Locator::new("/redfish/v1//").as_str(), "/redfish/v1");
        assert_eq!(Locator::new("/").as_str(), "/");
    }

    #[test]
    fn test_parse_same_origin_absolute_url() {
        let locator = Locator::parse("https://bmc.example/redfish/v1/Systems/1/", &base()).unwrap();
        assert_eq!(locator.as_str(), "/redfish/v1/Systems/1");
        assert_eq!(locator, Locator::new("/redfish/v1/Systems/1"));
    }

    #[test]
    fn test_parse_relative_forms() {
        let base = Url::parse("https://bmc.example/redfish/v1/").unwrap();
        assert_eq!(
            Locator::parse("Chassis/1", &base).unwrap().as_str(),
            "/redfish/v1/Chassis/1"
        );
        assert_eq!(
            Locator::parse("/redfish/v1/Chassis/../Systems/1", &base)
                .unwrap()
                .as_str(),
            "/redfish/v1/Systems/1"
        );
    }

    #[test]
    fn test_parse_keeps_query_and_fragment() {
        let locator = Locator::parse("/redfish/v1/Systems?$skip=2", &base()).unwrap();
        assert_eq!(locator.as_str(), "/redfish/v1/Systems?$skip=2");

        let locator = Locator::parse("/redfish/v1/Assembly/1#/Assemblies/0", &base()).unwrap();
        assert_eq!(locator.as_str(), "/redfish/v1/Assembly/1#/Assemblies/0");
    }

    #[test]
    fn test_parse_other_origin_stays_absolute() {
        let locator = Locator::parse("https://other.example/redfish/v1/", &base()).unwrap();
        assert_eq!(locator.as_str(), "https://other.example/redfish/v1");
    }

    #[test]
    fn test_inline_and_leaf() {
        let locator = Locator::new("/redfish/v1/Assembly/1");
        assert_eq!(locator.inline("Assemblies").as_str(), "/redfish/v1/Assembly/1#/Assemblies");
        assert_eq!(locator.leaf(), "1");
        assert_eq!(Locator::new("/redfish/v1/Systems?$top=2").leaf(), "Systems");
    }

    #[test]
    fn test_fragment_and_document() {
        let member = Locator::new("/redfish/v1/Chassis/1/Assembly#/Assemblies/0");
        assert_eq!(member.fragment(), Some("/Assemblies/0"));
        assert_eq!(member.document().as_str(), "/redfish/v1/Chassis/1/Assembly");

        let plain = Locator::new("/redfish/v1/Chassis/1");
        assert_eq!(plain.fragment(), None);
        assert_eq!(plain.document(), plain);
    }
}
