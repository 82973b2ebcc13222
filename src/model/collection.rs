//! Collections
//!
//! A collection is a declared count plus an ordered list of member
//! references. Members are never fetched here; they stay references until a
//! caller resolves the ones it needs.

use super::{Locator, Reference};
use crate::error::ResolveError;
use serde_json::{Map, Value};

/// Member list of a collection document
pub const MEMBERS: &str = "Members";
const MEMBERS_COUNT: &str = "Members@odata.count";
const MEMBERS_NEXT_LINK: &str = "Members@odata.nextLink";

/// Decoded, immutable snapshot of a resource set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub locator: Locator,
    pub odata_type: Option<String>,
    pub name: Option<String>,
    pub declared_count: usize,
    members: Vec<Reference>,
}

impl Collection {
    /// Build a collection, checking the declared count against the members
    pub fn new(
        locator: Locator,
        declared_count: usize,
        members: Vec<Reference>,
    ) -> Result<Self, ResolveError> {
        if declared_count != members.len() {
            return Err(ResolveError::CountMismatch {
                locator,
                declared: declared_count,
                actual: members.len(),
            });
        }

        Ok(Self {
            locator,
            odata_type: None,
            name: None,
            declared_count,
            members,
        })
    }

    /// Empty collection, used when a relation array is absent
    pub fn empty(locator: Locator) -> Self {
        Self {
            locator,
            odata_type: None,
            name: None,
            declared_count: 0,
            members: Vec::new(),
        }
    }

    /// Members in document order
    pub fn members(&self) -> &[Reference] {
        &self.members
    }

    pub fn get(&self, index: usize) -> Option<&Reference> {
        self.members.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Reference> {
        self.members.iter()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Assemble the pages of a collection document into one collection
    pub(crate) fn from_pages(
        locator: Locator,
        pages: Vec<CollectionPage>,
    ) -> Result<Self, ResolveError> {
        let mut pages = pages.into_iter();
        let Some(first) = pages.next() else {
            return Err(ResolveError::decode(&locator, "collection has no pages"));
        };

        let Some(declared_count) = first.declared_count else {
            return Err(ResolveError::decode(
                &locator,
                format!("missing required field '{}'", MEMBERS_COUNT),
            ));
        };

        let mut members = first.members;
        for page in pages {
            members.extend(page.members);
        }

        let mut collection = Self::new(locator, declared_count, members)?;
        collection.odata_type = first.odata_type;
        collection.name = first.name;
        Ok(collection)
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Reference;
    type IntoIter = std::slice::Iter<'a, Reference>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.iter()
    }
}

/// One page of a collection document
#[derive(Debug, Clone)]
pub(crate) struct CollectionPage {
    pub odata_type: Option<String>,
    pub name: Option<String>,
    pub declared_count: Option<usize>,
    pub members: Vec<Reference>,
    pub next_link: Option<Locator>,
}

impl CollectionPage {
    /// Decode a page from a link-normalized document
    pub fn from_document(locator: &Locator, doc: &Map<String, Value>) -> Result<Self, ResolveError> {
        let members = match doc.get(MEMBERS) {
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    reference_from(item).ok_or_else(|| {
                        ResolveError::decode(locator, format!("member {} has no @odata.id", i))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(ResolveError::decode(locator, "'Members' is not an array")),
            None => Vec::new(),
        };

        let declared_count = doc
            .get(MEMBERS_COUNT)
            .map(|v| count_from(locator, MEMBERS_COUNT, v))
            .transpose()?;

        let next_link = match doc.get(MEMBERS_NEXT_LINK) {
            Some(Value::String(link)) => Some(Locator::new(link)),
            Some(Value::Null) | None => None,
            Some(_) => {
                return Err(ResolveError::decode(
                    locator,
                    format!("'{}' is not a string", MEMBERS_NEXT_LINK),
                ))
            }
        };

        Ok(Self {
            odata_type: string_field(doc, "@odata.type"),
            name: string_field(doc, "Name"),
            declared_count,
            members,
            next_link,
        })
    }
}

/// Reference from an object carrying `@odata.id`
pub(crate) fn reference_from(value: &Value) -> Option<Reference> {
    value
        .get("@odata.id")
        .and_then(Value::as_str)
        .map(|id| Reference::new(Locator::new(id)))
}

/// Non-negative integer count annotation
pub(crate) fn count_from(locator: &Locator, field: &str, value: &Value) -> Result<usize, ResolveError> {
    value
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| ResolveError::decode(locator, format!("'{}' is not a count", field)))
}

fn string_field(doc: &Map<String, Value>, field: &str) -> Option<String> {
    doc.get(field).and_then(Value::as_str).map(str::to_string)
}
