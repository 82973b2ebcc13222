//! Entities and document decoding
//!
//! A fetched document becomes either an [`Entity`] or a page of a
//! [`Collection`]. Decoding happens in three passes:
//!
//! 1. every `@odata.id` and `*@odata.nextLink` in the document is rewritten
//!    to its normalized [`Locator`] form, so all later passes (generic and
//!    typed) agree on identity;
//! 2. the common fields and the relations are extracted generically;
//! 3. the typed [`Resource`] variant is decoded, picked by `@odata.type`.

use super::assembly::{Assembly, AssemblyData};
use super::collection::{count_from, reference_from, CollectionPage, MEMBERS};
use super::composition::{CompositionService, ResourceBlock, Zone};
use super::kinds::{is_collection_tag, ResourceKind};
use super::system::{Chassis, ComputerSystem, ServiceRoot};
use super::{Collection, Locator, Reference, Status};
use crate::error::ResolveError;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use url::Url;

/// Keys that never hold relations
const NON_RELATION_KEYS: &[&str] = &["Oem", "Actions", "Links", MEMBERS];

/// Link to one resource or to a set of resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    /// `{"@odata.id": ...}`
    One(Reference),
    /// Array of `{"@odata.id": ...}` with an optional `@odata.count` sibling
    Many(Collection),
}

impl Relation {
    pub fn as_one(&self) -> Option<&Reference> {
        match self {
            Relation::One(reference) => Some(reference),
            Relation::Many(_) => None,
        }
    }

    pub fn as_many(&self) -> Option<&Collection> {
        match self {
            Relation::Many(collection) => Some(collection),
            Relation::One(_) => None,
        }
    }

    /// All references this relation points at, in document order
    pub fn references(&self) -> Vec<&Reference> {
        match self {
            Relation::One(reference) => vec![reference],
            Relation::Many(collection) => collection.iter().collect(),
        }
    }
}

/// Typed payload of an entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    ServiceRoot(ServiceRoot),
    Chassis(Chassis),
    ComputerSystem(ComputerSystem),
    Assembly(Assembly),
    AssemblyData(AssemblyData),
    CompositionService(CompositionService),
    ResourceBlock(ResourceBlock),
    Zone(Zone),
    /// Schema not modeled; fields remain reachable through [`Entity::field`]
    Opaque,
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::ServiceRoot(_) => ResourceKind::ServiceRoot,
            Resource::Chassis(_) => ResourceKind::Chassis,
            Resource::ComputerSystem(_) => ResourceKind::ComputerSystem,
            Resource::Assembly(_) => ResourceKind::Assembly,
            Resource::AssemblyData(_) => ResourceKind::AssemblyData,
            Resource::CompositionService(_) => ResourceKind::CompositionService,
            Resource::ResourceBlock(_) => ResourceKind::ResourceBlock,
            Resource::Zone(_) => ResourceKind::Zone,
            Resource::Opaque => ResourceKind::Opaque,
        }
    }

    fn decode(
        kind: ResourceKind,
        document: &Value,
        relations: &BTreeMap<String, Relation>,
        locator: &Locator,
    ) -> Result<Self, serde_json::Error> {
        let resource = match kind {
            ResourceKind::ServiceRoot => Resource::ServiceRoot(ServiceRoot::deserialize(document)?),
            ResourceKind::Chassis => Resource::Chassis(Chassis::deserialize(document)?),
            ResourceKind::ComputerSystem => {
                Resource::ComputerSystem(ComputerSystem::deserialize(document)?)
            }
            ResourceKind::Assembly => Resource::Assembly(Assembly {
                assemblies: relations
                    .get("Assemblies")
                    .and_then(Relation::as_many)
                    .cloned()
                    .unwrap_or_else(|| Collection::empty(locator.inline("Assemblies"))),
            }),
            ResourceKind::AssemblyData => {
                Resource::AssemblyData(AssemblyData::deserialize(document)?)
            }
            ResourceKind::CompositionService => {
                Resource::CompositionService(CompositionService::deserialize(document)?)
            }
            ResourceKind::ResourceBlock => {
                Resource::ResourceBlock(ResourceBlock::deserialize(document)?)
            }
            ResourceKind::Zone => Resource::Zone(Zone::deserialize(document)?),
            ResourceKind::Any | ResourceKind::Opaque => Resource::Opaque,
        };
        Ok(resource)
    }
}

/// Typed resources that can be projected out of an [`Entity`]
pub trait TypedResource: Sized {
    const KIND: ResourceKind;

    fn project(resource: &Resource) -> Option<&Self>;
}

macro_rules! typed_resource {
    ($($ty:ident),* $(,)?) => {
        $(
            impl TypedResource for $ty {
                const KIND: ResourceKind = ResourceKind::$ty;

                fn project(resource: &Resource) -> Option<&Self> {
                    match resource {
                        Resource::$ty(inner) => Some(inner),
                        _ => None,
                    }
                }
            }
        )*
    };
}

typed_resource!(
    ServiceRoot,
    Chassis,
    ComputerSystem,
    Assembly,
    AssemblyData,
    CompositionService,
    ResourceBlock,
    Zone,
);

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Common {
    #[serde(default, rename = "@odata.type")]
    odata_type: Option<String>,
    #[serde(default, rename = "@odata.etag")]
    etag: Option<String>,
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: Option<Status>,
}

/// Decoded, immutable snapshot of one resource document
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Normalized `@odata.id`
    pub locator: Locator,
    pub odata_type: Option<String>,
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: Option<Status>,
    pub etag: Option<String>,
    pub resource: Resource,
    relations: BTreeMap<String, Relation>,
    document: Value,
}

impl Entity {
    /// Decode an entity document
    ///
    /// `locator` is where the document was fetched from and only names the
    /// document in errors. `expected` picks the typed variant when the
    /// document carries no `@odata.type`.
    pub fn decode(
        locator: &Locator,
        bytes: &[u8],
        base: &Url,
        expected: ResourceKind,
    ) -> Result<Self, ResolveError> {
        match decode_document(locator, bytes, base, expected)? {
            Document::Entity(entity) => Ok(entity),
            Document::Page(_) => Err(ResolveError::mismatch(locator, expected, "a collection")),
        }
    }

    fn from_document(
        fetched: &Locator,
        document: Value,
        expected: ResourceKind,
    ) -> Result<Self, ResolveError> {
        let Value::Object(fields) = &document else {
            return Err(ResolveError::decode(fetched, "document is not a JSON object"));
        };

        let locator = match fields.get("@odata.id") {
            Some(Value::String(id)) => Locator::new(id),
            _ => {
                return Err(ResolveError::decode(
                    fetched,
                    "missing required field '@odata.id'",
                ))
            }
        };

        let common = Common::deserialize(&document).map_err(|e| ResolveError::decode(fetched, e))?;

        let kind = match common.odata_type.as_deref() {
            Some(tag) => ResourceKind::from_type_tag(tag).unwrap_or(ResourceKind::Opaque),
            None if expected != ResourceKind::Any => expected,
            None => ResourceKind::Opaque,
        };

        let relations = extract_relations(&locator, fields)?;
        let resource = Resource::decode(kind, &document, &relations, &locator)
            .map_err(|e| ResolveError::decode(fetched, e))?;

        Ok(Self {
            locator,
            odata_type: common.odata_type,
            id: common.id,
            name: common.name,
            description: common.description,
            status: common.status,
            etag: common.etag,
            resource,
            relations,
            document,
        })
    }

    /// Decode the same document again as `kind`
    ///
    /// Only untagged documents can be reinterpreted; a tagged document keeps
    /// the kind its tag names.
    pub fn reinterpret(&self, kind: ResourceKind) -> Result<Self, ResolveError> {
        if let Some(tag) = &self.odata_type {
            return Err(ResolveError::mismatch(&self.locator, kind, tag));
        }
        Self::from_document(&self.locator, self.document.clone(), kind)
    }

    /// Decode the object at JSON pointer `pointer` in this document
    ///
    /// Members embedded in their owner, such as the entries of an Assembly,
    /// are addressed as `owner#/Assemblies/0` and are read from the owner's
    /// document instead of being fetched.
    pub(crate) fn embedded(
        &self,
        at: &Locator,
        pointer: &str,
        expected: ResourceKind,
    ) -> Result<Self, ResolveError> {
        match self.document.pointer(pointer) {
            Some(object) => Self::from_document(at, object.clone(), expected),
            None => Err(ResolveError::decode(
                at,
                format!("nothing at '{}' in {}", pointer, self.locator),
            )),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.resource.kind()
    }

    /// Typed view of this entity
    pub fn as_kind<T: TypedResource>(&self) -> Option<&T> {
        T::project(&self.resource)
    }

    /// Relation by wire name, e.g. `ResourceBlocks` or `Links/Chassis` as `Chassis`
    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    /// Single-reference relation by name
    pub fn reference(&self, name: &str) -> Option<&Reference> {
        self.relation(name).and_then(Relation::as_one)
    }

    /// Inline collection relation by name
    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.relation(name).and_then(Relation::as_many)
    }

    /// All relations, ordered by name
    pub fn relations(&self) -> impl Iterator<Item = (&str, &Relation)> {
        self.relations.iter().map(|(name, rel)| (name.as_str(), rel))
    }

    /// Raw field from the document
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.document.get(name)
    }

    /// The document this entity was decoded from, with normalized links
    pub fn to_document(&self) -> Value {
        self.document.clone()
    }

    /// Wire encoding of [`Entity::to_document`]
    pub fn encode(&self) -> Vec<u8> {
        // Serializing a `Value` cannot fail
        serde_json::to_vec(&self.document).unwrap_or_default()
    }
}

/// A resolved document, as stored in the cache
#[derive(Debug, Clone)]
pub enum Node {
    Entity(Arc<Entity>),
    Collection(Arc<Collection>),
}

impl Node {
    /// What this node is, for error messages
    pub fn describe(&self) -> String {
        match self {
            Node::Entity(entity) => entity.kind().to_string(),
            Node::Collection(_) => "a collection".to_string(),
        }
    }
}

/// First decode step result
pub(crate) enum Document {
    Entity(Entity),
    Page(CollectionPage),
}

/// Decode a fetched document
pub(crate) fn decode_document(
    locator: &Locator,
    bytes: &[u8],
    base: &Url,
    expected: ResourceKind,
) -> Result<Document, ResolveError> {
    let mut document: Value = serde_json::from_slice(bytes)
        .map_err(|e| ResolveError::decode(locator, format!("invalid JSON: {}", e)))?;

    normalize_links(&mut document, base).map_err(|e| ResolveError::decode(locator, e))?;

    let Value::Object(fields) = &document else {
        return Err(ResolveError::decode(locator, "document is not a JSON object"));
    };

    if is_collection_document(fields) {
        return CollectionPage::from_document(locator, fields).map(Document::Page);
    }

    Entity::from_document(locator, document, expected).map(Document::Entity)
}

fn is_collection_document(fields: &Map<String, Value>) -> bool {
    fields.get(MEMBERS).is_some_and(Value::is_array)
        || fields
            .get("@odata.type")
            .and_then(Value::as_str)
            .is_some_and(is_collection_tag)
}

/// Rewrite every link in the document to its normalized form
fn normalize_links(value: &mut Value, base: &Url) -> Result<(), String> {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                let is_link = key == "@odata.id" || key.ends_with("@odata.nextLink");
                if is_link {
                    if let Value::String(raw) = child {
                        let parsed = match Locator::parse(raw, base) {
                            Ok(parsed) => parsed,
                            Err(e) => return Err(format!("invalid link '{}': {}", raw, e)),
                        };
                        *raw = parsed.as_str().to_string();
                        continue;
                    }
                }
                normalize_links(child, base)?;
            }
        }
        Value::Array(items) => {
            for item in items {
                normalize_links(item, base)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn extract_relations(
    owner: &Locator,
    fields: &Map<String, Value>,
) -> Result<BTreeMap<String, Relation>, ResolveError> {
    let mut relations = BTreeMap::new();
    collect_relations(owner, fields, &mut relations)?;
    if let Some(Value::Object(links)) = fields.get("Links") {
        collect_relations(owner, links, &mut relations)?;
    }
    Ok(relations)
}

fn collect_relations(
    owner: &Locator,
    fields: &Map<String, Value>,
    out: &mut BTreeMap<String, Relation>,
) -> Result<(), ResolveError> {
    for (key, value) in fields {
        if key.contains('@') || NON_RELATION_KEYS.contains(&key.as_str()) || out.contains_key(key)
        {
            continue;
        }

        match value {
            Value::Object(_) => {
                if let Some(reference) = reference_from(value) {
                    out.insert(key.clone(), Relation::One(reference));
                }
            }
            Value::Array(items) => {
                let count_key = format!("{}@odata.count", key);
                let declared = fields
                    .get(&count_key)
                    .map(|v| count_from(owner, &count_key, v))
                    .transpose()?;

                if items.is_empty() && declared.is_none() {
                    continue;
                }

                // Arrays of plain values or embedded objects are not relations
                let Some(members) = items
                    .iter()
                    .map(reference_from)
                    .collect::<Option<Vec<_>>>()
                else {
                    continue;
                };

                let declared = declared.unwrap_or(members.len());
                let collection = Collection::new(owner.inline(key), declared, members)?;
                out.insert(key.clone(), Relation::Many(collection));
            }
            _ => {}
        }
    }
    Ok(())
}
