//! Resource model
//!
//! Everything a decoded document turns into. Nothing in here performs I/O;
//! fetching lives in [`crate::resolve`].
//!
//! # Module Structure
//!
//! - [`locator`] - normalized resource identifiers
//! - [`reference`] - unresolved references and two-state links
//! - [`entity`] - the common entity shape, relations and document decoding
//! - [`collection`] - collections with declared counts
//! - [`kinds`] - `@odata.type` dispatch table
//! - [`status`] - embedded `Status` object
//! - [`assembly`], [`composition`], [`system`] - typed resources

pub mod assembly;
pub mod collection;
pub mod composition;
pub mod entity;
pub mod kinds;
pub mod locator;
pub mod reference;
pub mod status;
pub mod system;

pub use assembly::{Assembly, AssemblyData};
pub use collection::Collection;
pub use composition::{CompositionService, CompositionStatus, ResourceBlock, Zone};
pub use entity::{Entity, Node, Relation, Resource, TypedResource};
pub use kinds::ResourceKind;
pub use locator::Locator;
pub use reference::{Link, Reference};
pub use status::{Health, State, Status};
pub use system::{Chassis, ComputerSystem, ServiceRoot};
