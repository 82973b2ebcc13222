//! References and links

use super::Locator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Unresolved pointer to another resource
///
/// Wire form is `{"@odata.id": "..."}`. Any other fields that happen to be
/// inlined next to the id are ignored; the reference carries no payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "@odata.id")]
    locator: Locator,
}

impl Reference {
    pub fn new(locator: Locator) -> Self {
        Self { locator }
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Wrap in an unresolved [`Link`]
    pub fn link<T>(&self) -> Link<T> {
        Link::Unresolved(self.clone())
    }
}

impl From<Locator> for Reference {
    fn from(locator: Locator) -> Self {
        Self::new(locator)
    }
}

impl From<&str> for Reference {
    fn from(raw: &str) -> Self {
        Self::new(Locator::new(raw))
    }
}

/// A relation that is either still a reference or already fetched
///
/// Keeps the fetch explicit: going from `Unresolved` to `Resolved` only
/// happens through [`crate::Client::resolve_link`].
#[derive(Debug)]
pub enum Link<T> {
    Unresolved(Reference),
    Resolved(Arc<T>),
}

impl<T> Link<T> {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Link::Resolved(_))
    }

    /// The resolved value, if any
    pub fn get(&self) -> Option<&Arc<T>> {
        match self {
            Link::Resolved(value) => Some(value),
            Link::Unresolved(_) => None,
        }
    }

    pub fn reference(&self) -> Option<&Reference> {
        match self {
            Link::Unresolved(reference) => Some(reference),
            Link::Resolved(_) => None,
        }
    }
}

impl<T> Clone for Link<T> {
    fn clone(&self) -> Self {
        match self {
            Link::Unresolved(reference) => Link::Unresolved(reference.clone()),
            Link::Resolved(value) => Link::Resolved(Arc::clone(value)),
        }
    }
}
