//! Graph client
//!
//! [`Client`] turns references into entities. It owns the transport handle
//! and the cache; there is no process-wide client, so several services can
//! be browsed side by side.

use super::cache::{CacheConfig, EntityCache};
use crate::error::ResolveError;
use crate::model::entity::{decode_document, Document};
use crate::model::{Collection, Entity, Link, Locator, Node, Reference, Relation, ResourceKind};
use crate::transport::{format_transport_error, Response, Transport};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Lazy, typed view of a hypermedia service
///
/// Cloning is cheap and clones share the cache.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    base: Url,
    transport: Arc<dyn Transport>,
    cache: EntityCache<Node>,
}

impl Client {
    pub fn new(base: Url, transport: Arc<dyn Transport>, cache: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                base,
                transport,
                cache: EntityCache::new(cache),
            }),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base
    }

    pub fn cache(&self) -> &EntityCache<Node> {
        &self.inner.cache
    }

    /// Normalize a user-supplied locator against the service base
    pub fn locate(&self, raw: &str) -> Result<Locator, ResolveError> {
        Locator::parse(raw, &self.inner.base)
            .map_err(|e| ResolveError::decode(&Locator::new(raw), format!("invalid locator: {}", e)))
    }

    /// Fetch the service root
    pub async fn load_root(&self, raw: &str) -> Result<Arc<Entity>, ResolveError> {
        let locator = self.locate(raw)?;
        self.resolve(&Reference::new(locator), ResourceKind::ServiceRoot)
            .await
    }

    /// Resolve a reference into an entity of the expected kind
    pub async fn resolve(
        &self,
        reference: &Reference,
        kind: ResourceKind,
    ) -> Result<Arc<Entity>, ResolveError> {
        let locator = self.canonical(reference.locator())?;
        match self.fetch_node(&locator, kind).await? {
            Node::Entity(entity) if kind.accepts(entity.kind()) => Ok(entity),
            Node::Entity(entity) if entity.odata_type.is_none() => {
                // Cached under another caller's expectation
                entity.reinterpret(kind).map(Arc::new)
            }
            node => Err(ResolveError::mismatch(&locator, kind, node.describe())),
        }
    }

    pub async fn resolve_any(&self, reference: &Reference) -> Result<Arc<Entity>, ResolveError> {
        self.resolve(reference, ResourceKind::Any).await
    }

    /// Resolve an optional reference
    ///
    /// A null reference fails with [`ResolveError::MissingRelation`] without
    /// touching the transport.
    pub async fn resolve_relation(
        &self,
        reference: Option<&Reference>,
        relation: &str,
        kind: ResourceKind,
    ) -> Result<Arc<Entity>, ResolveError> {
        match reference {
            Some(reference) => self.resolve(reference, kind).await,
            None => Err(ResolveError::MissingRelation {
                owner: None,
                relation: relation.to_string(),
            }),
        }
    }

    /// Resolve a reference into a collection
    pub async fn resolve_collection(
        &self,
        reference: &Reference,
    ) -> Result<Arc<Collection>, ResolveError> {
        let locator = self.canonical(reference.locator())?;
        match self.fetch_node(&locator, ResourceKind::Any).await? {
            Node::Collection(collection) => Ok(collection),
            node => Err(ResolveError::mismatch(&locator, "a collection", node.describe())),
        }
    }

    /// Follow a single-reference relation of `owner` by name
    pub async fn follow(
        &self,
        owner: &Entity,
        relation: &str,
        kind: ResourceKind,
    ) -> Result<Arc<Entity>, ResolveError> {
        match owner.relation(relation) {
            Some(Relation::One(reference)) => self.resolve(reference, kind).await,
            Some(Relation::Many(collection)) => Err(ResolveError::mismatch(
                &collection.locator,
                kind,
                "a collection",
            )),
            None => Err(missing(owner, relation)),
        }
    }

    /// Collection behind a relation of `owner`
    ///
    /// Inline arrays are returned without a fetch; a reference is resolved
    /// as a collection document.
    pub async fn follow_collection(
        &self,
        owner: &Entity,
        relation: &str,
    ) -> Result<Arc<Collection>, ResolveError> {
        match owner.relation(relation) {
            Some(Relation::Many(collection)) => Ok(Arc::new(collection.clone())),
            Some(Relation::One(reference)) => self.resolve_collection(reference).await,
            None => Err(missing(owner, relation)),
        }
    }

    /// Turn an unresolved link into a resolved one
    pub async fn resolve_link(
        &self,
        link: &Link<Entity>,
        kind: ResourceKind,
    ) -> Result<Link<Entity>, ResolveError> {
        match link {
            Link::Resolved(entity) => Ok(Link::Resolved(Arc::clone(entity))),
            Link::Unresolved(reference) => self.resolve(reference, kind).await.map(Link::Resolved),
        }
    }

    /// Resolve every member of a collection
    ///
    /// At most `max_concurrency` fetches run at once. Results come back in
    /// member order; one failing member does not affect the others. Members
    /// not yet started when `cancel` fires fail with
    /// [`ResolveError::Cancelled`].
    pub async fn resolve_members(
        &self,
        collection: &Collection,
        kind: ResourceKind,
        max_concurrency: usize,
        cancel: &CancellationToken,
    ) -> Vec<Result<Arc<Entity>, ResolveError>> {
        stream::iter(collection.iter())
            .map(|reference| async move {
                if cancel.is_cancelled() {
                    return Err(ResolveError::Cancelled {
                        locator: reference.locator().clone(),
                    });
                }
                self.resolve(reference, kind).await
            })
            .buffered(max_concurrency.max(1))
            .collect()
            .await
    }

    /// Apply a partial update to `entity`
    ///
    /// The request carries `If-Match` with the entity's etag when it has
    /// one. The cached copy is evicted either way, so the next resolve sees
    /// the service's current state.
    pub async fn update(&self, entity: &Entity, patch: &Value) -> Result<(), ResolveError> {
        let locator = &entity.locator;
        let body = serde_json::to_vec(patch).map_err(|e| ResolveError::decode(locator, e))?;

        let result = self
            .inner
            .transport
            .patch(locator, &body, entity.etag.as_deref())
            .await;
        self.invalidate(locator);

        let response = result.map_err(|e| transport_failure(locator, e))?;
        check_status(locator, &response)?;
        tracing::debug!("updated {}", locator);
        Ok(())
    }

    /// Evict a cached document; returns whether anything was evicted
    pub fn invalidate(&self, locator: &Locator) -> bool {
        self.canonical(locator)
            .is_ok_and(|locator| self.inner.cache.invalidate(&locator))
    }

    /// Cache key for `locator`
    ///
    /// Locators built outside a document (`Reference::from`, user input) may
    /// still be absolute or carry trailing slashes; they are normalized
    /// against the base so every spelling shares one cache slot.
    pub(crate) fn canonical(&self, locator: &Locator) -> Result<Locator, ResolveError> {
        self.locate(locator.as_str())
    }

    /// Resolved node for a canonical `locator`, fetching at most once across callers
    pub(crate) async fn fetch_node(
        &self,
        locator: &Locator,
        kind: ResourceKind,
    ) -> Result<Node, ResolveError> {
        self.inner
            .cache
            .get_or_fetch(locator, || async move {
                match locator.fragment() {
                    Some(pointer) => self.load_embedded(locator, pointer, kind).await,
                    None => self.load(locator, kind).await,
                }
            })
            .await
    }

    /// Member embedded in another document, read from the owner's cached copy
    async fn load_embedded(
        &self,
        locator: &Locator,
        pointer: &str,
        kind: ResourceKind,
    ) -> Result<Node, ResolveError> {
        let owner = locator.document();
        let node = self
            .inner
            .cache
            .get_or_fetch(&owner, || self.load(&owner, ResourceKind::Any))
            .await?;

        match node {
            Node::Entity(entity) => {
                tracing::trace!("reading {} from {}", pointer, owner);
                entity
                    .embedded(locator, pointer, kind)
                    .map(|member| Node::Entity(Arc::new(member)))
            }
            node => Err(ResolveError::mismatch(&owner, "an entity", node.describe())),
        }
    }

    async fn load(&self, locator: &Locator, kind: ResourceKind) -> Result<Node, ResolveError> {
        let response = self.get(locator).await?;

        match decode_document(locator, &response.body, &self.inner.base, kind)? {
            Document::Entity(mut entity) => {
                if entity.etag.is_none() {
                    entity.etag = response.etag;
                }
                Ok(Node::Entity(Arc::new(entity)))
            }
            Document::Page(first) => {
                let collection = self.collect_pages(locator, first).await?;
                Ok(Node::Collection(Arc::new(collection)))
            }
        }
    }

    async fn collect_pages(
        &self,
        locator: &Locator,
        first: crate::model::collection::CollectionPage,
    ) -> Result<Collection, ResolveError> {
        let mut seen = HashSet::from([locator.clone()]);
        let mut next = first.next_link.clone();
        let mut pages = vec![first];

        while let Some(link) = next.take() {
            if !seen.insert(link.clone()) {
                return Err(ResolveError::decode(
                    locator,
                    format!("pagination loops back to {}", link),
                ));
            }

            tracing::debug!("fetching next page of {}: {}", locator, link);
            let response = self.get(&link).await?;
            match decode_document(&link, &response.body, &self.inner.base, ResourceKind::Any)? {
                Document::Page(page) => {
                    next = page.next_link.clone();
                    pages.push(page);
                }
                Document::Entity(entity) => {
                    return Err(ResolveError::mismatch(
                        &link,
                        "a collection page",
                        entity.kind(),
                    ))
                }
            }
        }

        Collection::from_pages(locator.clone(), pages).inspect_err(|e| {
            if let ResolveError::CountMismatch { .. } = e {
                tracing::warn!("{}", e);
            }
        })
    }

    async fn get(&self, locator: &Locator) -> Result<Response, ResolveError> {
        let response = self
            .inner
            .transport
            .get(locator)
            .await
            .map_err(|e| transport_failure(locator, e))?;
        check_status(locator, &response)?;
        Ok(response)
    }
}

fn missing(owner: &Entity, relation: &str) -> ResolveError {
    ResolveError::MissingRelation {
        owner: Some(owner.locator.clone()),
        relation: relation.to_string(),
    }
}

fn transport_failure(locator: &Locator, error: anyhow::Error) -> ResolveError {
    ResolveError::Transport {
        locator: locator.clone(),
        status: None,
        cause: format!("{:#}", error),
    }
}

fn check_status(locator: &Locator, response: &Response) -> Result<(), ResolveError> {
    if response.is_success() {
        return Ok(());
    }
    Err(ResolveError::Transport {
        locator: locator.clone(),
        status: Some(response.status),
        cause: format!(
            "HTTP {}: {}",
            response.status,
            format_transport_error(Some(response.status))
        ),
    })
}
