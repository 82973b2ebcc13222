//! Graph walker
//!
//! Breadth-first traversal from a root reference. Each depth level is
//! resolved with bounded concurrency; a level only starts once the previous
//! one has drained, so emitted depths never decrease. Locators are visited
//! at most once per walk, which is what terminates cycles.
//!
//! A reference that turns out to be a collection is not emitted itself: its
//! members join the current level, with paths like `Members[0]`. Members
//! embedded in their owner (`owner#/Assemblies/0`) are read from the owner's
//! cached document, so they cost no extra fetch.

use super::client::Client;
use crate::error::ResolveError;
use crate::model::{Collection, Entity, Locator, Node, Reference, Relation, ResourceKind};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

pub const DEFAULT_MAX_DEPTH: usize = 3;
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Traversal limits
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Relation names to follow; empty follows every relation
    pub relations: Vec<String>,
    pub max_depth: usize,
    /// Fetches in flight per level
    pub max_concurrency: usize,
    /// Stop after this many entities have been emitted
    pub max_nodes: Option<usize>,
    pub cancel: CancellationToken,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            relations: Vec::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_nodes: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl WalkOptions {
    pub fn with_relations<I, S>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relations = relations.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn follows(&self, relation: &str) -> bool {
        self.relations.is_empty() || self.relations.iter().any(|r| r == relation)
    }
}

/// Relation names from the walk root to a node
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct WalkPath(Vec<String>);

impl WalkPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    fn child(&self, relation: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(relation.to_string());
        Self(segments)
    }

    /// Same path with the last segment indexed, `Chassis` -> `Chassis[2]`
    fn indexed(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        match segments.last_mut() {
            Some(last) => last.push_str(&format!("[{}]", index)),
            None => segments.push(format!("[{}]", index)),
        }
        Self(segments)
    }
}

impl fmt::Display for WalkPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// One result of a walk
#[derive(Debug, Clone)]
pub enum WalkItem {
    Node {
        path: WalkPath,
        depth: usize,
        entity: Arc<Entity>,
    },
    Failed {
        path: WalkPath,
        depth: usize,
        locator: Locator,
        error: ResolveError,
    },
}

impl WalkItem {
    pub fn path(&self) -> &WalkPath {
        match self {
            WalkItem::Node { path, .. } | WalkItem::Failed { path, .. } => path,
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            WalkItem::Node { depth, .. } | WalkItem::Failed { depth, .. } => *depth,
        }
    }
}

/// Counters for a running walk
#[derive(Debug, Default)]
pub struct WalkStats {
    visited: AtomicUsize,
    emitted: AtomicUsize,
    failed: AtomicUsize,
    cycles_skipped: AtomicUsize,
}

impl WalkStats {
    /// Distinct locators scheduled, the root included
    pub fn visited(&self) -> usize {
        self.visited.load(Ordering::Relaxed)
    }

    pub fn emitted(&self) -> usize {
        self.emitted.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    /// References skipped because their target was already visited
    pub fn cycles_skipped(&self) -> usize {
        self.cycles_skipped.load(Ordering::Relaxed)
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Stream of [`WalkItem`]s, see [`Client::walk`]
pub struct Walk {
    id: Uuid,
    stats: Arc<WalkStats>,
    inner: BoxStream<'static, WalkItem>,
}

impl Walk {
    /// Id attached to this walk's log span
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn stats(&self) -> &WalkStats {
        &self.stats
    }
}

impl Stream for Walk {
    type Item = WalkItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<WalkItem>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl fmt::Debug for Walk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Walk")
            .field("id", &self.id)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Walk the graph breadth-first from `root`
    ///
    /// Failures are reported as [`WalkItem::Failed`] and do not stop the
    /// walk. Cancelling `options.cancel` lets in-flight fetches finish,
    /// starts no new ones and ends the stream.
    pub fn walk(&self, root: Reference, options: WalkOptions) -> Walk {
        // An unparseable root is reported by the transport as a failed node
        let locator = self
            .canonical(root.locator())
            .unwrap_or_else(|_| root.locator().clone());
        self.start_walk(locator, None, options)
    }

    /// Walk from an entity that is already in hand
    ///
    /// `root` is emitted first without a fetch; the walk then continues from
    /// its relations exactly as [`Client::walk`] would.
    pub fn walk_from(&self, root: Arc<Entity>, options: WalkOptions) -> Walk {
        self.start_walk(root.locator.clone(), Some(root), options)
    }

    fn start_walk(&self, locator: Locator, seed: Option<Arc<Entity>>, options: WalkOptions) -> Walk {
        let id = Uuid::new_v4();
        let span = tracing::info_span!("walk", walk_id = %id);
        let stats = Arc::new(WalkStats::default());

        let root = Target {
            path: WalkPath::root(),
            locator,
        };
        span.in_scope(|| {
            tracing::info!(
                "walk from {} (depth {}, concurrency {})",
                root.locator,
                options.max_depth,
                options.max_concurrency
            )
        });
        WalkStats::bump(&stats.visited);

        let visited = HashSet::from([root.locator.clone()]);
        let (current, seed) = match seed {
            Some(entity) => (Vec::new(), Some((root, entity))),
            None => (vec![root], None),
        };

        let state = WalkState {
            client: self.clone(),
            visited,
            seed,
            current,
            next: Vec::new(),
            depth: 0,
            level: None,
            options,
            stats: Arc::clone(&stats),
        };

        let inner = stream::unfold(state, move |mut state| {
            let span = span.clone();
            async move {
                let item = state.advance().await?;
                Some((item, state))
            }
            .instrument(span)
        })
        .boxed();

        Walk { id, stats, inner }
    }
}

struct Target {
    path: WalkPath,
    locator: Locator,
}

enum Outcome {
    Entity(Target, Arc<Entity>),
    Collection(Target, Arc<Collection>),
    Failed(Target, ResolveError),
    /// Cancelled before its fetch started
    Skipped(Target),
}

struct WalkState {
    client: Client,
    options: WalkOptions,
    visited: HashSet<Locator>,
    /// Root entity supplied by the caller, emitted without a fetch
    seed: Option<(Target, Arc<Entity>)>,
    /// Targets at `depth` not yet started
    current: Vec<Target>,
    /// Targets at `depth + 1`
    next: Vec<Target>,
    depth: usize,
    level: Option<BoxStream<'static, Outcome>>,
    stats: Arc<WalkStats>,
}

impl WalkState {
    async fn advance(&mut self) -> Option<WalkItem> {
        loop {
            if self.limit_reached() {
                tracing::debug!("node limit reached");
                return self.finish();
            }

            if let Some((target, entity)) = self.seed.take() {
                if let Some(item) = self.handle(Outcome::Entity(target, entity)) {
                    return Some(item);
                }
            }

            if let Some(level) = self.level.as_mut() {
                match level.next().await {
                    Some(outcome) => {
                        if let Some(item) = self.handle(outcome) {
                            return Some(item);
                        }
                        continue;
                    }
                    None => self.level = None,
                }
            }

            if self.options.cancel.is_cancelled() {
                tracing::debug!("walk cancelled at depth {}", self.depth);
                return self.finish();
            }

            if !self.current.is_empty() {
                let targets = std::mem::take(&mut self.current);
                tracing::debug!("depth {}: resolving {} targets", self.depth, targets.len());
                self.level = Some(self.start_level(targets));
                continue;
            }

            if self.next.is_empty() || self.depth >= self.options.max_depth {
                return self.finish();
            }
            self.depth += 1;
            self.current = std::mem::take(&mut self.next);
        }
    }

    fn limit_reached(&self) -> bool {
        self.options
            .max_nodes
            .is_some_and(|max| self.stats.emitted() >= max)
    }

    fn finish(&mut self) -> Option<WalkItem> {
        self.seed = None;
        self.level = None;
        self.current.clear();
        self.next.clear();
        tracing::info!(
            "walk finished: {} nodes, {} failed, {} cycles skipped",
            self.stats.emitted(),
            self.stats.failed(),
            self.stats.cycles_skipped()
        );
        None
    }

    fn start_level(&self, targets: Vec<Target>) -> BoxStream<'static, Outcome> {
        let client = self.client.clone();
        let cancel = self.options.cancel.clone();
        stream::iter(targets)
            .map(move |target| visit(client.clone(), target, cancel.clone()))
            .buffer_unordered(self.options.max_concurrency.max(1))
            .boxed()
    }

    fn handle(&mut self, outcome: Outcome) -> Option<WalkItem> {
        match outcome {
            Outcome::Entity(target, entity) => {
                if self.depth < self.options.max_depth {
                    self.enqueue_relations(&target.path, &entity);
                }
                WalkStats::bump(&self.stats.emitted);
                Some(WalkItem::Node {
                    path: target.path,
                    depth: self.depth,
                    entity,
                })
            }
            Outcome::Collection(target, collection) => {
                tracing::debug!(
                    "expanding {} ({} members) at depth {}",
                    collection.locator,
                    collection.len(),
                    self.depth
                );
                for (index, member) in collection.iter().enumerate() {
                    self.discover(target.path.indexed(index), member.locator(), true);
                }
                None
            }
            Outcome::Failed(target, error) => {
                WalkStats::bump(&self.stats.failed);
                tracing::warn!("'{}' failed: {}", target.path, error);
                Some(WalkItem::Failed {
                    path: target.path,
                    depth: self.depth,
                    locator: target.locator,
                    error,
                })
            }
            Outcome::Skipped(target) => {
                tracing::trace!("not resolving {} after cancellation", target.locator);
                None
            }
        }
    }

    fn enqueue_relations(&mut self, path: &WalkPath, entity: &Entity) {
        let mut found = Vec::new();
        for (name, relation) in entity.relations() {
            if !self.options.follows(name) {
                continue;
            }
            let child = path.child(name);
            match relation {
                Relation::One(reference) => found.push((child, reference.locator().clone())),
                Relation::Many(collection) => {
                    for (index, member) in collection.iter().enumerate() {
                        found.push((child.indexed(index), member.locator().clone()));
                    }
                }
            }
        }

        for (path, locator) in found {
            self.discover(path, &locator, false);
        }
    }

    /// Schedule `locator` unless this walk has already seen it
    fn discover(&mut self, path: WalkPath, locator: &Locator, same_depth: bool) {
        if !self.visited.insert(locator.clone()) {
            WalkStats::bump(&self.stats.cycles_skipped);
            tracing::trace!("cycle skipped: '{}' -> {}", path, locator);
            return;
        }

        WalkStats::bump(&self.stats.visited);
        let target = Target {
            path,
            locator: locator.clone(),
        };
        if same_depth {
            self.current.push(target);
        } else {
            self.next.push(target);
        }
    }
}

async fn visit(client: Client, target: Target, cancel: CancellationToken) -> Outcome {
    if cancel.is_cancelled() {
        return Outcome::Skipped(target);
    }

    match client.fetch_node(&target.locator, ResourceKind::Any).await {
        Ok(Node::Entity(entity)) => Outcome::Entity(target, entity),
        Ok(Node::Collection(collection)) => Outcome::Collection(target, collection),
        Err(error) => Outcome::Failed(target, error),
    }
}
