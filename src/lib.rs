//! rfgraph - a lazy, typed entity graph over Redfish-style hypermedia APIs
//!
//! Documents link to each other through `{"@odata.id": ...}` references.
//! [`Client`] fetches them on demand, decodes them into typed [`Entity`]
//! values and caches each locator so it is fetched at most once.
//!
//! ```no_run
//! use rfgraph::{CacheConfig, Client, HttpTransport, ResourceKind};
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let base = url::Url::parse("https://bmc.example")?;
//! let transport = Arc::new(HttpTransport::new(base.clone())?);
//! let client = Client::new(base, transport, CacheConfig::default());
//!
//! let root = client.load_root("/redfish/v1").await?;
//! let composition = client
//!     .follow(&root, "CompositionService", ResourceKind::CompositionService)
//!     .await?;
//! let blocks = client.follow_collection(&composition, "ResourceBlocks").await?;
//! println!("{} resource blocks", blocks.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod model;
pub mod resolve;
pub mod transport;

pub use error::ResolveError;
pub use model::{Collection, Entity, Link, Locator, Reference, Relation, Resource, ResourceKind};
pub use resolve::{CacheConfig, Client, Walk, WalkItem, WalkOptions, WalkPath};
pub use transport::{HttpTransport, Response, Transport};
