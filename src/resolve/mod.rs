//! Resolution
//!
//! # Module Structure
//!
//! - [`cache`] - per-locator memo with single-flight fetches
//! - [`client`] - reference, relation and collection resolution
//! - [`walker`] - bounded breadth-first traversal

pub mod cache;
pub mod client;
pub mod walker;

pub use cache::{CacheConfig, EntityCache, EntryState};
pub use client::Client;
pub use walker::{Walk, WalkItem, WalkOptions, WalkPath, WalkStats};
