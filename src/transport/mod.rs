//! Transport layer
//!
//! The resolve path only needs `GET`; the remaining verbs exist so callers
//! can issue writes through the same handle the client was built with.
//!
//! # Module Structure
//!
//! - [`http`] - `reqwest` implementation speaking to a live service
//!
//! A transport never interprets status codes. Non-2xx responses come back as
//! a [`Response`] and the client decides what they mean; only failures to
//! talk to the service at all are returned as errors.

pub mod http;

use crate::model::Locator;
use anyhow::Result;
use async_trait::async_trait;

pub use http::{format_transport_error, HttpTransport};

/// Raw response returned by a [`Transport`]
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
    /// Value of the `ETag` header, if the service sent one
    pub etag: Option<String>,
}

impl Response {
    /// Successful response with a body
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            etag: None,
        }
    }

    /// Response with the given status and an empty body
    pub fn status(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues requests against a service root
///
/// Implementations own everything below the resource level: connection
/// reuse, TLS, credentials. Locators are service-relative; the transport
/// joins them onto its base URL.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch a document
    async fn get(&self, locator: &Locator) -> Result<Response>;

    /// Apply a partial update, optionally guarded by `If-Match`
    async fn patch(&self, locator: &Locator, body: &[u8], if_match: Option<&str>)
        -> Result<Response>;

    /// Create a resource or invoke an action
    async fn post(&self, locator: &Locator, body: &[u8]) -> Result<Response>;

    /// Delete a resource
    async fn delete(&self, locator: &Locator) -> Result<Response>;
}
