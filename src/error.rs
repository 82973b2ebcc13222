//! Resolve-path errors
//!
//! Every variant that concerns a fetched document carries the locator of
//! that document, so a failure several hops into a walk names the hop that
//! failed. Errors are `Clone` because the cache hands the same failure to
//! every caller that was waiting on the fetch.

use crate::model::Locator;
use thiserror::Error;

/// Errors raised while resolving references
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The request failed or the service answered with a non-2xx status
    #[error("failed to fetch {locator}: {cause}")]
    Transport {
        locator: Locator,
        status: Option<u16>,
        cause: String,
    },

    /// The document is not valid JSON or lacks a required field
    #[error("failed to decode {locator}: {cause}")]
    Decode { locator: Locator, cause: String },

    /// The document decoded, but not into the kind the caller asked for
    #[error("{locator} is {found}, expected {expected}")]
    SchemaMismatch {
        locator: Locator,
        expected: String,
        found: String,
    },

    /// A collection's declared count disagrees with its members
    #[error("collection {locator} declares {declared} members but lists {actual}")]
    CountMismatch {
        locator: Locator,
        declared: usize,
        actual: usize,
    },

    /// A null reference was resolved
    #[error("relation '{relation}' is not present{}", on_owner(.owner))]
    MissingRelation {
        owner: Option<Locator>,
        relation: String,
    },

    /// Cancelled before the fetch started
    #[error("resolution of {locator} was cancelled")]
    Cancelled { locator: Locator },
}

fn on_owner(owner: &Option<Locator>) -> String {
    owner
        .as_ref()
        .map(|o| format!(" on {}", o))
        .unwrap_or_default()
}

impl ResolveError {
    pub(crate) fn decode(locator: &Locator, cause: impl ToString) -> Self {
        Self::Decode {
            locator: locator.clone(),
            cause: cause.to_string(),
        }
    }

    pub(crate) fn mismatch(locator: &Locator, expected: impl ToString, found: impl ToString) -> Self {
        Self::SchemaMismatch {
            locator: locator.clone(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// Locator of the resource the error concerns
    pub fn locator(&self) -> Option<&Locator> {
        match self {
            Self::Transport { locator, .. }
            | Self::Decode { locator, .. }
            | Self::SchemaMismatch { locator, .. }
            | Self::CountMismatch { locator, .. }
            | Self::Cancelled { locator } => Some(locator),
            Self::MissingRelation { owner, .. } => owner.as_ref(),
        }
    }

    /// HTTP status, when the service answered
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether retrying the same request could succeed
    ///
    /// Transport failures and cancellations qualify. Everything else
    /// describes the document or the calling code and fails the same way
    /// again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Cancelled { .. })
    }
}
