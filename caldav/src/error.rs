// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use crate::types::Href;

/// `CalDAV` client errors.
///
/// Everything except [`CalDavError::InvalidSyncToken`] is a transport-level
/// failure from the point of view of synchronization.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum CalDavError {
    /// HTTP layer error.
    #[error("HTTP error: {0}")]
    Http(String),

    /// XML parsing/writing error.
    #[error("XML error: {0}")]
    Xml(String),

    /// Authentication error.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(Href),

    /// The server no longer accepts the sync token sent for this collection.
    #[error("Sync token rejected for collection {0}")]
    InvalidSyncToken(Href),

    /// Invalid response from server.
    #[error("Invalid server response: {0}")]
    InvalidResponse(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for CalDavError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

impl From<quick_xml::Error> for CalDavError {
    fn from(e: quick_xml::Error) -> Self {
        Self::Xml(e.to_string())
    }
}

/// Raised by `quick_xml::Writer` while building request bodies.
impl From<std::io::Error> for CalDavError {
    fn from(e: std::io::Error) -> Self {
        Self::Xml(format!("XML write error: {e}"))
    }
}

/// Failure of a single collection synchronization.
///
/// A rejected sync token never shows up here: the coordinator recovers from it
/// by running a full resync.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The collection identifier was empty.
    #[error("Collection identifier must not be empty")]
    EmptyCollection,

    /// The remote collaborator failed (network, auth, server error).
    #[error("Failed to sync collection {collection}: {source}")]
    Remote {
        /// The collection being synced.
        collection: Href,
        /// The underlying client error.
        #[source]
        source: CalDavError,
    },

    /// The caller cancelled the sync while a request was in flight.
    #[error("Sync of collection {0} was cancelled")]
    Cancelled(Href),

    /// A request took longer than the configured limit.
    #[error("Sync of collection {collection} timed out after {limit:?}")]
    TimedOut {
        /// The collection being synced.
        collection: Href,
        /// The configured per-request limit.
        limit: Duration,
    },
}

impl SyncError {
    /// The collection this error belongs to, if any.
    #[must_use]
    pub fn collection(&self) -> Option<&Href> {
        match self {
            Self::EmptyCollection => None,
            Self::Remote { collection, .. } | Self::TimedOut { collection, .. } => Some(collection),
            Self::Cancelled(collection) => Some(collection),
        }
    }
}

/// Summary of a batch in which some collections failed.
///
/// Successful collections of the same batch are unaffected and can still be
/// merged into the token store.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{} of {total} collections failed to sync", .failed.len())]
pub struct PartialBatchFailure {
    /// Collections whose sync failed.
    pub failed: Vec<Href>,
    /// Number of collections in the batch.
    pub total: usize,
}

/// Token store persistence errors.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the state file failed.
    #[error("Token store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The state could not be serialized.
    #[error("Token store serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The store was created in memory and has nowhere to persist to.
    #[error("Token store has no backing file")]
    NoPath,
}
