// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Durable per-collection sync state.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::StoreError;
use crate::sync::{BatchOutcome, CollectionState, SyncResult};
use crate::types::{Href, SyncToken};

/// Sync state of every known collection, owned by the caller.
///
/// Entries only change through [`TokenStore::record`] and
/// [`TokenStore::merge`], both of which accept successful results only, so a
/// failed sync always leaves the previous token in place for a retry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenStore {
    #[serde(default)]
    collections: BTreeMap<Href, CollectionState>,

    #[serde(default)]
    last_sync: Option<Timestamp>,

    #[serde(skip)]
    path: Option<PathBuf>,
}

impl TokenStore {
    /// Creates an empty store that is not backed by a file.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the store from `path`.
    ///
    /// A missing file yields an empty store. An unreadable state file is
    /// logged and replaced by an empty store, which costs one full resync per
    /// collection but never wrong deltas.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub async fn load_or_new(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let mut store = match fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<Self>(&content) {
                Ok(store) => {
                    tracing::debug!(path = %path.display(), collections = store.collections.len(), "loaded token store");
                    store
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "failed to parse token store, starting empty");
                    Self::default()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no token store yet, starting empty");
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };

        store.path = Some(path);
        Ok(store)
    }

    /// Writes the store to its file and stamps the last sync time.
    ///
    /// The content goes to a temporary sibling first and is renamed over the
    /// target, so readers see either the old or the new state.
    ///
    /// # Errors
    ///
    /// Returns an error if the store has no file or writing fails. The
    /// timestamp is only updated on success.
    pub async fn persist(&mut self) -> Result<(), StoreError> {
        let path = self.path.as_deref().ok_or(StoreError::NoPath)?;

        let now = Timestamp::now();
        let snapshot = Self {
            collections: self.collections.clone(),
            last_sync: Some(now),
            path: None,
        };
        let content = serde_json::to_string_pretty(&snapshot)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tracing::debug!(path = %parent.display(), "ensuring state directory exists");
            fs::create_dir_all(parent).await?;
        }

        let tmp = temp_sibling(path);
        fs::write(&tmp, content).await?;
        if let Err(err) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(err.into());
        }

        tracing::debug!(path = %path.display(), collections = self.collections.len(), "persisted token store");
        self.last_sync = Some(now);
        Ok(())
    }

    /// The file this store persists to.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Time of the last successful [`TokenStore::persist`].
    #[must_use]
    pub const fn last_sync(&self) -> Option<Timestamp> {
        self.last_sync
    }

    /// Stored state of `collection`.
    #[must_use]
    pub fn get(&self, collection: &Href) -> Option<&CollectionState> {
        self.collections.get(collection)
    }

    /// Stored token of `collection`.
    #[must_use]
    pub fn token(&self, collection: &Href) -> Option<&SyncToken> {
        self.get(collection).map(|state| &state.token)
    }

    /// Collections with stored state.
    pub fn collections(&self) -> impl Iterator<Item = &Href> {
        self.collections.keys()
    }

    /// Number of collections with stored state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.collections.len()
    }

    /// Whether no collection has stored state.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Replaces the state of the result's collection with its new state.
    pub fn record(&mut self, result: &SyncResult) {
        self.collections
            .insert(result.collection.clone(), result.state.clone());
    }

    /// Records every successful collection of a batch; failed ones keep their
    /// previous state. Returns the number of recorded collections.
    pub fn merge(&mut self, outcome: &BatchOutcome) -> usize {
        let mut merged = 0;
        for result in outcome.successes() {
            self.record(result);
            merged += 1;
        }
        merged
    }

    /// Drops the state of `collection`, so its next sync is a full one.
    pub fn forget(&mut self, collection: &Href) -> Option<CollectionState> {
        self.collections.remove(collection)
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4()))
}
