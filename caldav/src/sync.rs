// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Synchronization of remote collections with sync tokens.
//!
//! The [`SyncCoordinator`] turns a collection and its previously stored
//! [`CollectionState`] into a [`SyncResult`]: the classified changes since
//! the last run plus the state to store for the next one. It never touches
//! the [`TokenStore`]; callers merge successful results themselves.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;

use futures::StreamExt;
use futures::stream;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelSignal;
use crate::config::SyncConfig;
use crate::error::{CalDavError, PartialBatchFailure, SyncError};
use crate::remote::{RemoteChange, RemoteCollection, RemoteDelta, RemoteItem};
use crate::store::TokenStore;
use crate::types::{ETag, Href, SyncToken};

/// Persisted per-collection state: the token and the items seen with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionState {
    /// Token to resume from.
    pub token: SyncToken,
    /// Items present in the collection when `token` was issued.
    #[serde(default)]
    pub items: BTreeMap<Href, Option<ETag>>,
}

impl CollectionState {
    /// Creates a state with a token and no known items.
    #[must_use]
    pub const fn new(token: SyncToken) -> Self {
        Self {
            token,
            items: BTreeMap::new(),
        }
    }
}

/// How an item changed relative to the previously seen state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Not seen before.
    New,
    /// Seen before with possibly different content.
    Modified,
    /// Removed from the collection.
    Deleted,
}

/// A classified change of a single item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemChange {
    /// The href of the item.
    pub href: Href,
    /// The classification.
    pub kind: ChangeKind,
    /// The new entity tag; always `None` for deletions.
    pub etag: Option<ETag>,
    /// Raw calendar data; always `None` for deletions.
    pub data: Option<String>,
}

impl ItemChange {
    fn new(kind: ChangeKind, item: RemoteItem) -> Self {
        Self {
            href: item.href,
            kind,
            etag: item.etag,
            data: item.data,
        }
    }

    fn deleted(href: Href) -> Self {
        Self {
            href,
            kind: ChangeKind::Deleted,
            etag: None,
            data: None,
        }
    }
}

/// How a sync was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// No prior state: everything was listed.
    Full,
    /// Only the changes since the stored token were fetched.
    Incremental,
    /// The stored token was rejected, so everything was listed again.
    ///
    /// Consumers expecting a small delta receive the complete item set.
    Resync,
}

/// Outcome of syncing one collection.
#[derive(Debug, Clone)]
pub struct SyncResult {
    /// The synced collection.
    pub collection: Href,
    /// How the sync was carried out.
    pub mode: SyncMode,
    /// Classified changes, each href at most once.
    pub changes: Vec<ItemChange>,
    /// State to store for the next sync.
    pub state: CollectionState,
}

impl SyncResult {
    /// The token to store for the next incremental sync.
    #[must_use]
    pub const fn new_token(&self) -> &SyncToken {
        &self.state.token
    }

    /// Whether a full listing replaced the requested incremental sync.
    #[must_use]
    pub fn is_resync(&self) -> bool {
        self.mode == SyncMode::Resync
    }

    /// Whether nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Changes of the given kind, in order.
    pub fn of_kind(&self, kind: ChangeKind) -> impl Iterator<Item = &ItemChange> {
        self.changes.iter().filter(move |c| c.kind == kind)
    }

    /// Items not seen before.
    pub fn new_items(&self) -> impl Iterator<Item = &ItemChange> {
        self.of_kind(ChangeKind::New)
    }

    /// Items seen before that changed.
    pub fn modified_items(&self) -> impl Iterator<Item = &ItemChange> {
        self.of_kind(ChangeKind::Modified)
    }

    /// Items removed from the collection.
    pub fn deleted_items(&self) -> impl Iterator<Item = &ItemChange> {
        self.of_kind(ChangeKind::Deleted)
    }
}

/// Per-collection outcomes of [`SyncCoordinator::sync_many`].
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Result of every requested collection.
    pub results: BTreeMap<Href, Result<SyncResult, SyncError>>,
}

impl BatchOutcome {
    /// Whether every collection synced.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.results.values().all(Result::is_ok)
    }

    /// Successful results.
    pub fn successes(&self) -> impl Iterator<Item = &SyncResult> {
        self.results.values().filter_map(|r| r.as_ref().ok())
    }

    /// Failed collections with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&Href, &SyncError)> {
        self.results
            .iter()
            .filter_map(|(href, r)| r.as_ref().err().map(|e| (href, e)))
    }

    /// Summary of the failed collections, if any failed.
    #[must_use]
    pub fn partial_failure(&self) -> Option<PartialBatchFailure> {
        let failed: Vec<Href> = self.failures().map(|(href, _)| href.clone()).collect();
        if failed.is_empty() {
            None
        } else {
            Some(PartialBatchFailure {
                failed,
                total: self.results.len(),
            })
        }
    }
}

/// Drives collection syncs against a remote.
#[derive(Debug)]
pub struct SyncCoordinator<R> {
    remote: R,
    config: SyncConfig,
}

impl<R: RemoteCollection> SyncCoordinator<R> {
    /// Creates a coordinator with the default configuration.
    pub fn new(remote: R) -> Self {
        Self::with_config(remote, SyncConfig::default())
    }

    /// Creates a coordinator with the given configuration.
    pub const fn with_config(remote: R, config: SyncConfig) -> Self {
        Self { remote, config }
    }

    /// Returns the remote this coordinator syncs against.
    pub const fn remote(&self) -> &R {
        &self.remote
    }

    /// Syncs one collection.
    ///
    /// Without `prior` state every current item is returned as
    /// [`ChangeKind::New`]. With it, only the changes since its token are
    /// returned; if the remote rejects that token, a full listing is returned
    /// instead with [`SyncMode::Resync`].
    ///
    /// # Errors
    ///
    /// Returns an error if the remote fails for another reason, or if the
    /// call is cancelled or times out. The caller's stored state must then be
    /// kept as is.
    #[tracing::instrument(skip(self, prior, cancel), fields(incremental = prior.is_some()))]
    pub async fn sync_collection(
        &self,
        collection: &Href,
        prior: Option<&CollectionState>,
        cancel: &CancelSignal,
    ) -> Result<SyncResult, SyncError> {
        if collection.is_empty() {
            return Err(SyncError::EmptyCollection);
        }

        let Some(prior) = prior else {
            return self.full_sync(collection, SyncMode::Full, cancel).await;
        };

        let delta = self
            .guard(collection, cancel, self.remote.delta(collection, &prior.token))
            .await?;

        match delta {
            Ok(delta) => {
                let result = classify_delta(collection, prior, delta);
                tracing::debug!(changes = result.changes.len(), "incremental sync finished");
                Ok(result)
            }
            Err(CalDavError::InvalidSyncToken(_)) => {
                tracing::warn!(token = %prior.token, "sync token rejected, running a full resync");
                self.full_sync(collection, SyncMode::Resync, cancel).await
            }
            Err(source) => Err(SyncError::Remote {
                collection: collection.clone(),
                source,
            }),
        }
    }

    /// Syncs several collections, isolating their failures.
    ///
    /// Up to [`SyncConfig::concurrency`] collections are in flight at once.
    /// Prior states are read from `store`, which is left untouched; merge the
    /// outcome with [`TokenStore::merge`].
    pub async fn sync_many(
        &self,
        collections: &[Href],
        store: &TokenStore,
        cancel: &CancelSignal,
    ) -> BatchOutcome {
        let unique: BTreeSet<&Href> = collections.iter().collect();
        tracing::info!(count = unique.len(), "syncing collections");

        let results = stream::iter(unique)
            .map(|collection| async move {
                let result = self
                    .sync_collection(collection, store.get(collection), cancel)
                    .await;
                if let Err(err) = &result {
                    tracing::warn!(%collection, %err, "collection sync failed");
                }
                (collection.clone(), result)
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect::<BTreeMap<_, _>>()
            .await;

        BatchOutcome { results }
    }

    async fn full_sync(
        &self,
        collection: &Href,
        mode: SyncMode,
        cancel: &CancelSignal,
    ) -> Result<SyncResult, SyncError> {
        let snapshot = self
            .guard(collection, cancel, self.remote.list_all(collection))
            .await?
            .map_err(|source| SyncError::Remote {
                collection: collection.clone(),
                source,
            })?;

        // Keep the last listing of an href if the server repeats one
        let mut listed: BTreeMap<Href, RemoteItem> = BTreeMap::new();
        let mut order = Vec::with_capacity(snapshot.items.len());
        for item in snapshot.items {
            match listed.entry(item.href.clone()) {
                Entry::Vacant(e) => {
                    order.push(item.href.clone());
                    e.insert(item);
                }
                Entry::Occupied(mut e) => {
                    e.insert(item);
                }
            }
        }

        let mut items = BTreeMap::new();
        let mut changes = Vec::with_capacity(order.len());
        for href in order {
            if let Some(item) = listed.remove(&href) {
                items.insert(href, item.etag.clone());
                changes.push(ItemChange::new(ChangeKind::New, item));
            }
        }

        tracing::debug!(items = changes.len(), ?mode, "full sync finished");
        Ok(SyncResult {
            collection: collection.clone(),
            mode,
            changes,
            state: CollectionState {
                token: snapshot.token,
                items,
            },
        })
    }

    /// Runs a remote call under the caller's cancel signal and the configured
    /// time limit. The outer error is cancellation or timeout; the inner one
    /// is the remote's own.
    async fn guard<T, F>(
        &self,
        collection: &Href,
        cancel: &CancelSignal,
        call: F,
    ) -> Result<Result<T, CalDavError>, SyncError>
    where
        F: Future<Output = Result<T, CalDavError>>,
    {
        let mut cancel = cancel.clone();
        let limited = async {
            match self.config.timeout() {
                Some(limit) => tokio::time::timeout(limit, call)
                    .await
                    .map_err(|_| SyncError::TimedOut {
                        collection: collection.clone(),
                        limit,
                    }),
                None => Ok(call.await),
            }
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(SyncError::Cancelled(collection.clone())),
            result = limited => result,
        }
    }
}

/// Classifies a delta against the items seen with the prior token.
///
/// A deletion wins over any change reported for the same href; repeated
/// changes collapse into the last one. Changed items already known are
/// [`ChangeKind::Modified`], the others [`ChangeKind::New`].
fn classify_delta(collection: &Href, prior: &CollectionState, delta: RemoteDelta) -> SyncResult {
    let mut order: Vec<Href> = Vec::new();
    let mut latest: HashMap<Href, RemoteChange> = HashMap::new();
    for change in delta.changes {
        match latest.get_mut(change.href()) {
            None => {
                order.push(change.href().clone());
                latest.insert(change.href().clone(), change);
            }
            Some(RemoteChange::Deleted(_)) => {}
            Some(existing) => *existing = change,
        }
    }

    let mut items = prior.items.clone();
    let mut changes = Vec::with_capacity(order.len());
    for href in order {
        match latest.remove(&href) {
            Some(RemoteChange::Deleted(href)) => {
                items.remove(&href);
                changes.push(ItemChange::deleted(href));
            }
            Some(RemoteChange::Changed(item)) => {
                let kind = if prior.items.contains_key(&item.href) {
                    ChangeKind::Modified
                } else {
                    ChangeKind::New
                };
                items.insert(item.href.clone(), item.etag.clone());
                changes.push(ItemChange::new(kind, item));
            }
            None => {}
        }
    }

    SyncResult {
        collection: collection.clone(),
        mode: SyncMode::Incremental,
        changes,
        state: CollectionState {
            token: delta.token,
            items,
        },
    }
}
