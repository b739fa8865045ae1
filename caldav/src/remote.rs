// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! The remote side of collection synchronization.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::client::CalDavClient;
use crate::error::CalDavError;
use crate::response::SyncPage;
use crate::types::{ETag, Href, SyncToken};

/// A member of a remote collection as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteItem {
    /// The href of the item.
    pub href: Href,
    /// The entity tag, when the server reported one.
    pub etag: Option<ETag>,
    /// Raw calendar data, when the server included it.
    pub data: Option<String>,
}

/// A change reported by an incremental sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteChange {
    /// The item was created or updated.
    Changed(RemoteItem),
    /// The item was removed from the collection.
    Deleted(Href),
}

impl RemoteChange {
    /// The href this change is about.
    #[must_use]
    pub const fn href(&self) -> &Href {
        match self {
            Self::Changed(item) => &item.href,
            Self::Deleted(href) => href,
        }
    }
}

/// Every current member of a collection together with the matching token.
#[derive(Debug, Clone)]
pub struct RemoteSnapshot {
    /// Current members.
    pub items: Vec<RemoteItem>,
    /// Token for the state the listing reflects.
    pub token: SyncToken,
}

/// Changes since a token together with the token after them.
#[derive(Debug, Clone)]
pub struct RemoteDelta {
    /// Changes in server order.
    pub changes: Vec<RemoteChange>,
    /// Token for the state after the changes.
    pub token: SyncToken,
}

/// A remote collection-sync capability.
///
/// Implementations report token expiry as [`CalDavError::InvalidSyncToken`];
/// every other error is treated as a transport failure.
#[async_trait]
pub trait RemoteCollection: Send + Sync {
    /// Lists every current member of `collection`.
    async fn list_all(&self, collection: &Href) -> Result<RemoteSnapshot, CalDavError>;

    /// Lists the changes to `collection` since `token`.
    async fn delta(&self, collection: &Href, token: &SyncToken) -> Result<RemoteDelta, CalDavError>;
}

#[async_trait]
impl RemoteCollection for CalDavClient {
    async fn list_all(&self, collection: &Href) -> Result<RemoteSnapshot, CalDavError> {
        let page = self.sync_collection(collection, None).await?;
        Ok(snapshot_from_listing(page))
    }

    async fn delta(&self, collection: &Href, token: &SyncToken) -> Result<RemoteDelta, CalDavError> {
        let page = self.sync_collection(collection, Some(token)).await?;
        Ok(RemoteDelta {
            changes: page.changes,
            token: page.token,
        })
    }
}

#[async_trait]
impl<R: RemoteCollection + ?Sized> RemoteCollection for std::sync::Arc<R> {
    async fn list_all(&self, collection: &Href) -> Result<RemoteSnapshot, CalDavError> {
        (**self).list_all(collection).await
    }

    async fn delta(&self, collection: &Href, token: &SyncToken) -> Result<RemoteDelta, CalDavError> {
        (**self).delta(collection, token).await
    }
}

/// Folds a possibly multi-page initial listing into the current members.
///
/// Follow-up pages of a truncated listing are deltas against the previous
/// page, so a removal drops an item listed earlier and a later change
/// replaces it.
fn snapshot_from_listing(page: SyncPage) -> RemoteSnapshot {
    let mut order = Vec::with_capacity(page.changes.len());
    let mut listed: HashMap<Href, RemoteItem> = HashMap::with_capacity(page.changes.len());
    for change in page.changes {
        match change {
            RemoteChange::Changed(item) => {
                if !listed.contains_key(&item.href) {
                    order.push(item.href.clone());
                }
                listed.insert(item.href.clone(), item);
            }
            RemoteChange::Deleted(href) => {
                if listed.remove(&href).is_none() {
                    tracing::debug!(%href, "ignoring removal of an item not listed");
                }
            }
        }
    }

    RemoteSnapshot {
        items: order
            .into_iter()
            .filter_map(|href| listed.remove(&href))
            .collect(),
        token: page.token,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changed(href: &str, etag: &str) -> RemoteChange {
        RemoteChange::Changed(RemoteItem {
            href: href.into(),
            etag: Some(etag.into()),
            data: None,
        })
    }

    fn hrefs(snapshot: &RemoteSnapshot) -> Vec<&str> {
        snapshot.items.iter().map(|i| i.href.as_str()).collect()
    }

    #[test]
    fn listing_drops_items_removed_later() {
        let page = SyncPage {
            token: "tok-2".into(),
            changes: vec![
                changed("/cal/a.ics", "\"1\""),
                changed("/cal/b.ics", "\"1\""),
                RemoteChange::Deleted("/cal/a.ics".into()),
            ],
            truncated: false,
        };

        let snapshot = snapshot_from_listing(page);

        assert_eq!(hrefs(&snapshot), vec!["/cal/b.ics"]);
        assert_eq!(snapshot.token.as_str(), "tok-2");
    }

    #[test]
    fn listing_keeps_last_version_and_recreated_items() {
        let page = SyncPage {
            token: "tok-3".into(),
            changes: vec![
                changed("/cal/a.ics", "\"1\""),
                RemoteChange::Deleted("/cal/a.ics".into()),
                changed("/cal/b.ics", "\"1\""),
                changed("/cal/a.ics", "\"2\""),
                changed("/cal/b.ics", "\"2\""),
                RemoteChange::Deleted("/cal/unknown.ics".into()),
            ],
            truncated: false,
        };

        let snapshot = snapshot_from_listing(page);

        assert_eq!(hrefs(&snapshot), vec!["/cal/a.ics", "/cal/b.ics"]);
        assert!(
            snapshot
                .items
                .iter()
                .all(|i| i.etag == Some(ETag::from("\"2\"")))
        );
    }
}
