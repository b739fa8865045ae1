// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Sync coordinator tests against an in-memory remote.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use davsync_caldav::{
    CalDavError, CancelSignal, ChangeKind, ETag, Href, RemoteChange, RemoteCollection,
    RemoteDelta, RemoteItem, RemoteSnapshot, SyncConfig, SyncCoordinator, SyncError, SyncMode,
    SyncResult, SyncToken, TokenStore, cancel_pair,
};

#[derive(Default)]
struct FakeCollection {
    version: u64,
    /// Tokens older than this version are rejected.
    oldest_valid: u64,
    items: BTreeMap<Href, ETag>,
    log: Vec<(u64, RemoteChange)>,
}

impl FakeCollection {
    fn token(&self) -> SyncToken {
        SyncToken::new(format!("T{}", self.version))
    }
}

/// Remote with versioned tokens `T1`, `T2`, ... per collection.
#[derive(Default)]
struct FakeRemote {
    collections: Mutex<HashMap<Href, FakeCollection>>,
    failing: Mutex<HashSet<Href>>,
    delay: Option<Duration>,
}

impl FakeRemote {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    fn seed(&self, collection: &str, count: usize) {
        let mut collections = self.collections.lock().unwrap();
        let entry = collections.entry(collection.into()).or_default();
        entry.version = 1;
        entry.oldest_valid = 1;
        for i in 0..count {
            entry
                .items
                .insert(format!("{collection}item{i}.ics").into(), "\"1\"".into());
        }
    }

    fn put(&self, collection: &str, href: &str, etag: &str) {
        let mut collections = self.collections.lock().unwrap();
        let entry = collections.entry(collection.into()).or_default();
        entry.version += 1;
        entry.items.insert(href.into(), etag.into());
        let change = RemoteChange::Changed(RemoteItem {
            href: href.into(),
            etag: Some(etag.into()),
            data: Some(format!("BEGIN:VCALENDAR\nX-ETAG:{etag}\nEND:VCALENDAR")),
        });
        entry.log.push((entry.version, change));
    }

    fn delete(&self, collection: &str, href: &str) {
        let mut collections = self.collections.lock().unwrap();
        let entry = collections.entry(collection.into()).or_default();
        entry.version += 1;
        entry.items.remove(&Href::from(href));
        entry
            .log
            .push((entry.version, RemoteChange::Deleted(href.into())));
    }

    /// Invalidates every token issued so far for `collection`.
    fn expire(&self, collection: &str) {
        let mut collections = self.collections.lock().unwrap();
        let entry = collections.entry(collection.into()).or_default();
        entry.version += 1;
        entry.oldest_valid = entry.version;
    }

    fn fail(&self, collection: &str) {
        self.failing.lock().unwrap().insert(collection.into());
    }

    async fn pause(&self, collection: &Href) -> Result<(), CalDavError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(collection) {
            return Err(CalDavError::Http("connection reset".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RemoteCollection for FakeRemote {
    async fn list_all(&self, collection: &Href) -> Result<RemoteSnapshot, CalDavError> {
        self.pause(collection).await?;

        let collections = self.collections.lock().unwrap();
        let entry = collections
            .get(collection)
            .ok_or_else(|| CalDavError::NotFound(collection.clone()))?;
        Ok(RemoteSnapshot {
            items: entry
                .items
                .iter()
                .map(|(href, etag)| RemoteItem {
                    href: href.clone(),
                    etag: Some(etag.clone()),
                    data: None,
                })
                .collect(),
            token: entry.token(),
        })
    }

    async fn delta(&self, collection: &Href, token: &SyncToken) -> Result<RemoteDelta, CalDavError> {
        self.pause(collection).await?;

        let collections = self.collections.lock().unwrap();
        let entry = collections
            .get(collection)
            .ok_or_else(|| CalDavError::NotFound(collection.clone()))?;
        let since = token
            .as_str()
            .strip_prefix('T')
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v >= entry.oldest_valid && *v <= entry.version)
            .ok_or_else(|| CalDavError::InvalidSyncToken(collection.clone()))?;

        Ok(RemoteDelta {
            changes: entry
                .log
                .iter()
                .filter(|(version, _)| *version > since)
                .map(|(_, change)| change.clone())
                .collect(),
            token: entry.token(),
        })
    }
}

fn assert_partitioned(result: &SyncResult) {
    let mut seen = HashSet::new();
    for change in &result.changes {
        assert!(seen.insert(change.href.clone()), "{} repeated", change.href);
    }
    let total = result.new_items().count()
        + result.modified_items().count()
        + result.deleted_items().count();
    assert_eq!(total, result.changes.len());
}

const WORK: &str = "/calendars/user/work/";

#[tokio::test]
async fn sync_without_prior_state_returns_everything_as_new() {
    let remote = FakeRemote::default();
    remote.seed(WORK, 12);
    let coordinator = SyncCoordinator::new(remote);

    let result = coordinator
        .sync_collection(&WORK.into(), None, &CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(result.mode, SyncMode::Full);
    assert_eq!(result.changes.len(), 12);
    assert!(result.changes.iter().all(|c| c.kind == ChangeKind::New));
    assert_eq!(result.new_token().as_str(), "T1");
    assert_eq!(result.state.items.len(), 12);
    assert_partitioned(&result);
}

#[tokio::test]
async fn sync_twice_without_remote_change_is_empty() {
    let remote = FakeRemote::default();
    remote.seed(WORK, 3);
    let coordinator = SyncCoordinator::new(remote);
    let collection = Href::from(WORK);
    let cancel = CancelSignal::never();

    let first = coordinator
        .sync_collection(&collection, None, &cancel)
        .await
        .unwrap();
    let second = coordinator
        .sync_collection(&collection, Some(&first.state), &cancel)
        .await
        .unwrap();

    assert_eq!(second.mode, SyncMode::Incremental);
    assert!(second.is_empty());
    assert_eq!(second.new_token(), first.new_token());
    assert_eq!(second.state, first.state);
}

#[tokio::test]
async fn sync_incremental_classifies_changes() {
    let remote = Arc::new(FakeRemote::default());
    remote.seed(WORK, 2);
    let coordinator = SyncCoordinator::new(Arc::clone(&remote));
    let collection = Href::from(WORK);
    let cancel = CancelSignal::never();

    let first = coordinator
        .sync_collection(&collection, None, &cancel)
        .await
        .unwrap();

    let known = format!("{WORK}item0.ics");
    let removed = format!("{WORK}item1.ics");
    let added = format!("{WORK}fresh.ics");
    remote.put(WORK, &known, "\"2\"");
    remote.put(WORK, &added, "\"1\"");
    remote.delete(WORK, &removed);

    let second = coordinator
        .sync_collection(&collection, Some(&first.state), &cancel)
        .await
        .unwrap();

    let kinds: Vec<(&str, ChangeKind)> = second
        .changes
        .iter()
        .map(|c| (c.href.as_str(), c.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (known.as_str(), ChangeKind::Modified),
            (added.as_str(), ChangeKind::New),
            (removed.as_str(), ChangeKind::Deleted),
        ]
    );
    assert_eq!(second.new_token().as_str(), "T4");
    assert!(second.modified_items().all(|c| c.data.is_some()));
    assert!(second.deleted_items().all(|c| c.etag.is_none() && c.data.is_none()));
    assert_eq!(
        second.state.items.keys().map(Href::as_str).collect::<Vec<_>>(),
        vec![added.as_str(), known.as_str()]
    );
    assert_partitioned(&second);
}

#[tokio::test]
async fn sync_item_created_then_deleted_is_reported_deleted() {
    let remote = Arc::new(FakeRemote::default());
    remote.seed(WORK, 1);
    let coordinator = SyncCoordinator::new(Arc::clone(&remote));
    let collection = Href::from(WORK);
    let cancel = CancelSignal::never();

    let first = coordinator
        .sync_collection(&collection, None, &cancel)
        .await
        .unwrap();

    let flash = format!("{WORK}flash.ics");
    remote.put(WORK, &flash, "\"1\"");
    remote.delete(WORK, &flash);

    let second = coordinator
        .sync_collection(&collection, Some(&first.state), &cancel)
        .await
        .unwrap();

    assert_eq!(second.changes.len(), 1);
    assert_eq!(second.changes[0].kind, ChangeKind::Deleted);
    assert_eq!(second.state.items.len(), 1);
    assert_partitioned(&second);
}

#[tokio::test]
async fn sync_rejected_token_falls_back_to_full_resync() {
    let remote = Arc::new(FakeRemote::default());
    remote.seed(WORK, 12);
    let coordinator = SyncCoordinator::new(Arc::clone(&remote));
    let collection = Href::from(WORK);
    let cancel = CancelSignal::never();
    let mut store = TokenStore::in_memory();

    let first = coordinator
        .sync_collection(&collection, store.get(&collection), &cancel)
        .await
        .unwrap();
    assert_eq!(first.changes.len(), 12);
    assert_eq!(first.new_token().as_str(), "T1");
    store.record(&first);

    let second = coordinator
        .sync_collection(&collection, store.get(&collection), &cancel)
        .await
        .unwrap();
    assert!(second.is_empty());
    assert_eq!(second.new_token().as_str(), "T1");
    store.record(&second);

    remote.expire(WORK);

    let third = coordinator
        .sync_collection(&collection, store.get(&collection), &cancel)
        .await
        .unwrap();
    assert_eq!(third.mode, SyncMode::Resync);
    assert!(third.is_resync());
    assert_eq!(third.changes.len(), 12);
    assert!(third.changes.iter().all(|c| c.kind == ChangeKind::New));
    assert_eq!(third.new_token().as_str(), "T2");
    assert_partitioned(&third);
}

#[tokio::test]
async fn sync_transport_failure_leaves_store_untouched() {
    let remote = Arc::new(FakeRemote::default());
    remote.seed(WORK, 2);
    let coordinator = SyncCoordinator::new(Arc::clone(&remote));
    let collection = Href::from(WORK);
    let cancel = CancelSignal::never();
    let mut store = TokenStore::in_memory();

    let first = coordinator
        .sync_collection(&collection, None, &cancel)
        .await
        .unwrap();
    store.record(&first);
    let before = store.get(&collection).cloned();

    remote.put(WORK, &format!("{WORK}item0.ics"), "\"2\"");
    remote.fail(WORK);

    let outcome = coordinator
        .sync_many(std::slice::from_ref(&collection), &store, &cancel)
        .await;
    let merged = store.merge(&outcome);

    assert_eq!(merged, 0);
    assert!(matches!(
        outcome.results[&collection],
        Err(SyncError::Remote { .. })
    ));
    assert_eq!(store.get(&collection).cloned(), before);
}

#[tokio::test]
async fn sync_many_isolates_failures() {
    let remote = Arc::new(FakeRemote::default());
    remote.seed("/cal/a/", 2);
    remote.seed("/cal/b/", 3);
    remote.seed("/cal/c/", 4);
    remote.fail("/cal/b/");
    let coordinator = SyncCoordinator::with_config(
        Arc::clone(&remote),
        SyncConfig {
            concurrency: 2,
            timeout_secs: None,
        },
    );
    let mut store = TokenStore::in_memory();

    let collections: Vec<Href> = vec!["/cal/a/".into(), "/cal/b/".into(), "/cal/c/".into()];
    let outcome = coordinator
        .sync_many(&collections, &store, &CancelSignal::never())
        .await;

    assert_eq!(outcome.results.len(), 3);
    assert!(!outcome.is_success());
    assert_eq!(outcome.successes().count(), 2);

    let failures: Vec<&Href> = outcome.failures().map(|(href, _)| href).collect();
    assert_eq!(failures, vec![&Href::from("/cal/b/")]);

    let partial = outcome.partial_failure().unwrap();
    assert_eq!(partial.total, 3);
    assert_eq!(partial.to_string(), "1 of 3 collections failed to sync");

    assert_eq!(store.merge(&outcome), 2);
    assert_eq!(store.token(&"/cal/a/".into()).map(SyncToken::as_str), Some("T1"));
    assert_eq!(store.token(&"/cal/c/".into()).map(SyncToken::as_str), Some("T1"));
    assert!(store.get(&"/cal/b/".into()).is_none());
}

#[tokio::test]
async fn sync_many_runs_each_collection_once() {
    let remote = FakeRemote::default();
    remote.seed("/cal/a/", 1);
    let coordinator = SyncCoordinator::new(remote);

    let collections: Vec<Href> = vec!["/cal/a/".into(), "/cal/a/".into()];
    let outcome = coordinator
        .sync_many(&collections, &TokenStore::in_memory(), &CancelSignal::never())
        .await;

    assert_eq!(outcome.results.len(), 1);
    assert!(outcome.is_success());
    assert!(outcome.partial_failure().is_none());
}

#[tokio::test]
async fn sync_empty_collection_is_rejected() {
    let coordinator = SyncCoordinator::new(FakeRemote::default());

    let err = coordinator
        .sync_collection(&"".into(), None, &CancelSignal::never())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::EmptyCollection));
    assert!(err.collection().is_none());
}

#[tokio::test]
async fn sync_unknown_collection_is_remote_error() {
    let coordinator = SyncCoordinator::new(FakeRemote::default());

    let err = coordinator
        .sync_collection(&"/cal/missing/".into(), None, &CancelSignal::never())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SyncError::Remote {
            source: CalDavError::NotFound(_),
            ..
        }
    ));
    assert_eq!(err.collection().map(Href::as_str), Some("/cal/missing/"));
}

#[tokio::test]
async fn sync_already_cancelled_does_not_complete() {
    let remote = FakeRemote::default();
    remote.seed(WORK, 1);
    let coordinator = SyncCoordinator::new(remote);
    let (handle, signal) = cancel_pair();
    handle.cancel();
    assert!(signal.is_cancelled());

    let err = coordinator
        .sync_collection(&WORK.into(), None, &signal)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Cancelled(href) if href.as_str() == WORK));
}

#[tokio::test(start_paused = true)]
async fn sync_cancelled_while_in_flight() {
    let remote = FakeRemote::with_delay(Duration::from_secs(30));
    remote.seed("/cal/a/", 1);
    remote.seed("/cal/b/", 1);
    let coordinator = SyncCoordinator::new(remote);
    let (handle, signal) = cancel_pair();
    let store = TokenStore::in_memory();
    let collections: Vec<Href> = vec!["/cal/a/".into(), "/cal/b/".into()];

    let canceller = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.cancel();
    };
    let ((), outcome) = tokio::join!(
        canceller,
        coordinator.sync_many(&collections, &store, &signal)
    );

    assert_eq!(outcome.results.len(), 2);
    assert!(
        outcome
            .results
            .values()
            .all(|r| matches!(r, Err(SyncError::Cancelled(_))))
    );
}

#[tokio::test(start_paused = true)]
async fn sync_times_out_slow_remote() {
    let remote = FakeRemote::with_delay(Duration::from_secs(60));
    remote.seed(WORK, 1);
    let coordinator = SyncCoordinator::with_config(
        remote,
        SyncConfig {
            concurrency: 1,
            timeout_secs: Some(5),
        },
    );

    let err = coordinator
        .sync_collection(&WORK.into(), None, &CancelSignal::never())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SyncError::TimedOut { limit, .. } if limit == Duration::from_secs(5)
    ));
}

#[tokio::test(start_paused = true)]
async fn sync_within_time_limit_succeeds() {
    let remote = FakeRemote::with_delay(Duration::from_secs(1));
    remote.seed(WORK, 2);
    let coordinator = SyncCoordinator::with_config(
        remote,
        SyncConfig {
            concurrency: 1,
            timeout_secs: Some(5),
        },
    );

    let result = coordinator
        .sync_collection(&WORK.into(), None, &CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(result.changes.len(), 2);
}
