// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Incremental synchronization of `CalDAV` collections (RFC 4791, RFC 6578).
//!
//! A [`SyncCoordinator`] syncs collections through any [`RemoteCollection`];
//! [`CalDavClient`] is the `sync-collection` REPORT implementation of it. The
//! caller owns a [`TokenStore`], feeds its states to the coordinator and
//! merges the successful results back before persisting it.

#![warn(
    trivial_casts,
    trivial_numeric_casts,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    clippy::dbg_macro,
    clippy::indexing_slicing,
    clippy::pedantic
)]
// Allow certain clippy lints that are too restrictive for this crate
#![allow(
    clippy::option_option,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::match_bool
)]

mod cancel;
mod client;
mod config;
mod error;
mod http;
mod remote;
mod request;
mod response;
mod store;
mod sync;
mod types;
mod xml;

pub use crate::cancel::{CancelHandle, CancelSignal, cancel_pair};
pub use crate::client::CalDavClient;
pub use crate::config::{AuthMethod, CalDavConfig, SyncConfig};
pub use crate::error::{CalDavError, PartialBatchFailure, StoreError, SyncError};
pub use crate::remote::{RemoteChange, RemoteCollection, RemoteDelta, RemoteItem, RemoteSnapshot};
pub use crate::request::{Prop, PropFindRequest, SyncCollectionRequest};
pub use crate::response::{MultiStatusResponse, ResponseItem, SyncPage, has_precondition};
pub use crate::store::TokenStore;
pub use crate::sync::{
    BatchOutcome, ChangeKind, CollectionState, ItemChange, SyncCoordinator, SyncMode, SyncResult,
};
pub use crate::types::{CalendarCollection, ETag, Href, SyncToken};
