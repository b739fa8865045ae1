// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

/// Resource href (path) of a collection or an item on a `CalDAV` server.
///
/// Used as the identifier of a collection (`/calendars/user/work/`) as well as
/// of the items inside it (`/calendars/user/work/event1.ics`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Href(String);

impl Href {
    /// Creates a new `Href` from a string.
    #[must_use]
    pub const fn new(href: String) -> Self {
        Self(href)
    }

    /// Returns the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compares two hrefs ignoring a trailing slash.
    ///
    /// Servers are inconsistent about echoing the collection href with or
    /// without the trailing slash.
    #[must_use]
    pub fn same_resource(&self, other: &Self) -> bool {
        self.0.trim_end_matches('/') == other.0.trim_end_matches('/')
    }
}

impl Deref for Href {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for Href {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Href {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Href {
    fn from(href: String) -> Self {
        Self(href)
    }
}

impl From<&str> for Href {
    fn from(href: &str) -> Self {
        Self(href.to_string())
    }
}

/// Entity tag of a single calendar object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ETag(String);

impl ETag {
    /// Creates a new `ETag` from a string.
    #[must_use]
    pub const fn new(etag: String) -> Self {
        Self(etag)
    }

    /// Returns the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ETag {
    fn from(etag: &str) -> Self {
        Self(etag.to_string())
    }
}

/// Opaque, server-issued cursor for a collection (RFC 6578).
///
/// A token names a point-in-time state of a collection; asking the server for
/// the changes since a token yields everything that happened after that point.
/// The value is never interpreted on the client side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncToken(String);

impl SyncToken {
    /// Creates a new `SyncToken` from a string.
    #[must_use]
    pub const fn new(token: String) -> Self {
        Self(token)
    }

    /// Returns the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SyncToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for SyncToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

/// Calendar collection metadata.
#[derive(Debug, Clone)]
pub struct CalendarCollection {
    /// The href of the calendar collection.
    pub href: Href,
    /// The display name of the calendar.
    pub display_name: Option<String>,
    /// The description of the calendar.
    pub description: Option<String>,
    /// Supported component types (VEVENT, VTODO, etc.).
    pub supported_components: Vec<String>,
    /// The collection tag (`CTag`) for change detection.
    pub ctag: Option<ETag>,
    /// The current sync token of the collection, if the server exposes one.
    pub sync_token: Option<SyncToken>,
}

impl CalendarCollection {
    /// Creates a new `CalendarCollection`.
    #[must_use]
    pub fn new(href: Href) -> Self {
        Self {
            href,
            display_name: None,
            description: None,
            supported_components: Vec::new(),
            ctag: None,
            sync_token: None,
        }
    }

    /// Whether the server advertises `DAV:sync-collection` for this calendar.
    #[must_use]
    pub const fn supports_sync(&self) -> bool {
        self.sync_token.is_some()
    }
}
