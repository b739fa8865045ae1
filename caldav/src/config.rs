// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// `CalDAV` authentication method.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(tag = "type")]
pub enum AuthMethod {
    /// No authentication.
    #[serde(rename = "none")]
    #[default]
    None,
    /// Basic authentication (username/password).
    #[serde(rename = "basic")]
    Basic {
        /// Username for authentication.
        username: String,
        /// Password for authentication.
        password: String,
    },
    /// Bearer token authentication (OAuth).
    #[serde(rename = "bearer")]
    Bearer {
        /// Bearer token.
        token: String,
    },
}

/// `CalDAV` server configuration.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CalDavConfig {
    /// Base URL of the `CalDAV` server.
    pub base_url: String,
    /// Calendar home path (e.g., /dav/calendars/user/).
    pub calendar_home: String,
    /// Authentication method.
    #[serde(default)]
    pub auth: AuthMethod,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// User agent string.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Number of results to ask for per sync-collection page (`DAV:limit`).
    ///
    /// `None` lets the server decide.
    #[serde(default)]
    pub sync_page_size: Option<u32>,
    /// How many truncated sync-collection pages are followed before giving up.
    #[serde(default = "default_max_sync_pages")]
    pub max_sync_pages: usize,
}

const fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("davsync-caldav/", env!("CARGO_PKG_VERSION")).to_string()
}

const fn default_max_sync_pages() -> usize {
    16
}

impl Default for CalDavConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            calendar_home: String::new(),
            auth: AuthMethod::default(),
            timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
            sync_page_size: None,
            max_sync_pages: default_max_sync_pages(),
        }
    }
}

/// Sync coordinator configuration.
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct SyncConfig {
    /// Maximum number of collections synced at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Limit for a single remote call, in seconds. `None` disables the limit.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

const fn default_concurrency() -> usize {
    4
}

impl SyncConfig {
    /// Per-request time limit, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        match self.timeout_secs {
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_secs: None,
        }
    }
}
