// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! `CalDAV` client for collection listing and synchronization.

use std::sync::Arc;

use crate::config::CalDavConfig;
use crate::error::CalDavError;
use crate::http::HttpClient;
use crate::request::{Prop, PropFindRequest, SyncCollectionRequest};
use crate::response::{MultiStatusResponse, SyncPage};
use crate::types::{CalendarCollection, Href, SyncToken};

/// `CalDAV` client for accessing calendar collections on `CalDAV` servers.
///
/// # Example
///
/// ```ignore
/// use davsync_caldav::{AuthMethod, CalDavClient, CalDavConfig, Href};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = CalDavConfig {
///     base_url: "https://caldav.example.com".to_string(),
///     calendar_home: "/dav/calendars/user/".to_string(),
///     auth: AuthMethod::Basic {
///         username: "user".to_string(),
///         password: "pass".to_string(),
///     },
///     ..Default::default()
/// };
///
/// let client = CalDavClient::new(config)?;
/// let calendars = client.list_calendars().await?;
/// let page = client.sync_collection(&calendars[0].href, None).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CalDavClient {
    http: Arc<HttpClient>,
    config: CalDavConfig,
}

impl CalDavClient {
    /// Creates a new `CalDAV` client.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client initialization fails.
    pub fn new(config: CalDavConfig) -> Result<Self, CalDavError> {
        if config.base_url.is_empty() {
            return Err(CalDavError::Config("base_url must not be empty".to_string()));
        }

        let http = HttpClient::new(config.clone())?;
        Ok(Self {
            http: Arc::new(http),
            config,
        })
    }

    /// Returns the configuration this client was built with.
    #[must_use]
    pub const fn config(&self) -> &CalDavConfig {
        &self.config
    }

    /// Gets list of calendar collections under the calendar home.
    ///
    /// # Errors
    ///
    /// Returns an error if PROPFIND fails.
    pub async fn list_calendars(&self) -> Result<Vec<CalendarCollection>, CalDavError> {
        let home = Href::from(self.config.calendar_home.as_str());
        let url = self.full_url(&home);

        let mut propfind = PropFindRequest::new();
        propfind
            .add_property(Prop::DisplayName)
            .add_property(Prop::ResourceType)
            .add_property(Prop::CalendarDescription)
            .add_property(Prop::SupportedCalendarComponents)
            .add_property(Prop::GetCTag)
            .add_property(Prop::SyncToken);

        let xml_body = propfind.build()?;
        let resp = self
            .http
            .execute(
                self.http
                    .build_dav_request("PROPFIND", &url)?
                    .header("Depth", "1")
                    .body(xml_body),
                &home,
            )
            .await?;

        let xml = resp.text().await?;
        let multistatus = MultiStatusResponse::from_xml(&xml)?;
        Ok(multistatus.into_collections())
    }

    /// Runs a `sync-collection` REPORT against `collection`.
    ///
    /// Without a token every member is returned. Truncated answers are
    /// followed with the token of the previous page until the server reports
    /// a complete result; the returned page merges all of them, later pages
    /// taking precedence over earlier ones.
    ///
    /// # Errors
    ///
    /// Returns [`CalDavError::InvalidSyncToken`] if the server rejects
    /// `token`, or another error if the request fails.
    #[tracing::instrument(skip(self, token), fields(incremental = token.is_some()))]
    pub async fn sync_collection(
        &self,
        collection: &Href,
        token: Option<&SyncToken>,
    ) -> Result<SyncPage, CalDavError> {
        let mut page = self.sync_page(collection, token.cloned()).await?;
        let mut pages = 1;

        while page.truncated {
            if pages >= self.config.max_sync_pages {
                return Err(CalDavError::InvalidResponse(format!(
                    "sync-collection for {collection} still truncated after {pages} pages"
                )));
            }

            tracing::debug!(pages, changes = page.changes.len(), "following truncated sync page");
            let next = self.sync_page(collection, Some(page.token.clone())).await?;
            page.append(next);
            pages += 1;
        }

        tracing::debug!(pages, changes = page.changes.len(), "sync-collection finished");
        Ok(page)
    }

    async fn sync_page(
        &self,
        collection: &Href,
        token: Option<SyncToken>,
    ) -> Result<SyncPage, CalDavError> {
        let url = self.full_url(collection);

        let mut request = SyncCollectionRequest::new(token);
        if let Some(nresults) = self.config.sync_page_size {
            request = request.limit(nresults);
        }

        let xml_body = request.build()?;
        let resp = self
            .http
            .execute(
                self.http
                    .build_dav_request("REPORT", &url)?
                    .header("Depth", "0")
                    .body(xml_body),
                collection,
            )
            .await?;

        let xml = resp.text().await?;
        MultiStatusResponse::from_xml(&xml)?.into_sync_page(collection)
    }

    /// Builds full URL from href.
    fn full_url(&self, href: &Href) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), href)
    }
}
