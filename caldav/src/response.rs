// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Response parsers for WebDAV/CalDAV operations.

use std::collections::HashSet;

use quick_xml::NsReader;
use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};

use crate::error::CalDavError;
use crate::remote::{RemoteChange, RemoteItem};
use crate::types::{CalendarCollection, ETag, Href, SyncToken};
use crate::xml::{ns, read_text};

/// `WebDAV` multistatus response.
#[derive(Debug, Clone, Default)]
pub struct MultiStatusResponse {
    /// The response items.
    pub responses: Vec<ResponseItem>,
    /// Top-level sync token, present in sync-collection REPORT answers.
    pub sync_token: Option<SyncToken>,
}

/// Individual response in multistatus.
#[derive(Debug, Clone)]
pub struct ResponseItem {
    /// The resources this response is about. Status-only responses may name
    /// several; propstat responses name exactly one.
    pub hrefs: Vec<Href>,
    /// Property groups with their status.
    pub prop_stats: Vec<PropStat>,
    /// Response-level status, used for removed members and truncation.
    pub status: Option<String>,
}

/// Property stat with status and value.
#[derive(Debug, Clone)]
pub struct PropStat {
    /// The properties of this group.
    pub props: Properties,
    /// The status line, e.g. `HTTP/1.1 200 OK`.
    pub status: String,
}

impl ResponseItem {
    /// The first href, the resource of a propstat response.
    #[must_use]
    pub fn href(&self) -> Option<&Href> {
        self.hrefs.first()
    }
}

impl PropStat {
    fn is_ok(&self) -> bool {
        status_code(&self.status) == Some(200)
    }
}

/// WebDAV/CalDAV properties.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    /// `DAV:displayname`.
    pub display_name: Option<String>,
    /// `DAV:getetag`.
    pub get_etag: Option<ETag>,
    /// `CS:getctag`.
    pub get_ctag: Option<ETag>,
    /// `DAV:sync-token` as a property of a collection.
    pub sync_token: Option<SyncToken>,
    /// `C:calendar-data`.
    pub calendar_data: Option<String>,
    /// `C:supported-calendar-component-set`.
    pub supported_calendar_components: Option<Vec<String>>,
    /// `C:calendar-description`.
    pub calendar_description: Option<String>,
    /// Whether the resource type contains `C:calendar`.
    pub is_calendar: bool,
    /// Whether a resource type was reported at all.
    pub is_collection: bool,
}

/// One page of a sync-collection REPORT answer.
#[derive(Debug, Clone)]
pub struct SyncPage {
    /// Token describing the state after this page.
    pub token: SyncToken,
    /// Changed and removed members, in server order.
    pub changes: Vec<RemoteChange>,
    /// The server cut the answer short (507 on the collection itself).
    pub truncated: bool,
}

/// Extracts the numeric code from a status line such as `HTTP/1.1 404 Not Found`.
fn status_code(status: &str) -> Option<u16> {
    status.split_whitespace().nth(1)?.parse().ok()
}

impl SyncPage {
    /// Appends the follow-up page of a truncated answer.
    ///
    /// Entries of `next` replace earlier entries for the same href, so an item
    /// removed on one page and recreated on a later one ends up changed. The
    /// token and truncation flag are taken from `next`.
    pub fn append(&mut self, next: Self) {
        let replaced: HashSet<Href> = next.changes.iter().map(|c| c.href().clone()).collect();
        self.changes.retain(|c| !replaced.contains(c.href()));
        self.changes.extend(next.changes);
        self.token = next.token;
        self.truncated = next.truncated;
    }
}

impl MultiStatusResponse {
    /// Parses multistatus response from XML.
    ///
    /// # Errors
    ///
    /// Returns an error if XML parsing fails.
    pub fn from_xml(xml: &str) -> Result<Self, CalDavError> {
        let mut reader = quick_xml::Reader::from_str(xml);
        reader.config_mut().trim_text(true);
        reader.config_mut().check_end_names = true;

        let mut result = Self::default();
        let mut current_response: Option<ResponseItem> = None;
        let mut current_props = Properties::default();
        let mut in_prop = false;
        let mut in_propstat = false;

        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::End(ref e) if e.name().local_name().into_inner() == b"multistatus" => break,
                Event::Eof => break,

                Event::Start(ref e) => match e.name().local_name().into_inner() {
                    b"response" => {
                        current_response = Some(ResponseItem {
                            hrefs: Vec::new(),
                            prop_stats: Vec::new(),
                            status: None,
                        });
                    }
                    b"href" if current_response.is_some() && !in_propstat => {
                        let href = read_text(&mut reader)?;
                        if let Some(resp) = current_response.as_mut() {
                            resp.hrefs.push(Href::new(href));
                        }
                    }
                    b"propstat" if current_response.is_some() => {
                        in_propstat = true;
                        current_props = Properties::default();
                    }
                    b"prop" => in_prop = true,

                    b"displayname" if in_prop => {
                        current_props.display_name = Some(read_text(&mut reader)?);
                    }
                    b"resourcetype" if in_prop => {
                        current_props.is_collection = true;
                        Self::read_resource_type(&mut reader, &mut current_props)?;
                    }
                    b"getetag" if in_prop => {
                        current_props.get_etag = Some(ETag::new(read_text(&mut reader)?));
                    }
                    b"getctag" if in_prop => {
                        current_props.get_ctag = Some(ETag::new(read_text(&mut reader)?));
                    }
                    b"sync-token" if in_prop => {
                        current_props.sync_token = Some(SyncToken::new(read_text(&mut reader)?));
                    }
                    b"sync-token" if current_response.is_none() => {
                        result.sync_token = Some(SyncToken::new(read_text(&mut reader)?));
                    }
                    b"calendar-data" if in_prop => {
                        current_props.calendar_data = Some(read_text(&mut reader)?);
                    }
                    b"supported-calendar-component-set" if in_prop => {
                        let components = Self::read_components(&mut reader)?;
                        current_props.supported_calendar_components = Some(components);
                    }
                    b"calendar-description" if in_prop => {
                        current_props.calendar_description = Some(read_text(&mut reader)?);
                    }
                    b"status" if in_propstat => {
                        let status = read_text(&mut reader)?;
                        if let Some(resp) = current_response.as_mut() {
                            resp.prop_stats.push(PropStat {
                                props: std::mem::take(&mut current_props),
                                status,
                            });
                        }
                    }
                    b"status" if current_response.is_some() => {
                        let status = read_text(&mut reader)?;
                        if let Some(resp) = current_response.as_mut() {
                            resp.status = Some(status);
                        }
                    }
                    _ => {}
                },
                Event::End(ref e) => match e.name().local_name().into_inner() {
                    b"response" => {
                        if let Some(resp) = current_response.take() {
                            result.responses.push(resp);
                        }
                    }
                    b"propstat" => in_propstat = false,
                    b"prop" => in_prop = false,
                    _ => {}
                },
                _ => {}
            }
            buf.clear();
        }

        Ok(result)
    }

    fn read_resource_type(
        reader: &mut quick_xml::Reader<&[u8]>,
        props: &mut Properties,
    ) -> Result<(), CalDavError> {
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::End(ref e) if e.name().local_name().into_inner() == b"resourcetype" => {
                    return Ok(());
                }
                Event::Start(ref e) | Event::Empty(ref e) => {
                    if e.name().local_name().into_inner() == b"calendar" {
                        props.is_calendar = true;
                    }
                }
                Event::Eof => return Err(CalDavError::Xml("Unexpected EOF".to_string())),
                _ => {}
            }
            buf.clear();
        }
    }

    fn read_components(reader: &mut quick_xml::Reader<&[u8]>) -> Result<Vec<String>, CalDavError> {
        let mut components = Vec::new();
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::End(ref e)
                    if e.name().local_name().into_inner() == b"supported-calendar-component-set" =>
                {
                    return Ok(components);
                }
                Event::Start(ref e) | Event::Empty(ref e)
                    if e.name().local_name().into_inner() == b"comp" =>
                {
                    if let Ok(Some(name_attr)) = e.try_get_attribute("name") {
                        let name = std::str::from_utf8(&name_attr.value)
                            .map_err(|e| CalDavError::Xml(format!("UTF-8 error: {e}")))?;
                        components.push(name.to_string());
                    }
                }
                Event::Eof => return Err(CalDavError::Xml("Unexpected EOF".to_string())),
                _ => {}
            }
            buf.clear();
        }
    }

    /// Converts multistatus response to calendar collections.
    #[must_use]
    pub fn into_collections(self) -> Vec<CalendarCollection> {
        let mut collections = Vec::new();

        for response in self.responses {
            let Some(href) = response.href() else {
                continue;
            };
            for prop_stat in response.prop_stats.iter().filter(|p| p.is_ok()) {
                let props = &prop_stat.props;
                if !(props.is_calendar && props.is_collection) {
                    continue;
                }

                let mut collection = CalendarCollection::new(href.clone());
                collection.display_name.clone_from(&props.display_name);
                collection.description.clone_from(&props.calendar_description);
                collection.supported_components = props
                    .supported_calendar_components
                    .clone()
                    .unwrap_or_default();
                collection.ctag.clone_from(&props.get_ctag);
                collection.sync_token.clone_from(&props.sync_token);
                collections.push(collection);
            }
        }

        collections
    }

    /// Interprets a sync-collection REPORT answer for `collection`.
    ///
    /// Members with a `200` propstat are changes. Every href of a response
    /// with a `404` status is a removal. A `507` response naming the
    /// collection itself marks the page as truncated.
    ///
    /// # Errors
    ///
    /// Returns an error if the answer carries no sync token.
    pub fn into_sync_page(self, collection: &Href) -> Result<SyncPage, CalDavError> {
        let token = self.sync_token.ok_or_else(|| {
            CalDavError::InvalidResponse(format!("sync-collection answer for {collection} has no sync-token"))
        })?;

        let mut changes = Vec::new();
        let mut truncated = false;

        for response in self.responses {
            let code = response.status.as_deref().and_then(status_code);
            let (own, members): (Vec<Href>, Vec<Href>) = response
                .hrefs
                .into_iter()
                .partition(|href| href.same_resource(collection));

            if !own.is_empty() && code == Some(507) {
                truncated = true;
            }

            if code == Some(404) {
                changes.extend(members.into_iter().map(RemoteChange::Deleted));
                continue;
            }

            let Some(href) = members.into_iter().next() else {
                continue;
            };
            match response.prop_stats.into_iter().find(PropStat::is_ok) {
                Some(prop_stat) => changes.push(RemoteChange::Changed(RemoteItem {
                    href,
                    etag: prop_stat.props.get_etag,
                    data: prop_stat.props.calendar_data,
                })),
                None => {
                    tracing::debug!(%href, "skipping sync member without a 200 propstat");
                }
            }
        }

        Ok(SyncPage {
            token,
            changes,
            truncated,
        })
    }
}

/// Whether `xml` is a `DAV:error` body carrying the `DAV:` precondition
/// element `name`, such as `valid-sync-token`.
///
/// Every child of the error element is inspected; servers put their own
/// elements (SabreDAV's `s:exception` and `s:message`) next to the
/// precondition. Bodies that are not XML, or not a `DAV:error`, yield `false`.
#[must_use]
pub fn has_precondition(xml: &str, name: &str) -> bool {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut depth = 0usize;
    loop {
        let Ok((resolved, event)) = reader.read_resolved_event() else {
            return false;
        };
        let in_dav = matches!(resolved, ResolveResult::Bound(Namespace(uri)) if uri == ns::DAV.as_bytes());

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let local = e.local_name();
                match depth {
                    0 if !(in_dav && local.into_inner() == b"error") => return false,
                    1 if in_dav && local.into_inner() == name.as_bytes() => return true,
                    _ => {}
                }
                if matches!(event, Event::Start(_)) {
                    depth += 1;
                }
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return false;
                }
            }
            Event::Eof => return false,
            _ => {}
        }
    }
}
