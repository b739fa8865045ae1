// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Request builders for `CalDAV` operations.

use std::io::Cursor;

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::error::CalDavError;
use crate::types::SyncToken;
use crate::xml::ns;

type XmlWriter = Writer<Cursor<Vec<u8>>>;

/// Properties to request in PROPFIND or REPORT bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prop {
    /// Display name.
    DisplayName,
    /// Resource type.
    ResourceType,
    /// `ETag`.
    GetETag,
    /// Collection tag (calendarserver extension).
    GetCTag,
    /// Current sync token of a collection (RFC 6578).
    SyncToken,
    /// Calendar data.
    CalendarData,
    /// Supported calendar components.
    SupportedCalendarComponents,
    /// Calendar description.
    CalendarDescription,
}

impl Prop {
    const fn name(self) -> &'static str {
        match self {
            Self::DisplayName => "displayname",
            Self::ResourceType => "resourcetype",
            Self::GetETag => "getetag",
            Self::GetCTag => "getctag",
            Self::SyncToken => "sync-token",
            Self::CalendarData => "calendar-data",
            Self::SupportedCalendarComponents => "supported-calendar-component-set",
            Self::CalendarDescription => "calendar-description",
        }
    }

    const fn prefix(self) -> &'static str {
        match self {
            Self::DisplayName | Self::ResourceType | Self::GetETag | Self::SyncToken => "D",
            Self::GetCTag => "CS",
            Self::CalendarData
            | Self::SupportedCalendarComponents
            | Self::CalendarDescription => "C",
        }
    }
}

/// Writes `<D:prop>` with one empty element per property.
fn write_props(writer: &mut XmlWriter, props: &[Prop]) -> Result<(), CalDavError> {
    writer.write_event(Event::Start(BytesStart::new("D:prop")))?;
    for prop in props {
        let tag = format!("{}:{}", prop.prefix(), prop.name());
        writer.write_event(Event::Start(BytesStart::new(tag.as_str())))?;
        writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
    }
    writer.write_event(Event::End(BytesEnd::new("D:prop")))?;
    Ok(())
}

/// Declares the namespaces the given properties need on a root element.
fn push_namespaces(root: &mut BytesStart<'_>, props: &[Prop]) {
    root.push_attribute(("xmlns:D", ns::DAV));
    if props.iter().any(|p| p.prefix() == "C") {
        root.push_attribute(("xmlns:C", ns::CALDAV));
    }
    if props.iter().any(|p| p.prefix() == "CS") {
        root.push_attribute(("xmlns:CS", ns::CALSERVER));
    }
}

fn finish(writer: XmlWriter) -> Result<String, CalDavError> {
    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| CalDavError::Xml(format!("UTF-8 error: {e}")))
}

/// PROPFIND request builder.
#[derive(Debug, Default)]
pub struct PropFindRequest {
    props: Vec<Prop>,
}

impl PropFindRequest {
    /// Creates a new PROPFIND request.
    #[must_use]
    pub fn new() -> Self {
        Self { props: Vec::new() }
    }

    /// Adds a property to the request.
    pub fn add_property(&mut self, prop: Prop) -> &mut Self {
        if !self.props.contains(&prop) {
            self.props.push(prop);
        }
        self
    }

    /// Builds the XML body for the PROPFIND request.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, CalDavError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

        let mut propfind = BytesStart::new("D:propfind");
        push_namespaces(&mut propfind, &self.props);
        writer.write_event(Event::Start(propfind))?;
        write_props(&mut writer, &self.props)?;
        writer.write_event(Event::End(BytesEnd::new("D:propfind")))?;

        finish(writer)
    }
}

/// `DAV:sync-collection` REPORT builder (RFC 6578).
///
/// Without a token the server answers with every member of the collection and
/// a fresh token; with a token it answers with the members changed or removed
/// since that token.
#[derive(Debug)]
pub struct SyncCollectionRequest {
    token: Option<SyncToken>,
    limit: Option<u32>,
    props: Vec<Prop>,
}

impl SyncCollectionRequest {
    /// Creates a request for the changes since `token`, or for a full listing.
    ///
    /// Asks for `getetag` and `calendar-data` of every reported member.
    #[must_use]
    pub fn new(token: Option<SyncToken>) -> Self {
        Self {
            token,
            limit: None,
            props: vec![Prop::GetETag, Prop::CalendarData],
        }
    }

    /// Caps the number of members per response (`DAV:limit`).
    #[must_use]
    pub const fn limit(mut self, nresults: u32) -> Self {
        self.limit = Some(nresults);
        self
    }

    /// Replaces the properties requested for each member.
    #[must_use]
    pub fn props(mut self, props: Vec<Prop>) -> Self {
        self.props = props;
        self
    }

    /// Builds the XML body for the sync-collection REPORT.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, CalDavError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

        let mut root = BytesStart::new("D:sync-collection");
        push_namespaces(&mut root, &self.props);
        writer.write_event(Event::Start(root))?;

        // An empty token asks for the initial listing
        match &self.token {
            Some(token) => {
                writer.write_event(Event::Start(BytesStart::new("D:sync-token")))?;
                writer.write_event(Event::Text(BytesText::new(token.as_str())))?;
                writer.write_event(Event::End(BytesEnd::new("D:sync-token")))?;
            }
            None => writer.write_event(Event::Empty(BytesStart::new("D:sync-token")))?,
        }

        writer.write_event(Event::Start(BytesStart::new("D:sync-level")))?;
        writer.write_event(Event::Text(BytesText::new("1")))?;
        writer.write_event(Event::End(BytesEnd::new("D:sync-level")))?;

        if let Some(nresults) = self.limit {
            writer.write_event(Event::Start(BytesStart::new("D:limit")))?;
            writer.write_event(Event::Start(BytesStart::new("D:nresults")))?;
            writer.write_event(Event::Text(BytesText::new(&nresults.to_string())))?;
            writer.write_event(Event::End(BytesEnd::new("D:nresults")))?;
            writer.write_event(Event::End(BytesEnd::new("D:limit")))?;
        }

        write_props(&mut writer, &self.props)?;
        writer.write_event(Event::End(BytesEnd::new("D:sync-collection")))?;

        finish(writer)
    }
}
