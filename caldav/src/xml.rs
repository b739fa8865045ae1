// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! XML utilities for WebDAV/CalDAV processing.

use quick_xml::events::Event;

/// XML namespaces used in `CalDAV`.
pub mod ns {
    /// `WebDAV` namespace.
    pub const DAV: &str = "DAV:";

    /// `CalDAV` namespace.
    pub const CALDAV: &str = "urn:ietf:params:xml:ns:caldav";

    /// Apple calendar server namespace, home of `getctag`.
    pub const CALSERVER: &str = "http://calendarserver.org/ns/";
}

/// Reads the text content of an element whose start tag was just consumed.
///
/// Nested elements are skipped and their text is concatenated; the reader is
/// left right after the matching end tag. Elements without text yield an
/// empty string.
///
/// # Errors
///
/// Returns an error if XML parsing fails.
pub fn read_text<R: std::io::BufRead>(
    reader: &mut quick_xml::Reader<R>,
) -> Result<String, quick_xml::Error> {
    let mut text = String::new();
    let mut depth = 1;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Event::Text(e) => {
                text.push_str(&e.xml10_content()?);
            }
            Event::CData(e) => text.push_str(&e.xml10_content()?),
            Event::GeneralRef(e) => {
                if let Some(ch) = e.resolve_char_ref()? {
                    text.push(ch);
                } else if let Some(s) = quick_xml::escape::resolve_predefined_entity(&e.decode()?) {
                    text.push_str(s);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}
