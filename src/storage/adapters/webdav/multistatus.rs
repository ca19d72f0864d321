//! `207 Multi-Status` bodies.
//!
//! Only the live properties the adapter needs are extracted, plus the
//! property-bag dead property. Namespace prefixes are ignored; elements are
//! matched by local name.

use once_cell::sync::Lazy;
use regex::Regex;

/// Namespace of the property-bag dead property.
pub const BAG_NAMESPACE: &str = "urn:mountstore:";

/// Local name of the property-bag dead property.
pub const BAG_PROPERTY: &str = "propertybag";

static RESPONSE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?s)<(?:[A-Za-z0-9_-]+:)?response(?:\s[^>]*)?>(.*?)</(?:[A-Za-z0-9_-]+:)?response\s*>").ok()
});

static COLLECTION: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?s)<(?:[A-Za-z0-9_-]+:)?resourcetype[^>]*>.*?<(?:[A-Za-z0-9_-]+:)?collection\s*/?>").ok());

static PROPSTAT_STATUS: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?s)<(?:[A-Za-z0-9_-]+:)?status[^>]*>\s*HTTP/\d(?:\.\d)?\s+(\d{3})").ok());

/// Returns the text of the first `<name>` element in `xml`.
fn element_text(xml: &str, name: &str) -> Option<String> {
    let pattern = format!(
        r"(?s)<(?:[A-Za-z0-9_-]+:)?{name}(?:\s[^>]*)?>(.*?)</(?:[A-Za-z0-9_-]+:)?{name}\s*>"
    );
    Regex::new(&pattern)
        .ok()?
        .captures(xml)
        .map(|caps| unescape(caps[1].trim()))
}

/// One `<response>` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DavEntry {
    /// Href as sent by the server (still percent-encoded).
    pub href: String,
    /// Whether the resource is a collection.
    pub is_collection: bool,
    /// `getcontentlength`.
    pub content_length: Option<u64>,
    /// `getlastmodified` (RFC 2822).
    pub last_modified: Option<String>,
    /// `creationdate` (RFC 3339).
    pub creation_date: Option<String>,
    /// `getcontenttype`.
    pub content_type: Option<String>,
    /// Unescaped property-bag JSON.
    pub property_bag: Option<String>,
}

/// Parses every `<response>` of a multistatus body.
#[must_use]
pub fn parse_multistatus(body: &str) -> Vec<DavEntry> {
    let Some(response) = RESPONSE.as_ref() else {
        return Vec::new();
    };
    response
        .captures_iter(body)
        .filter_map(|caps| {
            let xml = &caps[1];
            let href = element_text(xml, "href")?;
            Some(DavEntry {
                href,
                is_collection: COLLECTION.as_ref().is_some_and(|re| re.is_match(xml)),
                content_length: element_text(xml, "getcontentlength").and_then(|v| v.parse().ok()),
                last_modified: element_text(xml, "getlastmodified").filter(|v| !v.is_empty()),
                creation_date: element_text(xml, "creationdate").filter(|v| !v.is_empty()),
                content_type: element_text(xml, "getcontenttype").filter(|v| !v.is_empty()),
                property_bag: element_text(xml, BAG_PROPERTY),
            })
        })
        .collect()
}

/// Returns the first non-2xx `propstat` status of a PROPPATCH answer.
#[must_use]
pub fn failed_propstat(body: &str) -> Option<u16> {
    PROPSTAT_STATUS.as_ref().and_then(|re| {
        re.captures_iter(body)
            .filter_map(|caps| caps[1].parse::<u16>().ok())
            .find(|status| !(200..300).contains(status))
    })
}

/// PROPFIND body requesting the live properties and the property bag.
#[must_use]
pub fn propfind_body() -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<D:propfind xmlns:D="DAV:" xmlns:M="{BAG_NAMESPACE}">
  <D:prop>
    <D:resourcetype/>
    <D:getcontentlength/>
    <D:getlastmodified/>
    <D:creationdate/>
    <D:getcontenttype/>
    <M:{BAG_PROPERTY}/>
  </D:prop>
</D:propfind>"#
    )
}

/// PROPPATCH body storing `bag`, or removing the property when `None`.
#[must_use]
pub fn proppatch_body(bag: Option<&str>) -> String {
    let instruction = match bag {
        Some(json) => format!(
            "<D:set><D:prop><M:{BAG_PROPERTY}>{}</M:{BAG_PROPERTY}></D:prop></D:set>",
            escape(json)
        ),
        None => format!("<D:remove><D:prop><M:{BAG_PROPERTY}/></D:prop></D:remove>"),
    };
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<D:propertyupdate xmlns:D="DAV:" xmlns:M="{BAG_NAMESPACE}">{instruction}</D:propertyupdate>"#
    )
}

/// Escapes XML text content.
#[must_use]
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Resolves the predefined and numeric XML entities.
#[must_use]
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let Some(end) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let entity = &tail[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => out.push(c),
            None => out.push_str(&tail[..=end]),
        }
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    out
}
