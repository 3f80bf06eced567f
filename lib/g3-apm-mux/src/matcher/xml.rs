/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use memchr::memmem;

use super::{MatchResult, ProtocolMatcher};
use crate::{MuxConfig, XmlScanLimit};

enum XmlEvent<'a> {
    Declaration,
    Comment,
    Markup,
    StartElement(&'a [u8]),
    EndElement,
    Characters,
}

enum ScanStop {
    Incomplete,
    Invalid,
}

struct XmlCursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> XmlCursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        XmlCursor { data, offset: 0 }
    }

    fn find_after(&self, start: usize, needle: &[u8]) -> Result<usize, ScanStop> {
        match memmem::find(&self.data[start..], needle) {
            Some(p) => Ok(start + p + needle.len()),
            None => Err(ScanStop::Incomplete),
        }
    }

    fn next_event(&mut self) -> Result<XmlEvent<'a>, ScanStop> {
        let left = &self.data[self.offset..];
        if left.is_empty() {
            return Err(ScanStop::Incomplete);
        }

        if left[0] != b'<' {
            // characters run up to the next markup
            let Some(p) = memchr::memchr(b'<', left) else {
                return Err(ScanStop::Incomplete);
            };
            self.offset += p;
            return Ok(XmlEvent::Characters);
        }
        if left.len() < 2 {
            return Err(ScanStop::Incomplete);
        }

        let start = self.offset;
        let (event, end) = match left[1] {
            b'?' => (XmlEvent::Declaration, self.find_after(start + 2, b"?>")?),
            b'!' => {
                if left.len() < 4 {
                    return Err(ScanStop::Incomplete);
                }
                if left.starts_with(b"<!--") {
                    (XmlEvent::Comment, self.find_after(start + 4, b"-->")?)
                } else {
                    (XmlEvent::Markup, self.find_after(start + 2, b">")?)
                }
            }
            b'/' => (XmlEvent::EndElement, self.find_after(start + 2, b">")?),
            c if c.is_ascii_alphabetic() || c == b'_' || c == b':' => {
                let end = self.find_after(start + 1, b">")?;
                let tag = &self.data[start + 1..end - 1];
                let name_len = tag
                    .iter()
                    .position(|c| c.is_ascii_whitespace() || *c == b'/')
                    .unwrap_or(tag.len());
                (XmlEvent::StartElement(&tag[..name_len]), end)
            }
            _ => return Err(ScanStop::Invalid),
        };
        self.offset = end;
        Ok(event)
    }
}

fn local_name(name: &[u8]) -> &[u8] {
    match memchr::memrchr(b':', name) {
        Some(p) => &name[p + 1..],
        None => name,
    }
}

/// Scan the head of a document for one of the target elements
///
/// The scan gives up as no-match once more than `max_events` events or `max_tags`
/// start elements have been seen without a target.
fn scan_for_tags(data: &[u8], targets: &[Vec<u8>], limit: &XmlScanLimit) -> MatchResult {
    let skip = data
        .iter()
        .position(|c| !c.is_ascii_whitespace())
        .unwrap_or(data.len());
    let data = &data[skip..];
    match data.first() {
        None => return MatchResult::NeedMoreData,
        Some(b'<') => {}
        Some(_) => return MatchResult::Mismatch,
    }

    let mut cursor = XmlCursor::new(data);
    let mut events = 0usize;
    let mut tags = 0usize;
    loop {
        let event = match cursor.next_event() {
            Ok(event) => event,
            Err(ScanStop::Incomplete) => return MatchResult::NeedMoreData,
            Err(ScanStop::Invalid) => return MatchResult::Mismatch,
        };
        events += 1;
        if events > limit.max_events {
            return MatchResult::Mismatch;
        }
        match event {
            XmlEvent::StartElement(name) => {
                tags += 1;
                if tags > limit.max_tags {
                    return MatchResult::Mismatch;
                }
                let name = local_name(name);
                if targets.iter().any(|t| t.as_slice() == name) {
                    return MatchResult::Matched;
                }
            }
            XmlEvent::Declaration
            | XmlEvent::Comment
            | XmlEvent::Markup
            | XmlEvent::EndElement
            | XmlEvent::Characters => {}
        }
    }
}

/// Matches an xml document containing one of the target elements near its start
pub struct XmlTagMatcher {
    protocol: String,
    targets: Vec<Vec<u8>>,
}

impl XmlTagMatcher {
    pub fn new(protocol: &str, targets: &[&str]) -> Self {
        XmlTagMatcher {
            protocol: protocol.to_string(),
            targets: targets.iter().map(|t| t.as_bytes().to_vec()).collect(),
        }
    }
}

impl ProtocolMatcher for XmlTagMatcher {
    fn protocol(&self) -> &str {
        &self.protocol
    }

    fn required_bytes(&self) -> usize {
        1
    }

    fn match_content(&self, data: &[u8], config: &MuxConfig) -> MatchResult {
        scan_for_tags(data, &self.targets, config.xml_limit())
    }
}
