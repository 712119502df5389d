//! XMLTV parser
//! Streaming quick-xml reader that keeps every channel and programme element
//! intact, so unknown payload survives the round trip to the output file.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::io::BufRead;
use tracing::debug;

use super::document::{ChannelEntry, EpgDocument, ProgrammeEntry, XmlElement, XmlNode};
use crate::error::{GrabberError, GrabberResult};

const ROOT_ELEMENT: &str = "tv";

/// EPG Parser for XMLTV format
pub struct EpgParser;

impl EpgParser {
    /// Parse EPG from an XMLTV string
    pub fn parse(xml: &str, source_name: &str) -> GrabberResult<EpgDocument> {
        Self::parse_bytes(xml.as_bytes(), source_name)
    }

    /// Parse already decompressed feed bytes
    pub fn parse_bytes(bytes: &[u8], source_name: &str) -> GrabberResult<EpgDocument> {
        Self::parse_reader(SanitizingBufReader::new(bytes), source_name)
    }

    /// Parse EPG from a reader - streaming, handles large files
    pub fn parse_reader<R: BufRead>(reader: R, source_name: &str) -> GrabberResult<EpgDocument> {
        let mut xml_reader = Reader::from_reader(reader);
        let mut buf = Vec::with_capacity(8192);

        let mut builder = TreeBuilder::new(source_name);

        loop {
            let position = xml_reader.buffer_position();
            match xml_reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => builder.open(element_from_start(e))?,
                Ok(Event::Empty(ref e)) => {
                    builder.open(element_from_start(e))?;
                    builder.close()?;
                }
                Ok(Event::End(_)) => builder.close()?,
                Ok(Event::Text(e)) => {
                    let raw = String::from_utf8_lossy(&e);
                    builder.text(&decode_xml_entities(&raw));
                }
                Ok(Event::CData(e)) => {
                    builder.text(&String::from_utf8_lossy(&e));
                }
                Ok(Event::GeneralRef(e)) => {
                    let raw = format!("&{};", String::from_utf8_lossy(&e));
                    builder.text(&decode_xml_entities(&raw));
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(GrabberError::parse(
                        source_name,
                        format!("XML error at byte {}: {}", position, e),
                    ));
                }
                // Declarations, comments, doctype and processing instructions are dropped
                _ => {}
            }
            buf.clear();
        }

        builder.finish()
    }
}

/// Assembles elements below `<tv>` and lifts channel/programme entries out
/// as soon as they close.
struct TreeBuilder {
    doc: EpgDocument,
    stack: Vec<XmlElement>,
    root_seen: bool,
    root_closed: bool,
}

impl TreeBuilder {
    fn new(source_name: &str) -> Self {
        Self {
            doc: EpgDocument::new(source_name),
            stack: Vec::new(),
            root_seen: false,
            root_closed: false,
        }
    }

    fn open(&mut self, el: XmlElement) -> GrabberResult<()> {
        if self.root_closed {
            return Err(GrabberError::parse(
                &self.doc.source_name,
                format!("element <{}> after the document root", el.name),
            ));
        }
        if !self.root_seen {
            if el.name != ROOT_ELEMENT {
                return Err(GrabberError::schema(
                    &self.doc.source_name,
                    format!("root element is <{}>, expected <{}>", el.name, ROOT_ELEMENT),
                ));
            }
            self.root_seen = true;
        }
        self.stack.push(el);
        Ok(())
    }

    fn close(&mut self) -> GrabberResult<()> {
        let el = self.stack.pop().ok_or_else(|| {
            GrabberError::parse(&self.doc.source_name, "closing tag without an open element")
        })?;

        match self.stack.len() {
            0 => {
                self.doc.root_attributes = el.attributes;
                self.root_closed = true;
            }
            1 => match el.name.as_str() {
                "channel" => self.doc.channels.push(ChannelEntry::from_element(el)),
                "programme" => self.doc.programmes.push(ProgrammeEntry::from_element(el)),
                other => debug!("{}: skipping top-level <{}>", self.doc.source_name, other),
            },
            _ => {
                if let Some(parent) = self.stack.last_mut() {
                    parent.children.push(XmlNode::Element(el));
                }
            }
        }
        Ok(())
    }

    /// Text directly under the root is formatting only and is dropped
    fn text(&mut self, text: &str) {
        if self.stack.len() < 2 {
            return;
        }
        if let Some(parent) = self.stack.last_mut() {
            match parent.children.last_mut() {
                Some(XmlNode::Text(existing)) => existing.push_str(text),
                _ => parent.children.push(XmlNode::Text(text.to_string())),
            }
        }
    }

    fn finish(mut self) -> GrabberResult<EpgDocument> {
        if !self.root_seen {
            return Err(GrabberError::schema(
                &self.doc.source_name,
                format!("missing <{}> root element", ROOT_ELEMENT),
            ));
        }
        if !self.root_closed {
            return Err(GrabberError::parse(
                &self.doc.source_name,
                "unexpected end of document",
            ));
        }

        // Whitespace between child elements is layout, not payload
        for channel in &mut self.doc.channels {
            strip_layout_whitespace(&mut channel.element);
        }
        for programme in &mut self.doc.programmes {
            strip_layout_whitespace(&mut programme.element);
        }

        Ok(self.doc)
    }
}

/// Drop whitespace-only text nodes from elements that also hold child elements
fn strip_layout_whitespace(el: &mut XmlElement) {
    let has_elements = el.children.iter().any(|n| matches!(n, XmlNode::Element(_)));
    if has_elements {
        el.children
            .retain(|n| !matches!(n, XmlNode::Text(t) if t.trim().is_empty()));
    }
    for node in &mut el.children {
        if let XmlNode::Element(child) = node {
            strip_layout_whitespace(child);
        }
    }
}

fn element_from_start(e: &BytesStart) -> XmlElement {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let attributes = e
        .attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let raw = String::from_utf8_lossy(attr.value.as_ref());
            (key, decode_xml_entities(&raw))
        })
        .collect();

    XmlElement {
        name,
        attributes,
        children: Vec::new(),
    }
}

/// BufRead wrapper that filters out illegal XML 1.0 characters on read
/// Legal XML 1.0: #x9 | #xA | #xD | [#x20-#xD7FF] | [#xE000-#xFFFD] | [#x10000-#x10FFFF]
/// Bare ampersands are escaped so sloppy feeds still parse. An `&` whose
/// entity runs past the end of a chunk is held back until the next read.
struct SanitizingBufReader<R> {
    inner: R,
    buffer: Vec<u8>,
    out_buffer: Vec<u8>,
    /// Unchecked tail starting at an `&` that needs more input
    carry: Vec<u8>,
    pos: usize,
    filled: usize,
}

/// Longest entity name looked at before an `&` is treated as bare
const ENTITY_LOOKAHEAD: usize = 10;

#[derive(Debug, PartialEq, Eq)]
enum EntityCheck {
    Valid,
    Bare,
    Incomplete,
}

impl<R: std::io::Read> SanitizingBufReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: vec![0u8; 64 * 1024],
            out_buffer: Vec::with_capacity(96 * 1024),
            carry: Vec::new(),
            pos: 0,
            filled: 0,
        }
    }

    fn sanitize_byte(b: u8) -> u8 {
        match b {
            0x09 | 0x0A | 0x0D => b,
            0x00..=0x1F | 0x7F => 0x20,
            _ => b,
        }
    }

    fn refill_buffer(&mut self) -> std::io::Result<()> {
        self.out_buffer.clear();
        self.pos = 0;

        // A chunk made only of a held-back tail yields nothing; read on
        loop {
            let n = self.inner.read(&mut self.buffer)?;
            let at_eof = n == 0;

            let mut data = std::mem::take(&mut self.carry);
            data.extend_from_slice(&self.buffer[..n]);

            for i in 0..data.len() {
                let b = Self::sanitize_byte(data[i]);
                if b == b'&' {
                    match Self::check_entity(&data[i..]) {
                        EntityCheck::Valid => {}
                        EntityCheck::Incomplete if !at_eof => {
                            self.carry = data[i..].to_vec();
                            break;
                        }
                        EntityCheck::Incomplete | EntityCheck::Bare => {
                            self.out_buffer.extend_from_slice(b"&amp;");
                            continue;
                        }
                    }
                }
                self.out_buffer.push(b);
            }

            if at_eof || !self.out_buffer.is_empty() {
                break;
            }
        }

        self.filled = self.out_buffer.len();
        Ok(())
    }

    /// Classify bytes starting with `&`
    fn check_entity(bytes: &[u8]) -> EntityCheck {
        if bytes.len() < 2 {
            return EntityCheck::Incomplete;
        }
        if bytes[1] == b'#' {
            return EntityCheck::Valid;
        }

        let mut end = 1;
        while end < bytes.len() && end < ENTITY_LOOKAHEAD {
            match bytes[end] {
                b';' if end > 1 => return EntityCheck::Valid,
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' => end += 1,
                _ => return EntityCheck::Bare,
            }
        }

        if end >= ENTITY_LOOKAHEAD {
            EntityCheck::Bare
        } else {
            EntityCheck::Incomplete
        }
    }
}

impl<R: std::io::Read> std::io::Read for SanitizingBufReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pos >= self.filled {
            self.refill_buffer()?;
            if self.filled == 0 {
                return Ok(0);
            }
        }

        let available = self.filled - self.pos;
        let to_copy = available.min(buf.len());
        buf[..to_copy].copy_from_slice(&self.out_buffer[self.pos..self.pos + to_copy]);
        self.pos += to_copy;
        Ok(to_copy)
    }
}

impl<R: std::io::Read> BufRead for SanitizingBufReader<R> {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        if self.pos >= self.filled {
            self.refill_buffer()?;
        }
        Ok(&self.out_buffer[self.pos..self.filled])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.filled);
    }
}

/// Decode XML entities back to normal characters
fn decode_xml_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    let mut result = s
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&nbsp;", "\u{a0}");

    // Numeric entities, decimal or hex
    let mut search_from = 0;
    while let Some(offset) = result[search_from..].find("&#") {
        let start = search_from + offset;
        let Some(end) = result[start..].find(';') else {
            break;
        };
        let num_str = &result[start + 2..start + end];

        let decoded = match num_str.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => num_str.parse::<u32>().ok(),
        }
        .and_then(char::from_u32);

        match decoded {
            Some(c) => {
                result.replace_range(start..start + end + 1, c.encode_utf8(&mut [0u8; 4]));
                search_from = start + c.len_utf8();
            }
            None => search_from = start + 2,
        }
    }

    // Last so that "&amp;lt;" stays "&lt;"
    result.replace("&amp;", "&")
}
