//! XMLTV serialization
//!
//! Output is indented two spaces per level. Elements holding text keep it
//! inline, so programme payload reads back exactly as it was parsed.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Write;

use super::document::{EpgDocument, XmlElement, XmlNode};
use crate::error::{GrabberError, GrabberResult};

/// Serialize a document to XMLTV bytes
pub fn to_xml_bytes(doc: &EpgDocument) -> GrabberResult<Vec<u8>> {
    let mut out = Vec::with_capacity(64 * 1024);
    write_document(doc, &mut out)?;
    Ok(out)
}

/// Serialize a document to XMLTV text
pub fn to_xml_string(doc: &EpgDocument) -> GrabberResult<String> {
    let bytes = to_xml_bytes(doc)?;
    String::from_utf8(bytes).map_err(|e| GrabberError::write(&doc.source_name, e))
}

/// Stream a document into any writer
pub fn write_document<W: Write>(doc: &EpgDocument, sink: W) -> GrabberResult<()> {
    let target = doc.source_name.as_str();
    let mut writer = Writer::new_with_indent(sink, b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|e| GrabberError::write(target, e))?;

    let mut root = BytesStart::new("tv");
    for (key, value) in &doc.root_attributes {
        root.push_attribute((key.as_str(), value.as_str()));
    }

    if doc.channels.is_empty() && doc.programmes.is_empty() {
        writer
            .write_event(Event::Empty(root))
            .map_err(|e| GrabberError::write(target, e))?;
    } else {
        writer
            .write_event(Event::Start(root))
            .map_err(|e| GrabberError::write(target, e))?;
        for channel in &doc.channels {
            write_element(&mut writer, &channel.element, target)?;
        }
        for programme in &doc.programmes {
            write_element(&mut writer, &programme.element, target)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("tv")))
            .map_err(|e| GrabberError::write(target, e))?;
    }

    writer
        .get_mut()
        .write_all(b"\n")
        .map_err(|e| GrabberError::write(target, e))
}

fn write_element<W: Write>(writer: &mut Writer<W>, el: &XmlElement, target: &str) -> GrabberResult<()> {
    let mut start = BytesStart::new(el.name.as_str());
    for (key, value) in &el.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if el.children.is_empty() {
        return writer
            .write_event(Event::Empty(start))
            .map_err(|e| GrabberError::write(target, e));
    }

    writer
        .write_event(Event::Start(start))
        .map_err(|e| GrabberError::write(target, e))?;
    for child in &el.children {
        match child {
            XmlNode::Element(child) => write_element(writer, child, target)?,
            XmlNode::Text(text) => writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(|e| GrabberError::write(target, e))?,
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(el.name.as_str())))
        .map_err(|e| GrabberError::write(target, e))
}
