//! XMLTV document model
//!
//! Channel and programme elements keep their full markup so that anything
//! the engine does not look at is written back out unchanged.

use crate::normalize::normalize_key;

/// A node in an element's content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// Generic markup element: name, ordered attributes, ordered children
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    /// First attribute with the given name
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn child_elements<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter_map(move |node| match node {
            XmlNode::Element(el) if el.name == name => Some(el),
            _ => None,
        })
    }

    /// Concatenated text payload of this element and its descendants
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }
}

fn collect_text(el: &XmlElement, out: &mut String) {
    for node in &el.children {
        match node {
            XmlNode::Text(t) => out.push_str(t),
            XmlNode::Element(child) => collect_text(child, out),
        }
    }
}

/// One `<display-name>` as written in the feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayName {
    /// Bare text content
    Text(String),
    /// Text carrying annotations such as `lang`
    Tagged {
        text: String,
        attributes: Vec<(String, String)>,
    },
}

impl DisplayName {
    pub fn from_element(el: &XmlElement) -> Self {
        if el.attributes.is_empty() {
            DisplayName::Text(el.text())
        } else {
            DisplayName::Tagged {
                text: el.text(),
                attributes: el.attributes.clone(),
            }
        }
    }

    /// Textual payload; annotations are discarded
    pub fn text(&self) -> &str {
        match self {
            DisplayName::Text(text) | DisplayName::Tagged { text, .. } => text,
        }
    }
}

/// Any shape a display-name value can arrive in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameValue {
    Single(DisplayName),
    Many(Vec<NameValue>),
}

impl From<DisplayName> for NameValue {
    fn from(name: DisplayName) -> Self {
        NameValue::Single(name)
    }
}

impl From<Vec<DisplayName>> for NameValue {
    fn from(names: Vec<DisplayName>) -> Self {
        NameValue::Many(names.into_iter().map(NameValue::Single).collect())
    }
}

/// Flatten any display-name shape into ordered, normalized match keys.
/// Names that normalize to nothing are dropped.
pub fn flatten_display_names(value: &NameValue) -> Vec<String> {
    let mut out = Vec::new();
    flatten_into(value, &mut out);
    out
}

fn flatten_into(value: &NameValue, out: &mut Vec<String>) {
    match value {
        NameValue::Single(name) => {
            if let Some(key) = normalize_key(name.text()) {
                out.push(key);
            }
        }
        NameValue::Many(values) => {
            for v in values {
                flatten_into(v, out);
            }
        }
    }
}

/// `<channel>` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEntry {
    /// Raw `id` attribute
    pub id: String,
    pub display_names: Vec<DisplayName>,
    pub element: XmlElement,
}

impl ChannelEntry {
    pub fn from_element(element: XmlElement) -> Self {
        let id = element.attr("id").unwrap_or_default().to_string();
        let display_names = element
            .child_elements("display-name")
            .map(DisplayName::from_element)
            .collect();
        Self {
            id,
            display_names,
            element,
        }
    }

    /// Normalized display names, in document order
    pub fn name_keys(&self) -> Vec<String> {
        flatten_display_names(&NameValue::from(self.display_names.clone()))
    }
}

/// `<programme>` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgrammeEntry {
    /// Raw `channel` attribute, a back-reference to a channel id
    pub channel: String,
    /// Raw `start` attribute
    pub start: String,
    pub element: XmlElement,
}

impl ProgrammeEntry {
    pub fn from_element(element: XmlElement) -> Self {
        Self {
            channel: element.attr("channel").unwrap_or_default().to_string(),
            start: element.attr("start").unwrap_or_default().to_string(),
            element,
        }
    }
}

/// A parsed guide feed, or several concatenated
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpgDocument {
    /// Where the document came from, for error messages
    pub source_name: String,
    /// Attributes of the `<tv>` root
    pub root_attributes: Vec<(String, String)>,
    pub channels: Vec<ChannelEntry>,
    pub programmes: Vec<ProgrammeEntry>,
}

impl EpgDocument {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            ..Default::default()
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn programme_count(&self) -> usize {
        self.programmes.len()
    }
}
