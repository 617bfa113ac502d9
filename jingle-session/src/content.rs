use std::collections::HashMap;

use shared::error::Result;
use shared::XmlElement;

use crate::message::SignalingProtocol;
use crate::transport::{TransportDescription, TransportInfo, TransportInfos};

/// An application description; the signaling core never looks inside.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct ContentDescription(pub XmlElement);

impl ContentDescription {
    pub fn new(elem: XmlElement) -> Self {
        ContentDescription(elem)
    }

    pub fn element(&self) -> &XmlElement {
        &self.0
    }
}

#[derive(Default, Debug, Clone, PartialEq)]
pub struct ContentInfo {
    pub name: String,
    /// Namespace of the description, which selects the content client.
    pub content_type: String,
    pub rejected: bool,
    pub description: ContentDescription,
}

impl ContentInfo {
    pub fn new(name: &str, content_type: &str, description: ContentDescription) -> Self {
        ContentInfo {
            name: name.to_owned(),
            content_type: content_type.to_owned(),
            rejected: false,
            description,
        }
    }
}

pub type ContentInfos = Vec<ContentInfo>;

pub fn find_content_by_name<'a>(contents: &'a [ContentInfo], name: &str) -> Option<&'a ContentInfo> {
    contents.iter().find(|c| c.name == name)
}

pub fn find_content_by_type<'a>(
    contents: &'a [ContentInfo],
    content_type: &str,
) -> Option<&'a ContentInfo> {
    contents.iter().find(|c| c.content_type == content_type)
}

/// A named set of contents, such as a BUNDLE group.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct ContentGroup {
    pub semantics: String,
    pub content_names: Vec<String>,
}

impl ContentGroup {
    pub fn new(semantics: &str) -> Self {
        ContentGroup {
            semantics: semantics.to_owned(),
            content_names: vec![],
        }
    }

    pub fn add_content_name(&mut self, name: &str) {
        if !self.has_content_name(name) {
            self.content_names.push(name.to_owned());
        }
    }

    pub fn has_content_name(&self, name: &str) -> bool {
        self.content_names.iter().any(|n| n == name)
    }
}

pub type ContentGroups = Vec<ContentGroup>;

/// Everything one side offers or answers.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct SessionDescription {
    pub contents: ContentInfos,
    /// Local ICE credentials per content. A content without an entry uses an
    /// empty description of the session's transport type.
    pub transport_infos: TransportInfos,
    pub groups: ContentGroups,
}

impl SessionDescription {
    pub fn new(contents: ContentInfos, transport_infos: TransportInfos, groups: ContentGroups) -> Self {
        SessionDescription {
            contents,
            transport_infos,
            groups,
        }
    }

    pub fn content(&self, name: &str) -> Option<&ContentInfo> {
        find_content_by_name(&self.contents, name)
    }

    pub fn first_content_by_type(&self, content_type: &str) -> Option<&ContentInfo> {
        find_content_by_type(&self.contents, content_type)
    }

    pub fn transport_info(&self, content_name: &str) -> Option<&TransportInfo> {
        self.transport_infos
            .iter()
            .find(|t| t.content_name == content_name)
    }

    /// The transport description to offer or answer for each content, without
    /// candidates.
    pub(crate) fn empty_transport_infos(&self, transport_type: &str) -> TransportInfos {
        self.contents
            .iter()
            .map(|content| {
                let description = match self.transport_info(&content.name) {
                    Some(info) => info.description.without_candidates(),
                    None => TransportDescription::new(transport_type, vec![]),
                };
                TransportInfo::new(&content.name, description)
            })
            .collect()
    }

    pub fn group(&self, semantics: &str) -> Option<&ContentGroup> {
        self.groups.iter().find(|g| g.semantics == semantics)
    }

    pub fn has_group(&self, semantics: &str) -> bool {
        self.group(semantics).is_some()
    }
}

/// Parses and writes the descriptions of one content type.
///
/// Implemented by whoever owns the media semantics of that type; the session
/// only routes the XML through it.
pub trait ContentParser {
    fn parse_content(&self, protocol: SignalingProtocol, elem: &XmlElement)
    -> Result<ContentDescription>;

    fn write_content(
        &self,
        protocol: SignalingProtocol,
        desc: &ContentDescription,
    ) -> Result<XmlElement>;

    /// Whether this description has a form in `protocol` at all.
    fn is_writable(&self, _protocol: SignalingProtocol, _desc: &ContentDescription) -> bool {
        true
    }
}

pub type ContentParserMap<'a> = HashMap<String, &'a dyn ContentParser>;

/// Keeps descriptions as the raw XML they arrived as.
#[derive(Default, Debug, Copy, Clone)]
pub struct OpaqueContentParser;

impl ContentParser for OpaqueContentParser {
    fn parse_content(
        &self,
        _protocol: SignalingProtocol,
        elem: &XmlElement,
    ) -> Result<ContentDescription> {
        Ok(ContentDescription::new(elem.clone()))
    }

    fn write_content(
        &self,
        _protocol: SignalingProtocol,
        desc: &ContentDescription,
    ) -> Result<XmlElement> {
        Ok(desc.element().clone())
    }
}
