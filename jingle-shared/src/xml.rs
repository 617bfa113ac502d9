#[cfg(test)]
mod xml_test;

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::constants::NS_XML;
use crate::error::{Error, Result};

/// A namespace-qualified element or attribute name.
///
/// Attributes without a prefix live in the empty namespace.
#[derive(Default, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    pub namespace: String,
    pub local: String,
}

impl QName {
    pub fn new(namespace: &str, local: &str) -> Self {
        QName {
            namespace: namespace.to_owned(),
            local: local.to_owned(),
        }
    }

    /// A name in the empty namespace.
    pub fn local(local: &str) -> Self {
        QName::new("", local)
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.local)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// An owned XML element tree with resolved namespaces.
///
/// XmlElement is the unit exchanged between the signaling layers: a stanza is an
/// XmlElement, and so is every action body, content description and candidate.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct XmlElement {
    name: QName,
    attrs: Vec<(QName, String)>,
    children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: QName) -> Self {
        XmlElement {
            name,
            attrs: vec![],
            children: vec![],
        }
    }

    pub fn name(&self) -> &QName {
        &self.name
    }

    pub fn is(&self, namespace: &str, local: &str) -> bool {
        self.name.namespace == namespace && self.name.local == local
    }

    /// Returns an attribute in the empty namespace.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.namespace.is_empty() && k.local == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn attr_qualified(&self, name: &QName) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    /// Returns an attribute or a parse error naming it.
    pub fn require_attr(&self, name: &str) -> Result<&str> {
        self.attr(name)
            .ok_or_else(|| Error::ErrMissingAttribute(name.to_owned()))
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&QName, &str)> {
        self.attrs.iter().map(|(k, v)| (k, v.as_str()))
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        self.set_attr_qualified(QName::local(name), value);
    }

    pub fn set_attr_qualified(&mut self, name: QName, value: impl Into<String>) {
        let value = value.into();
        if let Some(slot) = self.attrs.iter_mut().find(|(k, _)| *k == name) {
            slot.1 = value;
        } else {
            self.attrs.push((name, value));
        }
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn add_child(&mut self, child: XmlElement) {
        self.children.push(XmlNode::Element(child));
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.add_child(child);
        self
    }

    pub fn add_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if !text.is_empty() {
            self.children.push(XmlNode::Text(text));
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.add_text(text);
        self
    }

    pub fn nodes(&self) -> &[XmlNode] {
        &self.children
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(elem) => Some(elem),
            XmlNode::Text(_) => None,
        })
    }

    pub fn first_element(&self) -> Option<&XmlElement> {
        self.child_elements().next()
    }

    pub fn first_named(&self, name: &QName) -> Option<&XmlElement> {
        self.child_elements().find(|elem| elem.name == *name)
    }

    pub fn children_named<'a>(
        &'a self,
        name: &'a QName,
    ) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.child_elements().filter(move |elem| elem.name == *name)
    }

    /// Returns a child element or a parse error naming it.
    pub fn require_child(&self, name: &QName) -> Result<&XmlElement> {
        self.first_named(name)
            .ok_or_else(|| Error::ErrMissingElement(name.local.clone()))
    }

    /// Concatenated text of the direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(t) => Some(t.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    pub fn to_xml_string(&self) -> Result<String> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        write_element(&mut writer, self, "")?;
        let raw = writer.into_inner().into_inner();
        String::from_utf8(raw).map_err(|err| Error::ErrXml(err.to_string()))
    }

    /// Parses a single-rooted document. Whitespace-only text is dropped.
    pub fn parse(xml: &str) -> Result<XmlElement> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut scopes: Vec<Vec<(String, String)>> = vec![];
        let mut open: Vec<XmlElement> = vec![];
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    let elem = open_element(e, &mut scopes)?;
                    open.push(elem);
                }
                Ok(Event::Empty(ref e)) => {
                    let elem = open_element(e, &mut scopes)?;
                    scopes.pop();
                    close_element(elem, &mut open, &mut root)?;
                }
                Ok(Event::End(_)) => {
                    let elem = open
                        .pop()
                        .ok_or_else(|| Error::ErrXml("unbalanced end tag".to_owned()))?;
                    scopes.pop();
                    close_element(elem, &mut open, &mut root)?;
                }
                Ok(Event::Text(ref e)) => {
                    let text = e
                        .unescape()
                        .map_err(|err| Error::ErrXml(err.to_string()))?;
                    if let Some(current) = open.last_mut() {
                        current.add_text(text.into_owned());
                    }
                }
                Ok(Event::CData(e)) => {
                    let text = String::from_utf8(e.into_inner().into_owned())
                        .map_err(|err| Error::ErrXml(err.to_string()))?;
                    if let Some(current) = open.last_mut() {
                        current.add_text(text);
                    }
                }
                Ok(Event::Eof) => break,
                Err(err) => return Err(Error::ErrXml(err.to_string())),
                _ => {}
            }
        }

        if !open.is_empty() {
            return Err(Error::ErrXml("unclosed element".to_owned()));
        }
        root.ok_or(Error::ErrXmlNoRoot)
    }
}

impl fmt::Display for XmlElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.to_xml_string().map_err(|_| fmt::Error)?;
        write!(f, "{s}")
    }
}

impl FromStr for XmlElement {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        XmlElement::parse(s)
    }
}

fn utf8(raw: &[u8]) -> Result<&str> {
    std::str::from_utf8(raw).map_err(|err| Error::ErrXml(err.to_string()))
}

fn split_prefix(raw: &str) -> (Option<&str>, &str) {
    match raw.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, raw),
    }
}

fn resolve_prefix(scopes: &[Vec<(String, String)>], prefix: &str) -> Option<String> {
    if prefix == "xml" {
        return Some(NS_XML.to_owned());
    }
    scopes
        .iter()
        .rev()
        .flat_map(|scope| scope.iter())
        .find(|(p, _)| p == prefix)
        .map(|(_, ns)| ns.clone())
}

// Pushes the element's namespace scope; the caller pops it when the element closes.
fn open_element(e: &BytesStart<'_>, scopes: &mut Vec<Vec<(String, String)>>) -> Result<XmlElement> {
    let mut scope = vec![];
    let mut raw_attrs = vec![];
    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::ErrXml(err.to_string()))?;
        let key = utf8(attr.key.as_ref())?.to_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| Error::ErrXml(err.to_string()))?
            .into_owned();
        if key == "xmlns" {
            scope.push((String::new(), value));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            scope.push((prefix.to_owned(), value));
        } else {
            raw_attrs.push((key, value));
        }
    }
    scopes.push(scope);

    let raw_name = utf8(e.name().as_ref())?.to_owned();
    let (prefix, local) = split_prefix(&raw_name);
    let namespace = resolve_prefix(scopes, prefix.unwrap_or("")).unwrap_or_default();
    let mut elem = XmlElement::new(QName::new(&namespace, local));

    for (key, value) in raw_attrs {
        let (prefix, local) = split_prefix(&key);
        let name = match prefix {
            Some(prefix) => {
                let namespace = resolve_prefix(scopes, prefix)
                    .ok_or_else(|| Error::ErrXml(format!("undeclared prefix: {prefix}")))?;
                QName::new(&namespace, local)
            }
            None => QName::local(local),
        };
        elem.attrs.push((name, value));
    }
    Ok(elem)
}

fn close_element(
    elem: XmlElement,
    open: &mut [XmlElement],
    root: &mut Option<XmlElement>,
) -> Result<()> {
    if let Some(parent) = open.last_mut() {
        parent.add_child(elem);
        Ok(())
    } else if root.is_none() {
        *root = Some(elem);
        Ok(())
    } else {
        Err(Error::ErrXml("more than one root element".to_owned()))
    }
}

fn write_element(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    elem: &XmlElement,
    parent_namespace: &str,
) -> Result<()> {
    let mut start = BytesStart::new(elem.name.local.as_str());
    if elem.name.namespace != parent_namespace {
        start.push_attribute(("xmlns", elem.name.namespace.as_str()));
    }

    let mut prefixes = 0;
    for (name, value) in &elem.attrs {
        if name.namespace.is_empty() {
            start.push_attribute((name.local.as_str(), value.as_str()));
        } else if name.namespace == NS_XML {
            let key = format!("xml:{}", name.local);
            start.push_attribute((key.as_str(), value.as_str()));
        } else {
            prefixes += 1;
            let decl = format!("xmlns:a{prefixes}");
            let key = format!("a{prefixes}:{}", name.local);
            start.push_attribute((decl.as_str(), name.namespace.as_str()));
            start.push_attribute((key.as_str(), value.as_str()));
        }
    }

    if elem.children.is_empty() {
        writer
            .write_event(Event::Empty(start))
            .map_err(|err| Error::ErrXml(err.to_string()))?;
        return Ok(());
    }

    writer
        .write_event(Event::Start(start))
        .map_err(|err| Error::ErrXml(err.to_string()))?;
    for node in &elem.children {
        match node {
            XmlNode::Element(child) => write_element(writer, child, &elem.name.namespace)?,
            XmlNode::Text(text) => writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(|err| Error::ErrXml(err.to_string()))?,
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(elem.name.local.as_str())))
        .map_err(|err| Error::ErrXml(err.to_string()))?;
    Ok(())
}
