#[cfg(test)]
mod message_test;

pub mod gingle;
pub mod jingle;

use std::fmt;

use serde::{Deserialize, Serialize};
use shared::constants::*;
use shared::error::{Error, Result};
use shared::{QName, XmlElement};

use crate::constants::*;
use crate::content::{ContentGroups, ContentInfo, ContentInfos, ContentParser, ContentParserMap};
use crate::transport::{
    CandidateTranslator, CandidateTranslatorMap, TransportInfos, TransportParser,
    TransportParserMap,
};
use gingle::GingleCodec;
use jingle::JingleCodec;

/// The wire dialect of a session message.
///
/// `Hybrid` means both bodies are written, until the peer's first message
/// tells which one it speaks.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalingProtocol {
    #[serde(rename = "jingle")]
    Jingle,
    #[serde(rename = "gingle")]
    Gingle,
    #[default]
    #[serde(rename = "hybrid")]
    Hybrid,
}

impl fmt::Display for SignalingProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            SignalingProtocol::Jingle => "jingle",
            SignalingProtocol::Gingle => "gingle",
            SignalingProtocol::Hybrid => "hybrid",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ActionType {
    SessionInitiate,
    SessionInfo,
    SessionAccept,
    SessionReject,
    SessionTerminate,
    TransportInfo,
    TransportAccept,
    DescriptionInfo,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            ActionType::SessionInitiate => "session-initiate",
            ActionType::SessionInfo => "session-info",
            ActionType::SessionAccept => "session-accept",
            ActionType::SessionReject => "session-reject",
            ActionType::SessionTerminate => "session-terminate",
            ActionType::TransportInfo => "transport-info",
            ActionType::TransportAccept => "transport-accept",
            ActionType::DescriptionInfo => "description-info",
        };
        write!(f, "{s}")
    }
}

impl ActionType {
    /// Maps an action name of either dialect.
    pub fn from_wire(s: &str) -> Option<Self> {
        let action = match s {
            GINGLE_ACTION_INITIATE | JINGLE_ACTION_SESSION_INITIATE => ActionType::SessionInitiate,
            GINGLE_ACTION_INFO | JINGLE_ACTION_SESSION_INFO => ActionType::SessionInfo,
            GINGLE_ACTION_ACCEPT | JINGLE_ACTION_SESSION_ACCEPT => ActionType::SessionAccept,
            GINGLE_ACTION_REJECT => ActionType::SessionReject,
            GINGLE_ACTION_TERMINATE | JINGLE_ACTION_SESSION_TERMINATE => {
                ActionType::SessionTerminate
            }
            GINGLE_ACTION_CANDIDATES | JINGLE_ACTION_TRANSPORT_INFO => ActionType::TransportInfo,
            JINGLE_ACTION_TRANSPORT_ACCEPT => ActionType::TransportAccept,
            GINGLE_ACTION_UPDATE | JINGLE_ACTION_DESCRIPTION_INFO => ActionType::DescriptionInfo,
            _ => return None,
        };
        Some(action)
    }
}

/// The envelope of one session action.
///
/// `action_elem` is the dialect body (`<jingle>` or `<session>`) left
/// uninterpreted for the per-action parsers.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionMessage {
    pub protocol: SignalingProtocol,
    pub action: ActionType,
    pub id: String,
    pub sid: String,
    pub initiator: String,
    pub from: String,
    pub to: String,
    pub action_elem: XmlElement,
    pub stanza: XmlElement,
}

impl SessionMessage {
    /// An outbound envelope; the stanza and body are filled in when written.
    pub fn new(
        protocol: SignalingProtocol,
        action: ActionType,
        sid: &str,
        initiator: &str,
        to: &str,
    ) -> Self {
        SessionMessage {
            protocol,
            action,
            id: String::new(),
            sid: sid.to_owned(),
            initiator: initiator.to_owned(),
            from: String::new(),
            to: to.to_owned(),
            action_elem: XmlElement::default(),
            stanza: XmlElement::default(),
        }
    }
}

pub fn iq_name() -> QName {
    QName::new(NS_CLIENT, STR_IQ)
}

pub(crate) fn jingle_name() -> QName {
    QName::new(NS_JINGLE, STR_JINGLE)
}

pub(crate) fn gingle_session_name() -> QName {
    QName::new(NS_GINGLE, STR_SESSION)
}

/// First child with the given local name, whatever its namespace.
pub(crate) fn child_by_local<'a>(elem: &'a XmlElement, local: &str) -> Option<&'a XmlElement> {
    elem.child_elements().find(|e| e.name().local == local)
}

pub(crate) fn require_child_by_local<'a>(elem: &'a XmlElement, local: &str) -> Result<&'a XmlElement> {
    child_by_local(elem, local).ok_or_else(|| Error::ErrMissingElement(local.to_owned()))
}

pub fn is_jingle_message(stanza: &XmlElement) -> bool {
    stanza
        .first_named(&jingle_name())
        .is_some_and(|jingle| jingle.has_attr(ATTR_ACTION) && jingle.has_attr(ATTR_SID))
}

pub fn is_gingle_message(stanza: &XmlElement) -> bool {
    stanza.first_named(&gingle_session_name()).is_some_and(|session| {
        session.has_attr(ATTR_TYPE) && session.has_attr(ATTR_ID) && session.has_attr(ATTR_INITIATOR)
    })
}

/// An `iq` set carrying a session action in either dialect.
pub fn is_session_message(stanza: &XmlElement) -> bool {
    *stanza.name() == iq_name()
        && stanza.attr(ATTR_TYPE) == Some(IQ_SET)
        && (is_jingle_message(stanza) || is_gingle_message(stanza))
}

fn parse_action(action: &str) -> Result<ActionType> {
    ActionType::from_wire(action).ok_or_else(|| Error::ErrParse(format!("unknown action: {action}")))
}

/// Reads the envelope of a session stanza without interpreting the body.
///
/// A stanza carrying both bodies is hybrid and is read through its Jingle body.
pub fn parse_session_message(stanza: &XmlElement) -> Result<SessionMessage> {
    let jingle = stanza.first_named(&jingle_name());
    let session = stanza.first_named(&gingle_session_name());

    let (protocol, action_elem, action, sid, initiator) = match (jingle, session) {
        (Some(jingle), session) => (
            if session.is_some() {
                SignalingProtocol::Hybrid
            } else {
                SignalingProtocol::Jingle
            },
            jingle,
            jingle.attr(ATTR_ACTION).unwrap_or_default(),
            jingle.attr(ATTR_SID).unwrap_or_default(),
            jingle.attr(ATTR_INITIATOR).unwrap_or_default(),
        ),
        (None, Some(session)) => (
            SignalingProtocol::Gingle,
            session,
            session.attr(ATTR_TYPE).unwrap_or_default(),
            session.attr(ATTR_ID).unwrap_or_default(),
            session.attr(ATTR_INITIATOR).unwrap_or_default(),
        ),
        (None, None) => return Err(Error::ErrMissingElement(STR_JINGLE.to_owned())),
    };

    Ok(SessionMessage {
        protocol,
        action: parse_action(action)?,
        id: stanza.attr(ATTR_ID).unwrap_or_default().to_owned(),
        sid: sid.to_owned(),
        initiator: initiator.to_owned(),
        from: stanza.attr(ATTR_FROM).unwrap_or_default().to_owned(),
        to: stanza.attr(ATTR_TO).unwrap_or_default().to_owned(),
        action_elem: action_elem.clone(),
        stanza: stanza.clone(),
    })
}

/// Addresses `stanza` to the peer and appends the dialect body of `msg`.
///
/// Writing twice into the same stanza, once per dialect, yields the hybrid
/// form.
pub fn write_session_message(msg: &SessionMessage, action_elems: Vec<XmlElement>, stanza: &mut XmlElement) {
    stanza.set_attr(ATTR_TO, msg.to.as_str());
    stanza.set_attr(ATTR_TYPE, IQ_SET);
    stanza.add_child(dialect_codec(msg.protocol).write_action(msg, action_elems));
}

/// The content type of an inbound initiate, which picks the client that owns
/// the session. Gingle audio and video both map to the Jingle RTP namespace.
pub fn parse_content_type(protocol: SignalingProtocol, action_elem: &XmlElement) -> Result<String> {
    if protocol == SignalingProtocol::Gingle {
        let content_elem = require_child_by_local(action_elem, STR_DESCRIPTION)?;
        let content_type = content_elem.name().namespace.as_str();
        if content_type == NS_GINGLE_AUDIO || content_type == NS_GINGLE_VIDEO {
            return Ok(NS_JINGLE_RTP.to_owned());
        }
        return Ok(content_type.to_owned());
    }

    let content_name = QName::new(NS_JINGLE, STR_CONTENT);
    let mut content_type: Option<String> = None;
    for pair_elem in action_elem.children_named(&content_name) {
        let content_elem = require_child_by_local(pair_elem, STR_DESCRIPTION)?;
        let this_type = &content_elem.name().namespace;
        match &content_type {
            None => content_type = Some(this_type.clone()),
            Some(first) if first != this_type => return Err(Error::ErrMultipleContentTypes),
            Some(_) => {}
        }
    }
    content_type.ok_or(Error::ErrNoContents)
}

/// The jid a redirect error points at, if `stanza` carries one.
pub fn find_session_redirect(stanza: &XmlElement) -> Option<String> {
    let error_elem = child_by_local(stanza, STR_ERROR)?;
    let redirect_elem = error_elem
        .first_named(&QName::new(NS_GINGLE, STR_REDIRECT))
        .or_else(|| error_elem.first_named(&QName::new(NS_STANZA, STR_REDIRECT)))?;
    let body = redirect_elem.text();
    let pos = body.find(STR_REDIRECT_PREFIX)?;
    Some(body[pos + STR_REDIRECT_PREFIX.len()..].to_owned())
}

/// Contents, transports and groups of an initiate or accept; description-info
/// reuses it without transports.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct SessionInitiate {
    pub contents: ContentInfos,
    pub transports: TransportInfos,
    pub groups: ContentGroups,
}

pub type SessionAccept = SessionInitiate;

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct SessionTerminate {
    pub reason: String,
    pub debug_reason: String,
}

impl SessionTerminate {
    pub fn new(reason: &str) -> Self {
        SessionTerminate {
            reason: reason.to_owned(),
            debug_reason: String::new(),
        }
    }
}

/// The parsers and translators one action is read or written with.
pub struct CodecContext<'a> {
    pub content_parsers: &'a ContentParserMap<'a>,
    pub transport_parsers: &'a TransportParserMap,
    pub translators: &'a CandidateTranslatorMap<'a>,
}

impl<'a> CodecContext<'a> {
    pub fn content_parser(&self, content_type: &str) -> Option<&'a dyn ContentParser> {
        self.content_parsers.get(content_type).copied()
    }

    pub fn translator(&self, content_name: &str) -> Option<&'a dyn CandidateTranslator> {
        self.translators.get(content_name).copied()
    }

    pub(crate) fn parse_content_info(
        &self,
        protocol: SignalingProtocol,
        name: &str,
        content_type: &str,
        elem: &XmlElement,
    ) -> Result<ContentInfo> {
        let parser = self
            .content_parser(content_type)
            .ok_or_else(|| Error::ErrNoContentParser(content_type.to_owned()))?;
        let description = parser.parse_content(protocol, elem)?;
        Ok(ContentInfo::new(name, content_type, description))
    }

    pub(crate) fn write_content_info(
        &self,
        protocol: SignalingProtocol,
        content: &ContentInfo,
    ) -> Result<XmlElement> {
        let parser = self
            .content_parser(&content.content_type)
            .ok_or_else(|| Error::ErrUnknownContentType(content.content_type.clone()))?;
        parser.write_content(protocol, &content.description)
    }

    pub(crate) fn is_writable(&self, protocol: SignalingProtocol, content: &ContentInfo) -> bool {
        self.content_parser(&content.content_type)
            .is_some_and(|parser| parser.is_writable(protocol, &content.description))
    }

    /// The parser for `transport_type` and, for writing, the translator of
    /// `content_name`.
    pub(crate) fn writer(
        &self,
        transport_type: &str,
        content_name: &str,
    ) -> Result<(&'a dyn TransportParser, &'a dyn CandidateTranslator)> {
        let parser = self.transport_parsers.get(transport_type)?;
        let translator = self
            .translator(content_name)
            .ok_or_else(|| Error::ErrUnknownContentName(content_name.to_owned()))?;
        Ok((parser, translator))
    }
}

/// Reads and writes the action bodies of one dialect, one method per action.
pub trait DialectCodec {
    fn protocol(&self) -> SignalingProtocol;

    /// The wire name of `action`, or `None` if the dialect has no form for it.
    fn action_name(&self, action: ActionType) -> Option<&'static str>;

    /// Wraps action elements into this dialect's body element.
    fn write_action(&self, msg: &SessionMessage, action_elems: Vec<XmlElement>) -> XmlElement;

    fn parse_content_message(
        &self,
        action_elem: &XmlElement,
        expect_transports: bool,
        cx: &CodecContext<'_>,
    ) -> Result<SessionInitiate>;

    fn write_content_message(
        &self,
        init: &SessionInitiate,
        cx: &CodecContext<'_>,
    ) -> Result<Vec<XmlElement>>;

    fn parse_session_terminate(&self, action_elem: &XmlElement) -> SessionTerminate;

    fn write_session_terminate(&self, term: &SessionTerminate) -> Vec<XmlElement>;

    fn write_description_info(
        &self,
        contents: &[ContentInfo],
        cx: &CodecContext<'_>,
    ) -> Result<Vec<XmlElement>>;

    /// Transport infos of a transport-info action, resolved against the
    /// content set of the session's initiator.
    fn parse_transport_infos(
        &self,
        action_elem: &XmlElement,
        contents: &[ContentInfo],
        cx: &CodecContext<'_>,
    ) -> Result<TransportInfos>;

    fn write_transport_infos(
        &self,
        tinfos: &TransportInfos,
        cx: &CodecContext<'_>,
    ) -> Result<Vec<XmlElement>>;

    fn parse_session_initiate(
        &self,
        action_elem: &XmlElement,
        cx: &CodecContext<'_>,
    ) -> Result<SessionInitiate> {
        self.parse_content_message(action_elem, true, cx)
    }

    fn write_session_initiate(
        &self,
        init: &SessionInitiate,
        cx: &CodecContext<'_>,
    ) -> Result<Vec<XmlElement>> {
        self.write_content_message(init, cx)
    }

    fn parse_session_accept(
        &self,
        action_elem: &XmlElement,
        cx: &CodecContext<'_>,
    ) -> Result<SessionAccept> {
        self.parse_content_message(action_elem, true, cx)
    }

    fn write_session_accept(
        &self,
        accept: &SessionAccept,
        cx: &CodecContext<'_>,
    ) -> Result<Vec<XmlElement>> {
        self.write_content_message(accept, cx)
    }

    fn parse_description_info(
        &self,
        action_elem: &XmlElement,
        cx: &CodecContext<'_>,
    ) -> Result<ContentInfos> {
        Ok(self.parse_content_message(action_elem, false, cx)?.contents)
    }
}

/// The codec a message of `protocol` is read or written with. Hybrid input is
/// read through its Jingle body.
pub fn dialect_codec(protocol: SignalingProtocol) -> &'static dyn DialectCodec {
    match protocol {
        SignalingProtocol::Gingle => &GingleCodec,
        SignalingProtocol::Jingle | SignalingProtocol::Hybrid => &JingleCodec,
    }
}

/// The dialects an outbound action is written in.
pub fn write_dialects(protocol: SignalingProtocol) -> &'static [SignalingProtocol] {
    match protocol {
        SignalingProtocol::Hybrid => &[SignalingProtocol::Jingle, SignalingProtocol::Gingle],
        SignalingProtocol::Jingle => &[SignalingProtocol::Jingle],
        SignalingProtocol::Gingle => &[SignalingProtocol::Gingle],
    }
}

pub(crate) fn copy_children(from: &XmlElement, to: &mut XmlElement) {
    for child in from.child_elements() {
        to.add_child(child.clone());
    }
}
