
pub mod p2p;
pub mod proxy;

use std::collections::HashMap;
use std::fmt;

use shared::error::{Error, Result};
use shared::XmlElement;

use crate::candidate::{Candidate, Candidates};
use crate::constants::NS_GINGLE_P2P;
use p2p::P2PTransportParser;

/// Which ufrag rules a candidate username is checked against.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IceProtocol {
    /// Google ICE: at most 16 characters from the base64 alphabet.
    Google,
    /// RFC 5245 ICE: at most 256 characters.
    Rfc5245,
}

/// Transport type, ICE credentials and candidates of one content.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct TransportDescription {
    pub transport_type: String,
    pub ice_ufrag: String,
    pub ice_pwd: String,
    pub candidates: Candidates,
}

impl TransportDescription {
    pub fn new(transport_type: &str, candidates: Candidates) -> Self {
        TransportDescription {
            transport_type: transport_type.to_owned(),
            candidates,
            ..Default::default()
        }
    }

    /// The same description without candidates, as carried by offers and
    /// answers while candidates trickle separately.
    pub fn without_candidates(&self) -> Self {
        TransportDescription {
            transport_type: self.transport_type.clone(),
            ice_ufrag: self.ice_ufrag.clone(),
            ice_pwd: self.ice_pwd.clone(),
            candidates: vec![],
        }
    }
}

#[derive(Default, Debug, Clone, PartialEq)]
pub struct TransportInfo {
    pub content_name: String,
    pub description: TransportDescription,
}

impl TransportInfo {
    pub fn new(content_name: &str, description: TransportDescription) -> Self {
        TransportInfo {
            content_name: content_name.to_owned(),
            description,
        }
    }
}

pub type TransportInfos = Vec<TransportInfo>;

impl fmt::Display for TransportInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {} candidates)",
            self.content_name,
            self.description.transport_type,
            self.description.candidates.len()
        )
    }
}

/// Maps component ids of one content to the channel names used on the wire.
pub trait CandidateTranslator {
    fn channel_name_from_component(&self, component: u16) -> Option<&str>;
    fn component_from_channel_name(&self, channel_name: &str) -> Option<u16>;
}

pub type CandidateTranslatorMap<'a> = HashMap<String, &'a dyn CandidateTranslator>;

/// Serializes the transport description and candidates of one transport
/// family.
///
/// The translator may be absent; parsing then fails as soon as a candidate is
/// present instead of dropping it.
pub trait TransportParser {
    fn parse_transport_description(
        &self,
        elem: &XmlElement,
        translator: Option<&dyn CandidateTranslator>,
    ) -> Result<TransportDescription>;

    fn write_transport_description(
        &self,
        desc: &TransportDescription,
        translator: Option<&dyn CandidateTranslator>,
    ) -> Result<XmlElement>;

    fn parse_gingle_candidate(
        &self,
        elem: &XmlElement,
        translator: Option<&dyn CandidateTranslator>,
    ) -> Result<Candidate>;

    fn write_gingle_candidate(
        &self,
        candidate: &Candidate,
        translator: Option<&dyn CandidateTranslator>,
    ) -> Result<XmlElement>;
}

/// Transport parsers by transport type namespace.
pub struct TransportParserMap {
    parsers: HashMap<String, Box<dyn TransportParser>>,
}

impl Default for TransportParserMap {
    fn default() -> Self {
        let mut map = TransportParserMap {
            parsers: HashMap::new(),
        };
        map.insert(NS_GINGLE_P2P, Box::new(P2PTransportParser));
        map
    }
}

impl fmt::Debug for TransportParserMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportParserMap")
            .field("parsers", &self.parsers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TransportParserMap {
    pub fn insert(&mut self, transport_type: &str, parser: Box<dyn TransportParser>) {
        self.parsers.insert(transport_type.to_owned(), parser);
    }

    pub fn contains(&self, transport_type: &str) -> bool {
        self.parsers.contains_key(transport_type)
    }

    pub fn get(&self, transport_type: &str) -> Result<&dyn TransportParser> {
        self.parsers
            .get(transport_type)
            .map(|p| p.as_ref())
            .ok_or_else(|| Error::ErrUnsupportedTransport(transport_type.to_owned()))
    }
}
