use std::net::{IpAddr, SocketAddr};

use shared::constants::ATTR_TYPE;
use shared::error::{Error, Result};
use shared::{QName, XmlElement};

use super::{CandidateTranslator, IceProtocol, TransportDescription, TransportParser};
use crate::candidate::Candidate;
use crate::constants::*;

/// Parser for the Google p2p transport, used by both dialects.
#[derive(Default, Debug, Copy, Clone)]
pub struct P2PTransportParser;

fn transport_name() -> QName {
    QName::new(NS_GINGLE_P2P, STR_TRANSPORT)
}

fn jingle_candidate_name() -> QName {
    QName::new(NS_GINGLE_P2P, STR_CANDIDATE)
}

fn gingle_candidate_name() -> QName {
    QName::new(NS_GINGLE, STR_CANDIDATE)
}

fn invalid(name: &str, value: &str) -> Error {
    Error::ErrInvalidAttribute {
        name: name.to_owned(),
        value: value.to_owned(),
    }
}

fn parse_attr<T: std::str::FromStr>(elem: &XmlElement, name: &str) -> Result<T> {
    let value = elem.require_attr(name)?;
    value.parse::<T>().map_err(|_| invalid(name, value))
}

fn is_base64_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '='
}

pub(crate) fn verify_username_format(protocol: IceProtocol, username: &str) -> Result<()> {
    match protocol {
        IceProtocol::Google => {
            if username.len() > MAX_GICE_USERNAME_SIZE {
                return Err(Error::ErrInvalidUsername(format!(
                    "candidate username is too long: {username}"
                )));
            }
            if !username.chars().all(is_base64_char) {
                return Err(Error::ErrInvalidUsername(format!(
                    "candidate username has non-base64 encoded characters: {username}"
                )));
            }
        }
        IceProtocol::Rfc5245 => {
            if username.len() > MAX_ICE_USERNAME_SIZE {
                return Err(Error::ErrInvalidUsername(format!(
                    "candidate username is too long: {username}"
                )));
            }
        }
    }
    Ok(())
}

impl P2PTransportParser {
    fn parse_candidate(
        &self,
        protocol: IceProtocol,
        elem: &XmlElement,
        translator: Option<&dyn CandidateTranslator>,
    ) -> Result<Candidate> {
        for name in [
            ATTR_NAME,
            ATTR_ADDRESS,
            ATTR_PORT,
            ATTR_USERNAME,
            ATTR_PROTOCOL,
            ATTR_GENERATION,
        ] {
            elem.require_attr(name)?;
        }

        let ip: IpAddr = parse_attr(elem, ATTR_ADDRESS)?;
        let port: u16 = parse_attr(elem, ATTR_PORT)?;

        let channel_name = elem.require_attr(ATTR_NAME)?;
        let component = translator
            .and_then(|t| t.component_from_channel_name(channel_name))
            .ok_or_else(|| Error::ErrUnknownChannelName(channel_name.to_owned()))?;

        let preference: f32 = parse_attr(elem, ATTR_PREFERENCE)?;
        if !(0.0..=1.0).contains(&preference) {
            return Err(invalid(ATTR_PREFERENCE, &preference.to_string()));
        }

        let mut candidate = Candidate {
            component,
            address: SocketAddr::new(ip, port),
            protocol: parse_attr(elem, ATTR_PROTOCOL)?,
            username: elem.require_attr(ATTR_USERNAME)?.to_owned(),
            preference,
            generation: parse_attr(elem, ATTR_GENERATION)?,
            ..Default::default()
        };
        if let Some(password) = elem.attr(ATTR_PASSWORD) {
            candidate.password = password.to_owned();
        }
        if elem.has_attr(ATTR_TYPE) {
            candidate.candidate_type = parse_attr(elem, ATTR_TYPE)?;
        }
        if let Some(network) = elem.attr(ATTR_NETWORK) {
            candidate.network_name = network.to_owned();
        }

        verify_username_format(protocol, &candidate.username)?;
        Ok(candidate)
    }

    fn write_candidate(
        &self,
        name: QName,
        candidate: &Candidate,
        translator: Option<&dyn CandidateTranslator>,
    ) -> Result<XmlElement> {
        let channel_name = translator
            .and_then(|t| t.channel_name_from_component(candidate.component))
            .ok_or(Error::ErrUnknownComponent(candidate.component))?;

        let mut elem = XmlElement::new(name);
        elem.set_attr(ATTR_NAME, channel_name);
        elem.set_attr(ATTR_ADDRESS, candidate.address.ip().to_string());
        elem.set_attr(ATTR_PORT, candidate.address.port().to_string());
        elem.set_attr(ATTR_PREFERENCE, candidate.preference_str());
        elem.set_attr(ATTR_USERNAME, candidate.username.as_str());
        elem.set_attr(ATTR_PROTOCOL, candidate.protocol.to_string());
        elem.set_attr(ATTR_GENERATION, candidate.generation.to_string());
        if !candidate.password.is_empty() {
            elem.set_attr(ATTR_PASSWORD, candidate.password.as_str());
        }
        elem.set_attr(ATTR_TYPE, candidate.candidate_type.to_string());
        if !candidate.network_name.is_empty() {
            elem.set_attr(ATTR_NETWORK, candidate.network_name.as_str());
        }
        Ok(elem)
    }
}

impl TransportParser for P2PTransportParser {
    fn parse_transport_description(
        &self,
        elem: &XmlElement,
        translator: Option<&dyn CandidateTranslator>,
    ) -> Result<TransportDescription> {
        if *elem.name() != transport_name() {
            return Err(Error::ErrUnsupportedTransport(elem.name().namespace.clone()));
        }

        let mut desc = TransportDescription::new(NS_GINGLE_P2P, vec![]);
        if let Some(ufrag) = elem.attr(ATTR_UFRAG) {
            verify_username_format(IceProtocol::Rfc5245, ufrag)?;
            desc.ice_ufrag = ufrag.to_owned();
        }
        if let Some(pwd) = elem.attr(ATTR_PWD) {
            desc.ice_pwd = pwd.to_owned();
        }

        let candidate_name = jingle_candidate_name();
        for candidate_elem in elem.children_named(&candidate_name) {
            let candidate = self.parse_candidate(IceProtocol::Rfc5245, candidate_elem, translator)?;
            desc.candidates.push(candidate);
        }
        Ok(desc)
    }

    fn write_transport_description(
        &self,
        desc: &TransportDescription,
        translator: Option<&dyn CandidateTranslator>,
    ) -> Result<XmlElement> {
        let mut elem = XmlElement::new(transport_name());
        if !desc.ice_ufrag.is_empty() {
            elem.set_attr(ATTR_UFRAG, desc.ice_ufrag.as_str());
        }
        if !desc.ice_pwd.is_empty() {
            elem.set_attr(ATTR_PWD, desc.ice_pwd.as_str());
        }
        for candidate in &desc.candidates {
            elem.add_child(self.write_candidate(jingle_candidate_name(), candidate, translator)?);
        }
        Ok(elem)
    }

    fn parse_gingle_candidate(
        &self,
        elem: &XmlElement,
        translator: Option<&dyn CandidateTranslator>,
    ) -> Result<Candidate> {
        self.parse_candidate(IceProtocol::Google, elem, translator)
    }

    fn write_gingle_candidate(
        &self,
        candidate: &Candidate,
        translator: Option<&dyn CandidateTranslator>,
    ) -> Result<XmlElement> {
        self.write_candidate(gingle_candidate_name(), candidate, translator)
    }
}
