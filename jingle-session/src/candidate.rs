
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use shared::error::{Error, Result};

/// Represents the type of candidate `CandidateType` enum.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandidateType {
    #[default]
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "stun")]
    Stun,
    #[serde(rename = "prflx")]
    PeerReflexive,
    #[serde(rename = "relay")]
    Relay,
}

const CANDIDATE_TYPE_LOCAL_STR: &str = "local";
const CANDIDATE_TYPE_STUN_STR: &str = "stun";
const CANDIDATE_TYPE_PRFLX_STR: &str = "prflx";
const CANDIDATE_TYPE_RELAY_STR: &str = "relay";

impl fmt::Display for CandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            CandidateType::Local => CANDIDATE_TYPE_LOCAL_STR,
            CandidateType::Stun => CANDIDATE_TYPE_STUN_STR,
            CandidateType::PeerReflexive => CANDIDATE_TYPE_PRFLX_STR,
            CandidateType::Relay => CANDIDATE_TYPE_RELAY_STR,
        };
        write!(f, "{s}")
    }
}

impl FromStr for CandidateType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            CANDIDATE_TYPE_LOCAL_STR => Ok(CandidateType::Local),
            CANDIDATE_TYPE_STUN_STR => Ok(CandidateType::Stun),
            CANDIDATE_TYPE_PRFLX_STR => Ok(CandidateType::PeerReflexive),
            CANDIDATE_TYPE_RELAY_STR => Ok(CandidateType::Relay),
            _ => Err(Error::ErrInvalidAttribute {
                name: "type".to_owned(),
                value: s.to_owned(),
            }),
        }
    }
}

/// The transport protocol a candidate is reachable over.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandidateProtocol {
    #[default]
    #[serde(rename = "udp")]
    Udp,
    #[serde(rename = "tcp")]
    Tcp,
    #[serde(rename = "ssltcp")]
    SslTcp,
}

const PROTOCOL_UDP_STR: &str = "udp";
const PROTOCOL_TCP_STR: &str = "tcp";
const PROTOCOL_SSLTCP_STR: &str = "ssltcp";

impl fmt::Display for CandidateProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            CandidateProtocol::Udp => PROTOCOL_UDP_STR,
            CandidateProtocol::Tcp => PROTOCOL_TCP_STR,
            CandidateProtocol::SslTcp => PROTOCOL_SSLTCP_STR,
        };
        write!(f, "{s}")
    }
}

impl FromStr for CandidateProtocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            PROTOCOL_UDP_STR => Ok(CandidateProtocol::Udp),
            PROTOCOL_TCP_STR => Ok(CandidateProtocol::Tcp),
            PROTOCOL_SSLTCP_STR => Ok(CandidateProtocol::SslTcp),
            _ => Err(Error::ErrInvalidAttribute {
                name: "protocol".to_owned(),
                value: s.to_owned(),
            }),
        }
    }
}

/// One reachable network path proposed for a content's transport.
///
/// Candidates are produced and consumed by the connectivity layer; signaling
/// only carries them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub component: u16,
    pub address: SocketAddr,
    pub protocol: CandidateProtocol,
    pub username: String,
    pub password: String,
    /// Relative weight in `0.0..=1.0`.
    pub preference: f32,
    #[serde(rename = "type")]
    pub candidate_type: CandidateType,
    pub generation: u32,
    pub network_name: String,
}

impl Default for Candidate {
    fn default() -> Self {
        Candidate {
            component: 0,
            address: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            protocol: CandidateProtocol::default(),
            username: String::new(),
            password: String::new(),
            preference: 0.0,
            candidate_type: CandidateType::default(),
            generation: 0,
            network_name: String::new(),
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} component {} gen {}",
            self.protocol, self.candidate_type, self.address, self.component, self.generation
        )
    }
}

impl Candidate {
    /// The preference as written on the wire: at most three decimals, no
    /// trailing zeros.
    pub fn preference_str(&self) -> String {
        let s = format!("{:.3}", self.preference);
        let s = s.trim_end_matches('0').trim_end_matches('.');
        if s.is_empty() { "0".to_owned() } else { s.to_owned() }
    }
}

pub type Candidates = Vec<Candidate>;
