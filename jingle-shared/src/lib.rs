#![warn(rust_2018_idioms)]

pub mod constants;
pub mod error;
pub mod jid;
pub mod xml;

use std::time::Instant;

pub use jid::Jid;
pub use xml::{QName, XmlElement, XmlNode};

/// A stanza together with the time it was read or should be written.
#[derive(Debug, Clone, PartialEq)]
pub struct StanzaMessage {
    pub now: Instant,
    pub stanza: XmlElement,
}

impl StanzaMessage {
    pub fn new(now: Instant, stanza: XmlElement) -> Self {
        Self { now, stanza }
    }
}
