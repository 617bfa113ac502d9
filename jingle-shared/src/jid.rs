#[cfg(test)]
mod jid_test;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An XMPP address: `[node@]domain[/resource]`.
///
/// Node and domain compare case-insensitively and are stored lowercased;
/// the resource is kept as given.
#[derive(Default, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Jid {
    node: String,
    domain: String,
    resource: String,
}

impl Jid {
    pub fn new(node: &str, domain: &str, resource: &str) -> Result<Self> {
        if domain.is_empty() {
            return Err(Error::ErrInvalidJid(format!("{node}@{domain}/{resource}")));
        }
        Ok(Jid {
            node: node.to_lowercase(),
            domain: domain.to_lowercase(),
            resource: resource.to_owned(),
        })
    }

    pub fn parse(s: &str) -> Result<Self> {
        let (bare, resource) = match s.split_once('/') {
            Some((bare, resource)) => (bare, resource),
            None => (s, ""),
        };
        let (node, domain) = match bare.split_once('@') {
            Some((node, domain)) => (node, domain),
            None => ("", bare),
        };
        if domain.is_empty() || domain.contains('@') || (s.contains('/') && resource.is_empty())
        {
            return Err(Error::ErrInvalidJid(s.to_owned()));
        }
        Jid::new(node, domain, resource)
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// The default Jid has no domain and addresses nobody.
    pub fn is_empty(&self) -> bool {
        self.domain.is_empty()
    }

    pub fn is_bare(&self) -> bool {
        self.resource.is_empty()
    }

    pub fn bare(&self) -> Jid {
        Jid {
            node: self.node.clone(),
            domain: self.domain.clone(),
            resource: String::new(),
        }
    }

    /// Two addresses share a bare identity when both are valid and their
    /// node and domain agree.
    pub fn bare_equals(&self, other: &Jid) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.node == other.node
            && self.domain == other.domain
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.node.is_empty() {
            write!(f, "{}@", self.node)?;
        }
        write!(f, "{}", self.domain)?;
        if !self.resource.is_empty() {
            write!(f, "/{}", self.resource)?;
        }
        Ok(())
    }
}

impl FromStr for Jid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Jid::parse(s)
    }
}

impl TryFrom<String> for Jid {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Jid::parse(&s)
    }
}

impl From<Jid> for String {
    fn from(jid: Jid) -> Self {
        jid.to_string()
    }
}
