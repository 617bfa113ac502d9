use std::collections::BTreeMap;

use log::trace;

use super::{CandidateTranslator, TransportDescription};
use crate::candidate::{Candidate, Candidates};

/// The per-content transport placeholder a session keeps while the real
/// transport lives elsewhere.
///
/// It remembers which channels the content client created, which candidates
/// were already sent or are waiting for the initiate to be acked, and the
/// local and remote transport descriptions pushed down so far.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportProxy {
    content_name: String,
    transport_type: String,
    channels: BTreeMap<u16, String>,
    local_description: Option<TransportDescription>,
    remote_description: Option<TransportDescription>,
    sent_candidates: Candidates,
    unsent_candidates: Candidates,
}

impl TransportProxy {
    pub fn new(content_name: &str, transport_type: &str) -> Self {
        TransportProxy {
            content_name: content_name.to_owned(),
            transport_type: transport_type.to_owned(),
            channels: BTreeMap::new(),
            local_description: None,
            remote_description: None,
            sent_candidates: vec![],
            unsent_candidates: vec![],
        }
    }

    pub fn content_name(&self) -> &str {
        &self.content_name
    }

    pub fn transport_type(&self) -> &str {
        &self.transport_type
    }

    /// Registers a channel; a second call for the same component renames it.
    pub fn create_channel(&mut self, channel_name: &str, component: u16) {
        trace!(
            "[{}] channel {} for component {}",
            self.content_name, channel_name, component
        );
        self.channels.insert(component, channel_name.to_owned());
    }

    pub fn has_channel(&self, channel_name: &str) -> bool {
        self.channels.values().any(|name| name == channel_name)
    }

    pub fn channels(&self) -> impl Iterator<Item = (u16, &str)> {
        self.channels.iter().map(|(c, n)| (*c, n.as_str()))
    }

    pub fn local_description(&self) -> Option<&TransportDescription> {
        self.local_description.as_ref()
    }

    pub fn remote_description(&self) -> Option<&TransportDescription> {
        self.remote_description.as_ref()
    }

    pub(crate) fn set_local_description(&mut self, desc: TransportDescription) {
        self.local_description = Some(desc);
    }

    pub(crate) fn set_remote_description(&mut self, desc: TransportDescription) {
        self.remote_description = Some(desc);
    }

    /// Both sides have applied a transport description.
    pub fn negotiated(&self) -> bool {
        self.local_description.is_some() && self.remote_description.is_some()
    }

    pub fn sent_candidates(&self) -> &[Candidate] {
        &self.sent_candidates
    }

    pub fn unsent_candidates(&self) -> &[Candidate] {
        &self.unsent_candidates
    }

    pub(crate) fn add_sent_candidates(&mut self, candidates: &[Candidate]) {
        self.sent_candidates.extend_from_slice(candidates);
    }

    pub(crate) fn add_unsent_candidates(&mut self, candidates: &[Candidate]) {
        self.unsent_candidates.extend_from_slice(candidates);
    }

    pub(crate) fn clear_sent_candidates(&mut self) {
        self.sent_candidates.clear();
    }

    pub(crate) fn clear_unsent_candidates(&mut self) {
        self.unsent_candidates.clear();
    }
}

impl CandidateTranslator for TransportProxy {
    fn channel_name_from_component(&self, component: u16) -> Option<&str> {
        self.channels.get(&component).map(|name| name.as_str())
    }

    fn component_from_channel_name(&self, channel_name: &str) -> Option<u16> {
        self.channels
            .iter()
            .find(|(_, name)| *name == channel_name)
            .map(|(component, _)| *component)
    }
}
