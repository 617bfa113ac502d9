
pub mod message_error;
pub mod state;

use std::collections::{HashMap, VecDeque};

use log::{debug, error, trace, warn};
use shared::constants::*;
use shared::error::{Error, Result};
use shared::{Jid, XmlElement};
use task::protocol::make_iq_result;

use crate::candidate::Candidates;
use crate::constants::*;
use crate::content::{ContentInfos, ContentParser, ContentParserMap, SessionDescription};
use crate::message::*;
use crate::transport::proxy::TransportProxy;
use crate::transport::{
    CandidateTranslator, CandidateTranslatorMap, TransportDescription, TransportInfo,
    TransportInfos, TransportParserMap,
};
pub use message_error::{MessageError, StanzaErrorCondition};
pub use state::{ContentAction, ContentSource, SessionError, SessionState};

/// Notifications a session raises for its content client.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    Error(SessionError),
    /// The body of an inbound session-info, as received.
    InfoMessage(XmlElement),
    ReceivedTerminateReason(String),
    /// Updated remote contents from a description-info. They are not merged
    /// into the stored remote description.
    RemoteDescriptionUpdate(ContentInfos),
    TransportDescription {
        content_name: String,
        source: ContentSource,
        action: ContentAction,
        description: TransportDescription,
    },
    RemoteCandidates {
        content_name: String,
        candidates: Candidates,
    },
    /// Transports should start connecting.
    ConnectChannels,
    /// Both sides agreed to BUNDLE onto the transport of `content_name`.
    MuxEnabled { content_name: String },
}

/// Follow-up work queued by a state change or an error, run by
/// [`Session::run_pending`] once the current operation has returned.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Pending {
    StateChanged,
    Error,
}

/// One negotiation with one peer.
///
/// A session never touches the network. Outbound stanzas are queued and
/// drained with [`Session::poll_outgoing`]; notifications with
/// [`Session::poll_event`].
#[derive(Debug)]
pub struct Session {
    sid: String,
    local_name: String,
    initiator_name: String,
    remote_name: String,
    content_type: String,
    transport_type: String,
    initiator: bool,
    state: SessionState,
    error: SessionError,
    current_protocol: SignalingProtocol,
    initiate_acked: bool,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    proxies: Vec<TransportProxy>,
    transport_parsers: TransportParserMap,

    pending: VecDeque<Pending>,
    outgoing: VecDeque<XmlElement>,
    events: VecDeque<SessionEvent>,
}

impl Session {
    pub fn new(
        sid: &str,
        local_name: &str,
        initiator_name: &str,
        content_type: &str,
        protocol: SignalingProtocol,
    ) -> Self {
        Session {
            sid: sid.to_owned(),
            local_name: local_name.to_owned(),
            initiator_name: initiator_name.to_owned(),
            remote_name: String::new(),
            content_type: content_type.to_owned(),
            transport_type: NS_GINGLE_P2P.to_owned(),
            initiator: local_name == initiator_name,
            state: SessionState::Init,
            error: SessionError::None,
            current_protocol: protocol,
            initiate_acked: false,
            local_description: None,
            remote_description: None,
            proxies: vec![],
            transport_parsers: TransportParserMap::default(),
            pending: VecDeque::new(),
            outgoing: VecDeque::new(),
            events: VecDeque::new(),
        }
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn initiator_name(&self) -> &str {
        &self.initiator_name
    }

    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn transport_type(&self) -> &str {
        &self.transport_type
    }

    pub fn initiator(&self) -> bool {
        self.initiator
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn error(&self) -> SessionError {
        self.error
    }

    pub fn current_protocol(&self) -> SignalingProtocol {
        self.current_protocol
    }

    pub fn initiate_acked(&self) -> bool {
        self.initiate_acked
    }

    pub fn local_description(&self) -> Option<&SessionDescription> {
        self.local_description.as_ref()
    }

    pub fn remote_description(&self) -> Option<&SessionDescription> {
        self.remote_description.as_ref()
    }

    /// The description of whoever sent the initiate; transport-info is
    /// always resolved against it.
    pub fn initiator_description(&self) -> Option<&SessionDescription> {
        if self.initiator {
            self.local_description.as_ref()
        } else {
            self.remote_description.as_ref()
        }
    }

    pub fn proxy(&self, content_name: &str) -> Option<&TransportProxy> {
        self.proxies
            .iter()
            .find(|proxy| proxy.content_name() == content_name)
    }

    pub fn proxies(&self) -> &[TransportProxy] {
        &self.proxies
    }

    pub fn poll_outgoing(&mut self) -> Option<XmlElement> {
        self.outgoing.pop_front()
    }

    pub fn poll_event(&mut self) -> Option<SessionEvent> {
        self.events.pop_front()
    }

    /// Registers a channel of a content, creating its transport proxy on
    /// demand. Content clients do this before candidates can be translated.
    pub fn create_channel(&mut self, content_name: &str, channel_name: &str, component: u16) {
        self.get_or_create_proxy(content_name)
            .create_channel(channel_name, component);
    }

    /// Offers `sdesc` to `to`.
    pub fn initiate(
        &mut self,
        to: &str,
        sdesc: SessionDescription,
        parser: &dyn ContentParser,
    ) -> Result<()> {
        if self.state != SessionState::Init {
            return Err(self.invalid_state("initiate"));
        }

        let tinfos = sdesc.empty_transport_infos(&self.transport_type);
        let proxies = self.proxies.clone();
        let remote_name = std::mem::replace(&mut self.remote_name, to.to_owned());
        self.local_description = Some(sdesc);
        if let Err(err) = self
            .create_transport_proxies(&tinfos)
            .and_then(|_| self.send_initiate_message(parser))
        {
            // nothing of a refused offer stays behind
            self.remote_name = remote_name;
            self.local_description = None;
            self.proxies = proxies;
            return Err(err);
        }

        // Connect before the answer so early remote candidates can be used.
        self.events.push_back(SessionEvent::ConnectChannels);
        self.pushdown_local_transport_description(ContentAction::Offer);
        self.set_state(SessionState::SentInitiate);
        Ok(())
    }

    /// Answers a received initiate with `sdesc`.
    pub fn accept(&mut self, sdesc: SessionDescription, parser: &dyn ContentParser) -> Result<()> {
        if self.state != SessionState::ReceivedInitiate {
            return Err(self.invalid_state("accept"));
        }

        let accept = SessionAccept {
            contents: sdesc.contents.clone(),
            transports: sdesc.empty_transport_infos(&self.transport_type),
            groups: sdesc.groups.clone(),
        };
        self.local_description = Some(sdesc);
        self.send_action(ActionType::SessionAccept, Some(parser), |codec, cx| {
            codec.write_session_accept(&accept, cx)
        })?;

        self.pushdown_local_transport_description(ContentAction::Answer);
        self.events.push_back(SessionEvent::ConnectChannels);
        self.maybe_enable_muxing_support();
        self.set_state(SessionState::SentAccept);
        Ok(())
    }

    pub fn reject(&mut self, reason: &str) -> Result<()> {
        if self.state != SessionState::ReceivedInitiate {
            return Err(self.invalid_state("reject"));
        }

        let term = SessionTerminate::new(reason);
        self.send_action(ActionType::SessionReject, None, |codec, _| {
            Ok(codec.write_session_terminate(&term))
        })?;
        self.set_state(SessionState::SentReject);
        Ok(())
    }

    pub fn terminate(&mut self) -> Result<()> {
        self.terminate_with_reason(STR_TERMINATE_SUCCESS)
    }

    /// Ends the session from any state. A reject already ended it on the wire,
    /// and a session that never had a peer has nobody to tell.
    pub fn terminate_with_reason(&mut self, reason: &str) -> Result<()> {
        match self.state {
            SessionState::SentTerminate
            | SessionState::ReceivedTerminate
            | SessionState::Deinit => return Err(Error::ErrSessionAlreadyTerminated),
            SessionState::SentReject | SessionState::ReceivedReject => {}
            _ if self.remote_name.is_empty() => {
                debug!("[{}] terminating without a remote, nothing sent", self.sid);
            }
            _ => {
                let term = SessionTerminate::new(reason);
                self.send_action(ActionType::SessionTerminate, None, |codec, _| {
                    Ok(codec.write_session_terminate(&term))
                })?;
            }
        }

        self.set_state(SessionState::SentTerminate);
        Ok(())
    }

    /// Sends an application defined session-info payload.
    pub fn send_info_message(&mut self, elems: Vec<XmlElement>) -> Result<()> {
        self.send_raw(ActionType::SessionInfo, elems)
    }

    pub fn send_description_info_message(
        &mut self,
        contents: &[crate::content::ContentInfo],
        parser: &dyn ContentParser,
    ) -> Result<()> {
        let codec = dialect_codec(self.current_protocol);
        let elems =
            self.with_codec_context(Some(parser), |cx| codec.write_description_info(contents, cx))?;
        self.send_raw(ActionType::DescriptionInfo, elems)
    }

    /// Hands locally gathered candidates of one content to the session.
    ///
    /// An initiator holds them back until its initiate is acknowledged, so a
    /// relay that reorders stanzas cannot deliver them ahead of the offer.
    pub fn on_candidates_ready(&mut self, content_name: &str, candidates: Candidates) -> Result<()> {
        let hold_back = self.initiator && !self.initiate_acked;
        let proxy = self
            .proxy_mut(content_name)
            .ok_or_else(|| Error::ErrUnknownContentName(content_name.to_owned()))?;

        if hold_back {
            trace!(
                "[{}] holding {} candidates until the initiate is acked",
                content_name,
                candidates.len()
            );
            proxy.add_unsent_candidates(&candidates);
            return Ok(());
        }

        let record = !proxy.negotiated();
        let tinfo = TransportInfo::new(
            content_name,
            TransportDescription::new(proxy.transport_type(), candidates.clone()),
        );
        self.send_transport_info(tinfo)?;

        if record {
            if let Some(proxy) = self.proxy_mut(content_name) {
                proxy.add_sent_candidates(&candidates);
            }
        }
        Ok(())
    }

    /// Handles one inbound action for this session. On success the ack is
    /// queued; on failure the caller answers with the returned error.
    pub fn on_incoming_message(
        &mut self,
        msg: &SessionMessage,
        parser: &dyn ContentParser,
    ) -> std::result::Result<(), MessageError> {
        if self.current_protocol == SignalingProtocol::Hybrid {
            self.current_protocol = if msg.protocol == SignalingProtocol::Gingle {
                SignalingProtocol::Gingle
            } else {
                SignalingProtocol::Jingle
            };
            debug!("[{}] peer speaks {}", self.sid, self.current_protocol);
        }

        match msg.action {
            ActionType::SessionInitiate => self.on_initiate_message(msg, parser)?,
            ActionType::SessionInfo => self.on_info_message(msg),
            ActionType::SessionAccept => self.on_accept_message(msg, parser)?,
            ActionType::SessionReject => self.on_reject_message()?,
            ActionType::SessionTerminate => self.on_terminate_message(msg),
            ActionType::TransportInfo => self.on_transport_info_message(msg)?,
            ActionType::TransportAccept => {}
            ActionType::DescriptionInfo => self.on_description_info_message(msg, parser)?,
        }

        self.outgoing.push_back(make_iq_result(&msg.stanza));
        Ok(())
    }

    /// The peer acknowledged `orig_stanza`.
    pub fn on_incoming_response(&mut self, orig_stanza: &XmlElement) {
        match parse_session_message(orig_stanza) {
            Ok(msg) if msg.action == ActionType::SessionInitiate => self.on_initiate_acked(),
            Ok(_) => {}
            Err(err) => debug!("[{}] response to an unparsable stanza: {}", self.sid, err),
        }
    }

    /// `orig_stanza` failed with `error_stanza`, a real error reply or one
    /// synthesized for a timeout.
    pub fn on_failed_send(
        &mut self,
        orig_stanza: &XmlElement,
        error_stanza: &XmlElement,
        parser: &dyn ContentParser,
    ) {
        let msg = match parse_session_message(orig_stanza) {
            Ok(msg) => msg,
            Err(err) => {
                error!("[{}] error parsing failed send: {}", self.sid, err);
                return;
            }
        };

        if let Some(target) = find_session_redirect(error_stanza) {
            if let Err(err) = self.on_redirect_error(&target, parser) {
                error!("[{}] failed to redirect: {}", self.sid, err);
                self.set_error(SessionError::Response);
            }
            return;
        }

        let Some(error_elem) = child_by_local(error_stanza, STR_ERROR) else {
            error!("[{}] session error without <error/> element, ignoring", self.sid);
            return;
        };
        let error_type = error_elem.attr(ATTR_TYPE).unwrap_or_default();
        error!(
            "[{}] session error ({}) in response to {}",
            self.sid, error_type, msg.action
        );

        if msg.action == ActionType::TransportInfo {
            // a lost candidate shows up as a connectivity failure later
            debug!("[{}] ignoring failed transport-info", self.sid);
        } else if error_type != ERROR_TYPE_CONTINUE && error_type != ERROR_TYPE_WAIT {
            self.set_error(SessionError::Response);
        }
    }

    /// Runs the follow-ups of state changes and errors. Returns true once the
    /// session has terminated and should be destroyed.
    pub fn run_pending(&mut self) -> bool {
        let mut destroy = false;
        while let Some(pending) = self.pending.pop_front() {
            match pending {
                Pending::Error => {
                    if let Err(err) = self.terminate_with_reason(STR_TERMINATE_ERROR) {
                        debug!("[{}] error after termination: {}", self.sid, err);
                    }
                }
                Pending::StateChanged => match self.state {
                    SessionState::SentAccept | SessionState::ReceivedAccept => {
                        self.set_state(SessionState::InProgress)
                    }
                    SessionState::SentReject | SessionState::ReceivedReject => {
                        // a reject already ended the session on the wire
                        if let Err(err) = self.terminate() {
                            debug!("[{}] terminate after reject: {}", self.sid, err);
                        }
                    }
                    SessionState::SentTerminate | SessionState::ReceivedTerminate => {
                        destroy = true
                    }
                    _ => {}
                },
            }
        }
        destroy
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        if state != self.state {
            debug!("[{}] {} -> {}", self.sid, self.state, state);
            self.state = state;
            self.events.push_back(SessionEvent::StateChanged(state));
            self.pending.push_back(Pending::StateChanged);
        }
    }

    pub fn set_error(&mut self, error: SessionError) {
        if error != self.error {
            self.error = error;
            self.events.push_back(SessionEvent::Error(error));
            if error != SessionError::None {
                self.pending.push_back(Pending::Error);
            }
        }
    }

    fn invalid_state(&self, operation: &str) -> Error {
        Error::ErrSessionInvalidState {
            operation: operation.to_owned(),
            state: self.state.to_string(),
        }
    }

    fn check_state(&self, expected: SessionState) -> std::result::Result<(), MessageError> {
        if self.state != expected {
            // duplicated and reordered deliveries end up here
            return Err(MessageError::not_allowed(
                "message not allowed in current state",
            ));
        }
        Ok(())
    }

    fn on_initiate_message(
        &mut self,
        msg: &SessionMessage,
        parser: &dyn ContentParser,
    ) -> std::result::Result<(), MessageError> {
        self.check_state(SessionState::Init)?;

        let codec = dialect_codec(msg.protocol);
        let init =
            self.with_codec_context(Some(parser), |cx| codec.parse_session_initiate(&msg.action_elem, cx))?;
        self.create_transport_proxies(&init.transports)
            .map_err(|err| MessageError::not_acceptable(err.to_string()))?;

        self.remote_name = msg.from.clone();
        self.initiator_name = msg.initiator.clone();
        self.initiator = self.local_name == self.initiator_name;
        let transports = init.transports.clone();
        self.remote_description = Some(SessionDescription::new(
            init.contents,
            init.transports,
            init.groups,
        ));
        self.pushdown_remote_transport_description(ContentAction::Offer);
        self.set_state(SessionState::ReceivedInitiate);

        self.on_remote_candidates(&transports)?;
        Ok(())
    }

    fn on_accept_message(
        &mut self,
        msg: &SessionMessage,
        parser: &dyn ContentParser,
    ) -> std::result::Result<(), MessageError> {
        self.check_state(SessionState::SentInitiate)?;

        let codec = dialect_codec(msg.protocol);
        let accept =
            self.with_codec_context(Some(parser), |cx| codec.parse_session_accept(&msg.action_elem, cx))?;

        // The peer would not accept an initiate it never got.
        self.on_initiate_acked();

        let transports = accept.transports.clone();
        self.remote_description = Some(SessionDescription::new(
            accept.contents,
            accept.transports,
            accept.groups,
        ));
        self.pushdown_remote_transport_description(ContentAction::Answer);
        self.maybe_enable_muxing_support();
        self.set_state(SessionState::ReceivedAccept);

        self.on_remote_candidates(&transports)?;
        Ok(())
    }

    fn on_reject_message(&mut self) -> std::result::Result<(), MessageError> {
        self.check_state(SessionState::SentInitiate)?;
        self.set_state(SessionState::ReceivedReject);
        Ok(())
    }

    fn on_info_message(&mut self, msg: &SessionMessage) {
        self.events
            .push_back(SessionEvent::InfoMessage(msg.action_elem.clone()));
    }

    fn on_terminate_message(&mut self, msg: &SessionMessage) {
        let term = dialect_codec(msg.protocol).parse_session_terminate(&msg.action_elem);
        if !term.debug_reason.is_empty() {
            debug!("[{}] received error on call: {}", self.sid, term.debug_reason);
        }
        self.events
            .push_back(SessionEvent::ReceivedTerminateReason(term.reason));
        self.set_state(SessionState::ReceivedTerminate);
    }

    fn on_transport_info_message(
        &mut self,
        msg: &SessionMessage,
    ) -> std::result::Result<(), MessageError> {
        let contents = match self.initiator_description() {
            Some(desc) => desc.contents.clone(),
            None => {
                return Err(MessageError::not_allowed(
                    "message not allowed in current state",
                ));
            }
        };

        let codec = dialect_codec(msg.protocol);
        let tinfos = self.with_codec_context(None, |cx| {
            codec.parse_transport_infos(&msg.action_elem, &contents, cx)
        })?;
        self.on_remote_candidates(&tinfos)?;
        Ok(())
    }

    fn on_description_info_message(
        &mut self,
        msg: &SessionMessage,
        parser: &dyn ContentParser,
    ) -> std::result::Result<(), MessageError> {
        self.check_state(SessionState::InProgress)?;

        let codec = dialect_codec(msg.protocol);
        let contents = self
            .with_codec_context(Some(parser), |cx| codec.parse_description_info(&msg.action_elem, cx))?;
        self.events
            .push_back(SessionEvent::RemoteDescriptionUpdate(contents));
        Ok(())
    }

    fn on_redirect_error(&mut self, target: &str, parser: &dyn ContentParser) -> Result<()> {
        if self.state != SessionState::SentInitiate {
            return Err(self.invalid_state("redirect"));
        }

        match (Jid::parse(&self.remote_name), Jid::parse(target)) {
            (Ok(remote), Ok(target)) if remote.bare_equals(&target) => {}
            _ => {
                return Err(Error::ErrRedirectNotAllowed(
                    "must be the same bare jid.".to_owned(),
                ));
            }
        }

        debug!("[{}] redirected from {} to {}", self.sid, self.remote_name, target);
        self.remote_name = target.to_owned();
        self.send_initiate_message(parser)?;
        self.resend_all_transport_infos()
    }

    fn on_initiate_acked(&mut self) {
        if self.initiate_acked {
            return;
        }
        self.initiate_acked = true;
        if let Err(err) = self.send_all_unsent_transport_infos() {
            error!("[{}] could not send unsent transport info messages: {}", self.sid, err);
        }
    }

    fn on_remote_candidates(&mut self, tinfos: &TransportInfos) -> Result<()> {
        for tinfo in tinfos {
            if self.proxy(&tinfo.content_name).is_none() {
                return Err(Error::ErrUnknownContentName(tinfo.content_name.clone()));
            }
            if !tinfo.description.candidates.is_empty() {
                self.events.push_back(SessionEvent::RemoteCandidates {
                    content_name: tinfo.content_name.clone(),
                    candidates: tinfo.description.candidates.clone(),
                });
            }
        }
        Ok(())
    }

    fn create_transport_proxies(&mut self, tinfos: &TransportInfos) -> Result<()> {
        for tinfo in tinfos {
            if tinfo.description.transport_type != self.transport_type {
                return Err(Error::ErrUnsupportedTransport(
                    tinfo.description.transport_type.clone(),
                ));
            }
            self.get_or_create_proxy(&tinfo.content_name);
        }
        Ok(())
    }

    fn get_or_create_proxy(&mut self, content_name: &str) -> &mut TransportProxy {
        let index = match self
            .proxies
            .iter()
            .position(|proxy| proxy.content_name() == content_name)
        {
            Some(index) => index,
            None => {
                self.proxies
                    .push(TransportProxy::new(content_name, &self.transport_type));
                self.proxies.len() - 1
            }
        };
        &mut self.proxies[index]
    }

    fn proxy_mut(&mut self, content_name: &str) -> Option<&mut TransportProxy> {
        self.proxies
            .iter_mut()
            .find(|proxy| proxy.content_name() == content_name)
    }

    fn pushdown_local_transport_description(&mut self, action: ContentAction) {
        let Some(sdesc) = self.local_description.as_ref() else {
            return;
        };
        for proxy in self.proxies.iter_mut() {
            let description = match sdesc.transport_info(proxy.content_name()) {
                Some(tinfo) => tinfo.description.clone(),
                None if sdesc.content(proxy.content_name()).is_some() => {
                    TransportDescription::new(&self.transport_type, vec![])
                }
                None => continue,
            };
            proxy.set_local_description(description.clone());
            self.events.push_back(SessionEvent::TransportDescription {
                content_name: proxy.content_name().to_owned(),
                source: ContentSource::Local,
                action,
                description,
            });
        }
    }

    fn pushdown_remote_transport_description(&mut self, action: ContentAction) {
        let Some(sdesc) = self.remote_description.as_ref() else {
            return;
        };
        for proxy in self.proxies.iter_mut() {
            let Some(tinfo) = sdesc.transport_info(proxy.content_name()) else {
                continue;
            };
            proxy.set_remote_description(tinfo.description.clone());
            self.events.push_back(SessionEvent::TransportDescription {
                content_name: proxy.content_name().to_owned(),
                source: ContentSource::Remote,
                action,
                description: tinfo.description.clone(),
            });
        }
    }

    fn maybe_enable_muxing_support(&mut self) {
        let (Some(local), Some(remote)) = (&self.local_description, &self.remote_description)
        else {
            return;
        };

        let bundle = match (local.group(GROUP_TYPE_BUNDLE), remote.group(GROUP_TYPE_BUNDLE)) {
            (Some(local_group), Some(_)) => local_group.content_names.first().cloned(),
            _ => None,
        };
        match bundle {
            Some(content_name) => {
                debug!("[{}] enabling BUNDLE onto transport: {}", self.sid, content_name);
                self.events
                    .push_back(SessionEvent::MuxEnabled { content_name });
            }
            None => trace!("[{}] no BUNDLE information, not bundling", self.sid),
        }
    }

    fn send_initiate_message(&mut self, parser: &dyn ContentParser) -> Result<()> {
        let init = match &self.local_description {
            Some(sdesc) => SessionInitiate {
                contents: sdesc.contents.clone(),
                transports: sdesc.empty_transport_infos(&self.transport_type),
                groups: sdesc.groups.clone(),
            },
            None => return Err(self.invalid_state("initiate")),
        };
        self.send_action(ActionType::SessionInitiate, Some(parser), |codec, cx| {
            codec.write_session_initiate(&init, cx)
        })
    }

    fn send_transport_info(&mut self, tinfo: TransportInfo) -> Result<()> {
        let tinfos = vec![tinfo];
        self.send_action(ActionType::TransportInfo, None, |codec, cx| {
            codec.write_transport_infos(&tinfos, cx)
        })
    }

    fn send_all_unsent_transport_infos(&mut self) -> Result<()> {
        for index in 0..self.proxies.len() {
            let proxy = &self.proxies[index];
            if proxy.unsent_candidates().is_empty() {
                continue;
            }
            let candidates = proxy.unsent_candidates().to_vec();
            let tinfo = TransportInfo::new(
                proxy.content_name(),
                TransportDescription::new(proxy.transport_type(), candidates.clone()),
            );
            self.send_transport_info(tinfo)?;

            let proxy = &mut self.proxies[index];
            proxy.clear_unsent_candidates();
            if !proxy.negotiated() {
                proxy.add_sent_candidates(&candidates);
            }
        }
        Ok(())
    }

    fn resend_all_transport_infos(&mut self) -> Result<()> {
        for index in 0..self.proxies.len() {
            let proxy = &self.proxies[index];
            if proxy.sent_candidates().is_empty() {
                continue;
            }
            let tinfo = TransportInfo::new(
                proxy.content_name(),
                TransportDescription::new(proxy.transport_type(), proxy.sent_candidates().to_vec()),
            );
            self.send_transport_info(tinfo)?;
            self.proxies[index].clear_sent_candidates();
        }
        Ok(())
    }

    fn with_codec_context<T>(
        &self,
        parser: Option<&dyn ContentParser>,
        f: impl FnOnce(&CodecContext<'_>) -> T,
    ) -> T {
        let mut content_parsers: ContentParserMap<'_> = HashMap::new();
        if let Some(parser) = parser {
            content_parsers.insert(self.content_type.clone(), parser);
        }
        let translators: CandidateTranslatorMap<'_> = self
            .proxies
            .iter()
            .map(|proxy| {
                (
                    proxy.content_name().to_owned(),
                    proxy as &dyn CandidateTranslator,
                )
            })
            .collect();

        let cx = CodecContext {
            content_parsers: &content_parsers,
            transport_parsers: &self.transport_parsers,
            translators: &translators,
        };
        f(&cx)
    }

    /// Writes `action` in every dialect the session currently speaks into one
    /// stanza. A dialect without a form for the action is skipped.
    fn build_action<F>(
        &self,
        action: ActionType,
        parser: Option<&dyn ContentParser>,
        write: F,
    ) -> Result<XmlElement>
    where
        F: Fn(&dyn DialectCodec, &CodecContext<'_>) -> Result<Vec<XmlElement>>,
    {
        self.with_codec_context(parser, |cx| {
            let mut stanza = XmlElement::new(iq_name());
            let mut written = false;
            for &protocol in write_dialects(self.current_protocol) {
                let codec = dialect_codec(protocol);
                if codec.action_name(action).is_none() {
                    continue;
                }
                let elems = write(codec, cx)?;
                let msg = SessionMessage::new(
                    protocol,
                    action,
                    &self.sid,
                    &self.initiator_name,
                    &self.remote_name,
                );
                write_session_message(&msg, elems, &mut stanza);
                written = true;
            }
            if !written {
                return Err(Error::ErrGingleUnsupportedAction(action.to_string()));
            }
            Ok(stanza)
        })
    }

    fn send_action<F>(
        &mut self,
        action: ActionType,
        parser: Option<&dyn ContentParser>,
        write: F,
    ) -> Result<()>
    where
        F: Fn(&dyn DialectCodec, &CodecContext<'_>) -> Result<Vec<XmlElement>>,
    {
        let stanza = self.build_action(action, parser, write)?;
        trace!("[{}] sending {} to {}", self.sid, action, self.remote_name);
        self.outgoing.push_back(stanza);
        Ok(())
    }

    /// Sends elements that are already in the session's dialect.
    fn send_raw(&mut self, action: ActionType, elems: Vec<XmlElement>) -> Result<()> {
        if self.remote_name.is_empty() {
            return Err(Error::ErrNoRemoteName);
        }
        if self.state.is_terminated() {
            warn!("[{}] {} after termination, dropped", self.sid, action);
            return Err(Error::ErrSessionAlreadyTerminated);
        }

        let mut stanza = XmlElement::new(iq_name());
        let msg = SessionMessage::new(
            self.current_protocol,
            action,
            &self.sid,
            &self.initiator_name,
            &self.remote_name,
        );
        write_session_message(&msg, elems, &mut stanza);
        self.outgoing.push_back(stanza);
        Ok(())
    }
}
