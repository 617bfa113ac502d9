
use std::collections::{HashMap, VecDeque};

use log::{debug, trace, warn};
use shared::constants::*;
use shared::error::{Error, Result};
use shared::{Jid, QName, XmlElement};

use crate::content::{ContentParser, SessionDescription};
use crate::message::*;
use crate::session::{MessageError, Session, SessionEvent, SessionState};

/// The owner of one content type, such as a voice or file-share client.
///
/// A client parses the descriptions of its type and is told about every
/// session of that type, so it can create channels before the peer starts
/// probing connectivity.
pub trait SessionClient {
    fn content_parser(&self) -> &dyn ContentParser;

    /// Called once per session, before it handles its first message.
    fn on_session_create(&mut self, session: &mut Session, received: bool);

    fn on_session_destroy(&mut self, session: &Session);
}

/// Configuration of a [`SessionManager`].
#[derive(Default, Debug, Copy, Clone)]
pub struct SessionManagerConfig {
    /// Dialect new sessions start in. The default, hybrid, writes both until
    /// the peer answers.
    pub initial_protocol: SignalingProtocol,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionManagerEvent {
    SessionCreated { sid: String, received: bool },
    SessionDestroyed { sid: String },
    Session { sid: String, event: SessionEvent },
}

/// Registry of sessions and content clients, and router of session stanzas.
pub struct SessionManager {
    config: SessionManagerConfig,
    clients: HashMap<String, Box<dyn SessionClient>>,
    sessions: HashMap<String, Session>,

    outgoing: VecDeque<XmlElement>,
    events: VecDeque<SessionManagerEvent>,
}

impl Default for SessionManager {
    fn default() -> Self {
        SessionManager::new(SessionManagerConfig::default())
    }
}

impl SessionManager {
    pub fn new(config: SessionManagerConfig) -> Self {
        SessionManager {
            config,
            clients: HashMap::new(),
            sessions: HashMap::new(),
            outgoing: VecDeque::new(),
            events: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &SessionManagerConfig {
        &self.config
    }

    /// Registers the client owning `content_type`, replacing any previous one.
    pub fn add_client(&mut self, content_type: &str, client: Box<dyn SessionClient>) {
        if self.clients.insert(content_type.to_owned(), client).is_some() {
            warn!("replaced session client for {content_type}");
        }
    }

    pub fn remove_client(&mut self, content_type: &str) -> Option<Box<dyn SessionClient>> {
        self.clients.remove(content_type)
    }

    pub fn get_client(&self, content_type: &str) -> Option<&dyn SessionClient> {
        self.clients.get(content_type).map(|client| client.as_ref())
    }

    pub fn get_client_mut(&mut self, content_type: &str) -> Option<&mut (dyn SessionClient + 'static)> {
        self.clients.get_mut(content_type).map(|client| client.as_mut())
    }

    /// Creates an outbound session with a random id and returns the id.
    pub fn create_session(&mut self, local_name: &str, content_type: &str) -> Result<String> {
        let sid = rand::random::<u64>().to_string();
        self.create_session_with_id(&sid, local_name, content_type)?;
        Ok(sid)
    }

    pub fn create_session_with_id(
        &mut self,
        sid: &str,
        local_name: &str,
        content_type: &str,
    ) -> Result<()> {
        self.create_session_internal(local_name, local_name, sid, content_type, false)
    }

    fn create_session_internal(
        &mut self,
        local_name: &str,
        initiator_name: &str,
        sid: &str,
        content_type: &str,
        received: bool,
    ) -> Result<()> {
        if self.sessions.contains_key(sid) {
            return Err(Error::ErrSessionExists(sid.to_owned()));
        }
        let client = self
            .clients
            .get_mut(content_type)
            .ok_or_else(|| Error::ErrUnknownClient(content_type.to_owned()))?;

        let mut session = Session::new(
            sid,
            local_name,
            initiator_name,
            content_type,
            self.config.initial_protocol,
        );
        debug!("[{sid}] created {content_type} session, received: {received}");
        self.events.push_back(SessionManagerEvent::SessionCreated {
            sid: sid.to_owned(),
            received,
        });
        client.on_session_create(&mut session, received);
        self.sessions.insert(sid.to_owned(), session);
        self.flush(sid);
        Ok(())
    }

    /// Removes a session and tells its client. Destroying an unknown session
    /// does nothing.
    pub fn destroy_session(&mut self, sid: &str) {
        let Some(mut session) = self.sessions.remove(sid) else {
            return;
        };
        session.set_state(SessionState::Deinit);
        while let Some(event) = session.poll_event() {
            self.events.push_back(SessionManagerEvent::Session {
                sid: sid.to_owned(),
                event,
            });
        }
        if let Some(client) = self.clients.get_mut(session.content_type()) {
            client.on_session_destroy(&session);
        }
        debug!("[{sid}] destroyed");
        self.events.push_back(SessionManagerEvent::SessionDestroyed {
            sid: sid.to_owned(),
        });
    }

    pub fn get_session(&self, sid: &str) -> Option<&Session> {
        self.sessions.get(sid)
    }

    /// The session `sid` if it talks to `remote_name`.
    pub fn find_session(&self, sid: &str, remote_name: &str) -> Option<&Session> {
        self.sessions
            .get(sid)
            .filter(|session| same_jid(session.remote_name(), remote_name))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Runs `f` on a session with the content parser of its client, then
    /// forwards what the session queued and destroys it if it terminated.
    pub fn with_session<T>(
        &mut self,
        sid: &str,
        f: impl FnOnce(&mut Session, &dyn ContentParser) -> Result<T>,
    ) -> Result<T> {
        let result = {
            let session = self
                .sessions
                .get_mut(sid)
                .ok_or_else(|| Error::ErrSessionNotFound(sid.to_owned()))?;
            let client = self
                .clients
                .get(session.content_type())
                .ok_or_else(|| Error::ErrUnknownClient(session.content_type().to_owned()))?;
            f(session, client.content_parser())
        };
        self.flush(sid);
        result
    }

    pub fn initiate(&mut self, sid: &str, to: &str, sdesc: SessionDescription) -> Result<()> {
        self.with_session(sid, |session, parser| session.initiate(to, sdesc, parser))
    }

    pub fn accept(&mut self, sid: &str, sdesc: SessionDescription) -> Result<()> {
        self.with_session(sid, |session, parser| session.accept(sdesc, parser))
    }

    pub fn reject(&mut self, sid: &str, reason: &str) -> Result<()> {
        self.with_session(sid, |session, _| session.reject(reason))
    }

    pub fn terminate(&mut self, sid: &str, reason: &str) -> Result<()> {
        self.with_session(sid, |session, _| session.terminate_with_reason(reason))
    }

    pub fn send_info(&mut self, sid: &str, elems: Vec<XmlElement>) -> Result<()> {
        self.with_session(sid, |session, _| session.send_info_message(elems))
    }

    pub fn candidates_ready(
        &mut self,
        sid: &str,
        content_name: &str,
        candidates: crate::candidate::Candidates,
    ) -> Result<()> {
        self.with_session(sid, |session, _| {
            session.on_candidates_ready(content_name, candidates)
        })
    }

    /// Terminates and destroys every session.
    pub fn terminate_all(&mut self) {
        let sids: Vec<String> = self.sessions.keys().cloned().collect();
        for sid in sids {
            if let Err(err) = self.with_session(&sid, |session, _| session.terminate()) {
                debug!("[{sid}] terminate: {err}");
            }
            self.destroy_session(&sid);
        }
    }

    /// Routes an inbound session stanza, answering it with an error when no
    /// session can take it.
    pub fn on_incoming_message(&mut self, stanza: &XmlElement) {
        let msg = match parse_session_message(stanza) {
            Ok(msg) => msg,
            Err(err) => {
                self.send_error_message(stanza, &MessageError::bad_request(err.to_string()));
                return;
            }
        };

        if self.find_session(&msg.sid, &msg.from).is_some() {
            self.dispatch_message(&msg);
            return;
        }
        if msg.action != ActionType::SessionInitiate {
            self.send_error_message(stanza, &MessageError::bad_request("unknown session"));
            return;
        }

        let content_type = match parse_content_type(msg.protocol, &msg.action_elem) {
            Ok(content_type) => content_type,
            Err(err) => {
                self.send_error_message(stanza, &MessageError::bad_request(err.to_string()));
                return;
            }
        };
        if !self.clients.contains_key(&content_type) {
            self.send_error_message(
                stanza,
                &MessageError::from(Error::ErrUnknownContentType(content_type)),
            );
            return;
        }

        if let Err(err) =
            self.create_session_internal(&msg.to, &msg.initiator, &msg.sid, &content_type, true)
        {
            self.send_error_message(stanza, &MessageError::bad_request(err.to_string()));
            return;
        }
        self.dispatch_message(&msg);
    }

    fn dispatch_message(&mut self, msg: &SessionMessage) {
        let result = {
            let Some(session) = self.sessions.get_mut(&msg.sid) else {
                return;
            };
            let Some(client) = self.clients.get(session.content_type()) else {
                warn!("[{}] no client for {}", msg.sid, session.content_type());
                return;
            };
            session.on_incoming_message(msg, client.content_parser())
        };
        if let Err(err) = result {
            self.send_error_message(&msg.stanza, &err);
        }
        self.flush(&msg.sid);

        // a refused initiate leaves a session that never started
        if msg.action == ActionType::SessionInitiate
            && self
                .sessions
                .get(&msg.sid)
                .is_some_and(|session| session.state() == SessionState::Init)
        {
            self.destroy_session(&msg.sid);
        }
    }

    /// `response` acknowledged `orig_stanza`, which a session sent.
    pub fn on_incoming_response(&mut self, orig_stanza: &XmlElement, response: &XmlElement) {
        let msg = match parse_session_message(orig_stanza) {
            Ok(msg) => msg,
            Err(err) => {
                warn!("error parsing incoming response: {err}");
                return;
            }
        };

        // A request sent to a bare jid is answered from a full one.
        let ack_from = response.attr(ATTR_FROM).unwrap_or_default();
        if self.find_session(&msg.sid, &msg.to).is_none()
            && self.find_session(&msg.sid, ack_from).is_none()
        {
            trace!("[{}] response for an unknown session", msg.sid);
            return;
        }

        if let Err(err) = self.with_session(&msg.sid, |session, _| {
            session.on_incoming_response(orig_stanza);
            Ok(())
        }) {
            debug!("[{}] response: {err}", msg.sid);
        }
    }

    /// `orig_stanza` failed. Without an error reply the failure is a timeout,
    /// reported to the session as an `item-not-found` error.
    pub fn on_failed_send(&mut self, orig_stanza: &XmlElement, error_stanza: Option<&XmlElement>) {
        let msg = match parse_session_message(orig_stanza) {
            Ok(msg) => msg,
            Err(err) => {
                debug!("error parsing failed send: {err}");
                return;
            }
        };
        if self.find_session(&msg.sid, &msg.to).is_none() {
            return;
        }

        let synthetic;
        let error_stanza = match error_stanza {
            Some(error_stanza) => error_stanza,
            None => {
                synthetic = create_error_message(
                    orig_stanza,
                    &QName::new(NS_STANZA, COND_ITEM_NOT_FOUND),
                    ERROR_TYPE_CANCEL,
                    "Recipient did not respond",
                    None,
                );
                &synthetic
            }
        };

        if let Err(err) = self.with_session(&msg.sid, |session, parser| {
            session.on_failed_send(orig_stanza, error_stanza, parser);
            Ok(())
        }) {
            debug!("[{}] failed send: {err}", msg.sid);
        }
    }

    pub fn poll_outgoing(&mut self) -> Option<XmlElement> {
        self.outgoing.pop_front()
    }

    pub fn poll_event(&mut self) -> Option<SessionManagerEvent> {
        self.events.pop_front()
    }

    fn send_error_message(&mut self, stanza: &XmlElement, err: &MessageError) {
        debug!("refusing stanza {:?}: {err}", stanza.attr(ATTR_ID));
        self.outgoing.push_back(create_error_message(
            stanza,
            &QName::new(NS_STANZA, err.condition.as_str()),
            &err.error_type,
            &err.text,
            None,
        ));
    }

    /// Moves what a session queued into the manager's queues and destroys it
    /// once it has terminated.
    fn flush(&mut self, sid: &str) {
        let Some(session) = self.sessions.get_mut(sid) else {
            return;
        };
        let destroy = session.run_pending();
        while let Some(stanza) = session.poll_outgoing() {
            self.outgoing.push_back(stanza);
        }
        while let Some(event) = session.poll_event() {
            self.events.push_back(SessionManagerEvent::Session {
                sid: sid.to_owned(),
                event,
            });
        }
        if destroy {
            self.destroy_session(sid);
        }
    }
}

fn same_jid(a: &str, b: &str) -> bool {
    match (Jid::parse(a), Jid::parse(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// An `iq` error answering `stanza`, echoing its id and payload.
pub fn create_error_message(
    stanza: &XmlElement,
    name: &QName,
    error_type: &str,
    text: &str,
    extra_info: Option<&XmlElement>,
) -> XmlElement {
    let mut iq = XmlElement::new(iq_name());
    iq.set_attr(ATTR_TO, stanza.attr(ATTR_FROM).unwrap_or_default());
    iq.set_attr(ATTR_ID, stanza.attr(ATTR_ID).unwrap_or_default());
    iq.set_attr(ATTR_TYPE, IQ_ERROR);
    copy_children(stanza, &mut iq);

    let mut error = XmlElement::new(QName::new(NS_CLIENT, STR_ERROR));
    error.set_attr(ATTR_TYPE, error_type);
    // a condition outside the stanza namespace needs a standard one first
    if name.namespace != NS_STANZA {
        error.add_child(XmlElement::new(QName::new(NS_STANZA, COND_UNDEFINED_CONDITION)));
    }
    error.add_child(XmlElement::new(name.clone()));
    if let Some(extra_info) = extra_info {
        error.add_child(extra_info.clone());
    }
    if !text.is_empty() {
        let mut text_elem = XmlElement::new(QName::new(NS_STANZA, STR_TEXT));
        text_elem.set_attr_qualified(QName::new(NS_XML, ATTR_LANG), "en");
        text_elem.add_text(text);
        error.add_child(text_elem);
    }
    iq.add_child(error);
    iq
}
