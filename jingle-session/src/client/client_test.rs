use super::*;

use std::cell::RefCell;
use std::rc::Rc;

use sansio::Protocol;

use crate::constants::*;
use crate::content::{ContentDescription, ContentGroup, ContentInfo, ContentParser, OpaqueContentParser};
use crate::message::{iq_name, parse_session_message, ActionType};
use crate::session::{Session, SessionError, SessionEvent, SessionState};

const ALICE: &str = "alice@example.com/desk";
const BOB: &str = "bob@example.com/phone";

#[derive(Default)]
struct ClientLog {
    created: Vec<(String, bool)>,
    destroyed: Vec<String>,
}

struct VoiceClient {
    parser: OpaqueContentParser,
    log: Rc<RefCell<ClientLog>>,
}

impl SessionClient for VoiceClient {
    fn content_parser(&self) -> &dyn ContentParser {
        &self.parser
    }

    fn on_session_create(&mut self, session: &mut Session, received: bool) {
        session.create_channel(CN_AUDIO, GICE_CHANNEL_NAME_RTP, 1);
        session.create_channel(CN_AUDIO, GICE_CHANNEL_NAME_RTCP, 2);
        self.log
            .borrow_mut()
            .created
            .push((session.sid().to_owned(), received));
    }

    fn on_session_destroy(&mut self, session: &Session) {
        self.log.borrow_mut().destroyed.push(session.sid().to_owned());
    }
}

fn voice_client(jid: &str, now: Instant) -> Result<(SignalingClient, Rc<RefCell<ClientLog>>)> {
    let log = Rc::new(RefCell::new(ClientLog::default()));
    let client = SignalingClientBuilder::new()
        .with_local_jid(Jid::parse(jid)?)
        .with_session_client(
            NS_JINGLE_RTP,
            Box::new(VoiceClient {
                parser: OpaqueContentParser,
                log: Rc::clone(&log),
            }),
        )
        .build(now)?;
    Ok((client, log))
}

fn audio_description() -> SessionDescription {
    let mut group = ContentGroup::new(GROUP_TYPE_BUNDLE);
    group.add_content_name(CN_AUDIO);
    SessionDescription::new(
        vec![ContentInfo::new(
            CN_AUDIO,
            NS_JINGLE_RTP,
            ContentDescription::new(
                XmlElement::new(QName::new(NS_JINGLE_RTP, STR_DESCRIPTION))
                    .with_attr("media", "audio"),
            ),
        )],
        vec![],
        vec![group],
    )
}

/// Delivers everything `from` wants to send to `to`, stamped the way a server
/// would stamp it. Returns the stanzas delivered.
fn relay(from: &mut SignalingClient, to: &mut SignalingClient) -> Result<Vec<XmlElement>> {
    let mut delivered = vec![];
    while let Some(mut msg) = from.poll_write() {
        msg.stanza.set_attr(ATTR_FROM, from.jid().to_string());
        delivered.push(msg.stanza.clone());
        to.handle_read(msg)?;
    }
    Ok(delivered)
}

fn drain_writes(client: &mut SignalingClient) -> Vec<XmlElement> {
    let mut stanzas = vec![];
    while let Some(msg) = client.poll_write() {
        stanzas.push(msg.stanza);
    }
    stanzas
}

fn drain_events(client: &mut SignalingClient) -> Vec<SessionManagerEvent> {
    let mut events = vec![];
    while let Some(event) = client.poll_event() {
        events.push(event);
    }
    events
}

fn action_of(stanza: &XmlElement) -> Result<ActionType> {
    Ok(parse_session_message(stanza)?.action)
}

fn error_condition(stanza: &XmlElement) -> Option<String> {
    let error = stanza.first_named(&QName::new(NS_CLIENT, STR_ERROR))?;
    error
        .child_elements()
        .find(|e| e.name().namespace == NS_STANZA && e.name().local != STR_TEXT)
        .map(|e| e.name().local.clone())
}

fn session_state(client: &SignalingClient, sid: &str) -> Option<SessionState> {
    client.manager().get_session(sid).map(|session| session.state())
}

#[test]
fn test_builder() -> Result<()> {
    let now = Instant::now();

    let result = SignalingClientBuilder::new().build(now);
    if let Err(err) = result {
        assert_eq!(err, Error::ErrInvalidJid("local jid is required".to_owned()));
    } else {
        panic!("expected error, but got ok");
    }

    let result = SignalingClientBuilder::new()
        .with_local_jid(Jid::parse(ALICE)?)
        .with_send_timeout(Duration::ZERO)
        .build(now);
    assert!(result.is_err(), "zero send timeout must be refused");

    let mut client = SignalingClientBuilder::new()
        .with_local_jid(Jid::parse(ALICE)?)
        .build(now)?;
    assert_eq!(client.jid().to_string(), ALICE);
    assert_eq!(client.pending_requests(), 0);
    assert_eq!(client.poll_timeout(), None);
    assert!(client.poll_write().is_none());

    // no client owns the content type
    if let Err(err) = client.create_session(NS_JINGLE_RTP) {
        assert_eq!(err, Error::ErrUnknownClient(NS_JINGLE_RTP.to_owned()));
    } else {
        panic!("expected error, but got ok");
    }

    Ok(())
}

#[test]
fn test_call_between_clients() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let now = Instant::now();
    let (mut alice, alice_log) = voice_client(ALICE, now)?;
    let (mut bob, bob_log) = voice_client(BOB, now)?;

    let sid = alice.create_session(NS_JINGLE_RTP)?;
    alice.handle_event(SignalingCommand::Initiate {
        sid: sid.clone(),
        to: BOB.to_owned(),
        description: audio_description(),
    })?;
    assert_eq!(alice.pending_requests(), 1);
    assert_eq!(alice.poll_timeout(), Some(now + DEFAULT_SEND_TIMEOUT));

    let initiate = relay(&mut alice, &mut bob)?;
    assert_eq!(initiate.len(), 1);
    assert_eq!(action_of(&initiate[0])?, ActionType::SessionInitiate);
    assert_eq!(initiate[0].attr(ATTR_ID), Some("1"));
    assert_eq!(session_state(&bob, &sid), Some(SessionState::ReceivedInitiate));
    assert_eq!(bob_log.borrow().created, vec![(sid.clone(), true)]);
    assert!(drain_events(&mut bob).contains(&SessionManagerEvent::SessionCreated {
        sid: sid.clone(),
        received: true,
    }));

    let ack = relay(&mut bob, &mut alice)?;
    assert_eq!(ack.len(), 1);
    assert_eq!(ack[0].attr(ATTR_TYPE), Some(IQ_RESULT));
    assert!(
        alice
            .manager()
            .get_session(&sid)
            .is_some_and(|session| session.initiate_acked())
    );
    assert_eq!(alice.pending_requests(), 0);
    assert_eq!(alice.poll_timeout(), None);

    bob.handle_event(SignalingCommand::Accept {
        sid: sid.clone(),
        description: audio_description(),
    })?;
    assert_eq!(session_state(&bob, &sid), Some(SessionState::InProgress));
    relay(&mut bob, &mut alice)?;
    assert_eq!(session_state(&alice, &sid), Some(SessionState::InProgress));
    relay(&mut alice, &mut bob)?;
    assert_eq!(bob.pending_requests(), 0);

    drain_events(&mut alice);
    drain_events(&mut bob);

    alice.handle_event(SignalingCommand::Terminate {
        sid: sid.clone(),
        reason: STR_TERMINATE_SUCCESS.to_owned(),
    })?;
    assert_eq!(alice.manager().session_count(), 0);
    assert_eq!(alice_log.borrow().destroyed, vec![sid.clone()]);

    relay(&mut alice, &mut bob)?;
    assert_eq!(bob.manager().session_count(), 0);
    assert_eq!(bob_log.borrow().destroyed, vec![sid.clone()]);
    assert!(drain_events(&mut bob).iter().any(|event| matches!(
        event,
        SessionManagerEvent::Session {
            event: SessionEvent::ReceivedTerminateReason(reason),
            ..
        } if reason == STR_TERMINATE_SUCCESS
    )));

    // the terminate ack finds its send task even with the session gone
    relay(&mut bob, &mut alice)?;
    assert_eq!(alice.pending_requests(), 0);

    Ok(())
}

#[test]
fn test_unacknowledged_initiate_times_out() -> Result<()> {
    let now = Instant::now();
    let (mut alice, alice_log) = voice_client(ALICE, now)?;

    let sid = alice.create_session(NS_JINGLE_RTP)?;
    alice.handle_event(SignalingCommand::Initiate {
        sid: sid.clone(),
        to: BOB.to_owned(),
        description: audio_description(),
    })?;
    drain_writes(&mut alice);
    drain_events(&mut alice);

    // nothing happens before the deadline
    alice.handle_timeout(now + Duration::from_secs(10))?;
    assert_eq!(session_state(&alice, &sid), Some(SessionState::SentInitiate));
    assert!(drain_writes(&mut alice).is_empty());

    alice.handle_timeout(now + DEFAULT_SEND_TIMEOUT)?;
    assert_eq!(alice.manager().session_count(), 0);
    assert_eq!(alice_log.borrow().destroyed, vec![sid.clone()]);

    let events = drain_events(&mut alice);
    assert!(events.contains(&SessionManagerEvent::Session {
        sid: sid.clone(),
        event: SessionEvent::Error(SessionError::Response),
    }));
    assert_eq!(
        events.last(),
        Some(&SessionManagerEvent::SessionDestroyed { sid: sid.clone() })
    );

    let writes = drain_writes(&mut alice);
    assert_eq!(writes.len(), 1);
    assert_eq!(action_of(&writes[0])?, ActionType::SessionTerminate);
    assert_eq!(writes[0].attr(ATTR_ID), Some("2"));

    // the terminate is tracked like any request, its timeout is harmless
    assert_eq!(alice.pending_requests(), 1);
    let deadline = alice.poll_timeout();
    assert_eq!(deadline, Some(now + DEFAULT_SEND_TIMEOUT * 2));
    alice.handle_timeout(now + DEFAULT_SEND_TIMEOUT * 2)?;
    assert_eq!(alice.pending_requests(), 0);
    assert_eq!(alice.poll_timeout(), None);
    assert!(drain_writes(&mut alice).is_empty());

    Ok(())
}

#[test]
fn test_error_reply_terminates_session() -> Result<()> {
    let now = Instant::now();
    let (mut alice, _) = voice_client(ALICE, now)?;
    // bob has no client for the offered content
    let mut bob = SignalingClientBuilder::new()
        .with_local_jid(Jid::parse(BOB)?)
        .build(now)?;

    let sid = alice.create_session(NS_JINGLE_RTP)?;
    alice.handle_event(SignalingCommand::Initiate {
        sid: sid.clone(),
        to: BOB.to_owned(),
        description: audio_description(),
    })?;
    relay(&mut alice, &mut bob)?;
    assert_eq!(bob.manager().session_count(), 0);

    let refusal = relay(&mut bob, &mut alice)?;
    assert_eq!(refusal.len(), 1);
    assert_eq!(refusal[0].attr(ATTR_TYPE), Some(IQ_ERROR));
    assert_eq!(error_condition(&refusal[0]).as_deref(), Some(COND_NOT_ACCEPTABLE));

    assert_eq!(alice.manager().session_count(), 0);
    let writes = drain_writes(&mut alice);
    assert_eq!(writes.len(), 1);
    assert_eq!(action_of(&writes[0])?, ActionType::SessionTerminate);

    Ok(())
}

#[test]
fn test_response_matching() -> Result<()> {
    let now = Instant::now();
    let (mut alice, _) = voice_client(ALICE, now)?;

    let sid = alice.create_session(NS_JINGLE_RTP)?;
    alice.handle_event(SignalingCommand::Initiate {
        sid: sid.clone(),
        to: "bob@example.com".to_owned(),
        description: audio_description(),
    })?;
    let initiate = drain_writes(&mut alice);
    assert_eq!(initiate.len(), 1);

    let tests = vec![
        ("another sender", "mallory@example.com/x", "1", false),
        ("another id", BOB, "7", false),
        ("a resource of the bare jid", BOB, "1", true),
    ];

    for (name, from, id, acked) in tests {
        let ack = XmlElement::new(iq_name())
            .with_attr(ATTR_TYPE, IQ_RESULT)
            .with_attr(ATTR_FROM, from)
            .with_attr(ATTR_ID, id);
        alice.handle_read(StanzaMessage::new(now, ack))?;
        assert_eq!(
            alice.pending_requests() == 0,
            acked,
            "{name}: pending {}",
            alice.pending_requests()
        );
        assert!(drain_writes(&mut alice).is_empty(), "{name}: nothing is sent");
    }
    assert!(
        alice
            .manager()
            .get_session(&sid)
            .is_some_and(|session| session.initiate_acked())
    );

    Ok(())
}

#[test]
fn test_unclaimed_stanzas() -> Result<()> {
    let now = Instant::now();
    let (mut alice, _) = voice_client(ALICE, now)?;

    let ping = XmlElement::new(iq_name())
        .with_attr(ATTR_TYPE, IQ_GET)
        .with_attr(ATTR_FROM, BOB)
        .with_attr(ATTR_ID, "p1")
        .with_child(XmlElement::new(QName::new("urn:xmpp:ping", "ping")));
    alice.handle_read(StanzaMessage::new(now, ping))?;

    let writes = drain_writes(&mut alice);
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].attr(ATTR_TYPE), Some(IQ_ERROR));
    assert_eq!(writes[0].attr(ATTR_TO), Some(BOB));
    assert_eq!(writes[0].attr(ATTR_ID), Some("p1"));
    assert_eq!(
        error_condition(&writes[0]).as_deref(),
        Some(COND_SERVICE_UNAVAILABLE)
    );

    // a stray result is dropped silently
    let stray = XmlElement::new(iq_name())
        .with_attr(ATTR_TYPE, IQ_RESULT)
        .with_attr(ATTR_FROM, BOB)
        .with_attr(ATTR_ID, "99");
    alice.handle_read(StanzaMessage::new(now, stray))?;
    assert!(drain_writes(&mut alice).is_empty());
    assert!(alice.poll_read().is_none());

    let message = XmlElement::new(QName::new(NS_CLIENT, "message"))
        .with_attr(ATTR_FROM, BOB)
        .with_child(XmlElement::new(QName::new(NS_CLIENT, "body")).with_text("hi"));
    alice.handle_read(StanzaMessage::new(now, message.clone()))?;
    assert_eq!(alice.poll_read().map(|msg| msg.stanza), Some(message));

    Ok(())
}

#[test]
fn test_close() -> Result<()> {
    let now = Instant::now();
    let (mut alice, alice_log) = voice_client(ALICE, now)?;

    let sid = alice.create_session(NS_JINGLE_RTP)?;
    alice.handle_event(SignalingCommand::Initiate {
        sid: sid.clone(),
        to: BOB.to_owned(),
        description: audio_description(),
    })?;
    drain_writes(&mut alice);

    alice.close()?;
    assert!(alice.is_closed());
    assert_eq!(alice.manager().session_count(), 0);
    assert_eq!(alice_log.borrow().destroyed, vec![sid.clone()]);
    assert_eq!(alice.pending_requests(), 0);
    assert_eq!(alice.poll_timeout(), None);

    let writes = drain_writes(&mut alice);
    assert_eq!(writes.len(), 1);
    assert_eq!(action_of(&writes[0])?, ActionType::SessionTerminate);
    assert!(writes[0].has_attr(ATTR_ID));

    if let Err(err) = alice.handle_event(SignalingCommand::Terminate {
        sid,
        reason: STR_TERMINATE_SUCCESS.to_owned(),
    }) {
        assert_eq!(err, Error::ErrClientClosed);
    } else {
        panic!("expected error, but got ok");
    }
    if let Err(err) = alice.close() {
        assert_eq!(err, Error::ErrClientClosed);
    } else {
        panic!("expected error, but got ok");
    }

    Ok(())
}

#[test]
fn test_command_errors_keep_client_usable() -> Result<()> {
    let now = Instant::now();
    let (mut alice, _) = voice_client(ALICE, now)?;

    let tests = vec![
        (
            "unknown session",
            SignalingCommand::Reject {
                sid: "404".to_owned(),
                reason: STR_TERMINATE_DECLINE.to_owned(),
            },
            Error::ErrSessionNotFound("404".to_owned()),
        ),
        (
            "info without a session",
            SignalingCommand::Info {
                sid: "405".to_owned(),
                elems: vec![],
            },
            Error::ErrSessionNotFound("405".to_owned()),
        ),
    ];

    for (name, command, expected) in tests {
        if let Err(err) = alice.handle_event(command) {
            assert_eq!(err, expected, "{name}");
        } else {
            panic!("{name}: expected error, but got ok");
        }
    }

    let sid = alice.create_session(NS_JINGLE_RTP)?;
    alice.handle_event(SignalingCommand::Initiate {
        sid,
        to: BOB.to_owned(),
        description: audio_description(),
    })?;
    assert_eq!(drain_writes(&mut alice).len(), 1);

    Ok(())
}
