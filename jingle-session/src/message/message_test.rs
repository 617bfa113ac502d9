use super::*;

use std::collections::HashMap;

use assert_matches::assert_matches;

use crate::candidate::Candidate;
use crate::content::{ContentDescription, ContentGroup, OpaqueContentParser};
use crate::transport::proxy::TransportProxy;
use crate::transport::{TransportDescription, TransportInfo};

fn proxies() -> Vec<TransportProxy> {
    let mut audio = TransportProxy::new(CN_AUDIO, NS_GINGLE_P2P);
    audio.create_channel(GICE_CHANNEL_NAME_RTP, 1);
    audio.create_channel(GICE_CHANNEL_NAME_RTCP, 2);
    let mut video = TransportProxy::new(CN_VIDEO, NS_GINGLE_P2P);
    video.create_channel(GICE_CHANNEL_NAME_VIDEO_RTP, 1);
    video.create_channel(GICE_CHANNEL_NAME_VIDEO_RTCP, 2);
    let mut main = TransportProxy::new(CN_OTHER, NS_GINGLE_P2P);
    main.create_channel(GICE_CHANNEL_NAME_RTP, 1);
    vec![audio, video, main]
}

fn with_codec_context<T>(f: impl FnOnce(&CodecContext<'_>) -> T) -> T {
    let parser = OpaqueContentParser;
    let mut content_parsers: ContentParserMap<'_> = HashMap::new();
    content_parsers.insert(NS_JINGLE_RTP.to_owned(), &parser);
    content_parsers.insert("urn:example:share".to_owned(), &parser);

    let transport_parsers = TransportParserMap::default();
    let proxies = proxies();
    let mut translators: CandidateTranslatorMap<'_> = HashMap::new();
    for proxy in &proxies {
        translators.insert(proxy.content_name().to_owned(), proxy);
    }

    let cx = CodecContext {
        content_parsers: &content_parsers,
        transport_parsers: &transport_parsers,
        translators: &translators,
    };
    f(&cx)
}

fn rtp_description(local: &str) -> ContentDescription {
    ContentDescription::new(
        XmlElement::new(QName::new(NS_JINGLE_RTP, STR_DESCRIPTION))
            .with_child(XmlElement::new(QName::new(NS_JINGLE_RTP, local))),
    )
}

const JINGLE_INITIATE: &str = r#"
<iq xmlns="jabber:client" to="bob@example.com/phone" from="alice@example.com/desk" type="set" id="7">
  <jingle xmlns="urn:xmpp:jingle:1" action="session-initiate" sid="42" initiator="alice@example.com/desk">
    <content name="audio" creator="initiator">
      <description xmlns="urn:xmpp:jingle:apps:rtp:1" media="audio"/>
      <transport xmlns="http://www.google.com/transport/p2p" ufrag="u1" pwd="p1">
        <candidate name="rtp" address="10.0.0.1" port="5000" preference="1" username="u1"
                   protocol="udp" generation="0"/>
      </transport>
    </content>
    <group xmlns="google:jingle" type="BUNDLE">
      <content name="audio"/>
    </group>
  </jingle>
</iq>"#;

const GINGLE_VIDEO_INITIATE: &str = r#"
<iq xmlns="jabber:client" to="bob@example.com/phone" from="alice@example.com/desk" type="set" id="8">
  <session xmlns="http://www.google.com/session" type="initiate" id="43" initiator="alice@example.com/desk">
    <description xmlns="http://www.google.com/session/video">
      <payload-type id="97" name="H264"/>
    </description>
    <candidate name="rtp" address="10.0.0.1" port="5000" preference="1" username="YWJj"
               protocol="udp" generation="0"/>
    <candidate name="video_rtp" address="10.0.0.1" port="5002" preference="0.5" username="ZGVm"
               protocol="udp" generation="0"/>
  </session>
</iq>"#;

#[test]
fn test_parse_session_message_envelope() -> Result<()> {
    let stanza = XmlElement::parse(JINGLE_INITIATE)?;
    assert!(is_session_message(&stanza));

    let msg = parse_session_message(&stanza)?;
    assert_eq!(msg.protocol, SignalingProtocol::Jingle);
    assert_eq!(msg.action, ActionType::SessionInitiate);
    assert_eq!(msg.id, "7");
    assert_eq!(msg.sid, "42");
    assert_eq!(msg.initiator, "alice@example.com/desk");
    assert_eq!(msg.from, "alice@example.com/desk");
    assert_eq!(msg.to, "bob@example.com/phone");
    assert!(msg.action_elem.is(NS_JINGLE, STR_JINGLE));

    let stanza = XmlElement::parse(GINGLE_VIDEO_INITIATE)?;
    let msg = parse_session_message(&stanza)?;
    assert_eq!(msg.protocol, SignalingProtocol::Gingle);
    assert_eq!(msg.action, ActionType::SessionInitiate);
    assert_eq!(msg.sid, "43");

    Ok(())
}

#[test]
fn test_parse_session_message_errors() -> Result<()> {
    let tests = vec![
        (
            r#"<iq xmlns="jabber:client" type="set" id="1"><query xmlns="jabber:iq:roster"/></iq>"#,
            Error::ErrMissingElement("jingle".to_owned()),
        ),
        (
            r#"<iq xmlns="jabber:client" type="set" id="1"><jingle xmlns="urn:xmpp:jingle:1" action="content-add" sid="1"/></iq>"#,
            Error::ErrParse("unknown action: content-add".to_owned()),
        ),
    ];

    for (xml, expected) in tests {
        let stanza = XmlElement::parse(xml)?;
        if let Err(err) = parse_session_message(&stanza) {
            assert_eq!(err, expected);
        } else {
            panic!("expected error, but got ok");
        }
    }

    Ok(())
}

#[test]
fn test_is_session_message() -> Result<()> {
    let tests = vec![
        (JINGLE_INITIATE, true),
        (GINGLE_VIDEO_INITIATE, true),
        (
            r#"<iq xmlns="jabber:client" type="get" id="1"><jingle xmlns="urn:xmpp:jingle:1" action="session-info" sid="1"/></iq>"#,
            false,
        ),
        (
            r#"<iq xmlns="jabber:client" type="set" id="1"><jingle xmlns="urn:xmpp:jingle:1" sid="1"/></iq>"#,
            false,
        ),
        (
            r#"<iq xmlns="jabber:client" type="set" id="1"><session xmlns="http://www.google.com/session" type="info" id="1"/></iq>"#,
            false,
        ),
        (
            r#"<message xmlns="jabber:client"><jingle xmlns="urn:xmpp:jingle:1" action="session-info" sid="1"/></message>"#,
            false,
        ),
    ];

    for (xml, expected) in tests {
        let stanza = XmlElement::parse(xml)?;
        assert_eq!(is_session_message(&stanza), expected, "{xml}");
    }

    Ok(())
}

#[test]
fn test_hybrid_stanza_reads_jingle_body() -> Result<()> {
    let xml = r#"
<iq xmlns="jabber:client" type="set" id="9">
  <jingle xmlns="urn:xmpp:jingle:1" action="session-terminate" sid="5"/>
  <session xmlns="http://www.google.com/session" type="terminate" id="5" initiator="a@b/c"/>
</iq>"#;
    let msg = parse_session_message(&XmlElement::parse(xml)?)?;
    assert_eq!(msg.protocol, SignalingProtocol::Hybrid);
    assert_eq!(msg.action, ActionType::SessionTerminate);
    assert!(msg.action_elem.is(NS_JINGLE, STR_JINGLE));

    Ok(())
}

#[test]
fn test_parse_content_type() -> Result<()> {
    let gingle = XmlElement::parse(GINGLE_VIDEO_INITIATE)?;
    let session = gingle
        .first_element()
        .ok_or(Error::ErrMissingElement("session".to_owned()))?;
    assert_eq!(
        parse_content_type(SignalingProtocol::Gingle, session)?,
        NS_JINGLE_RTP
    );

    let jingle = parse_session_message(&XmlElement::parse(JINGLE_INITIATE)?)?;
    assert_eq!(
        parse_content_type(SignalingProtocol::Jingle, &jingle.action_elem)?,
        NS_JINGLE_RTP
    );

    let mixed = XmlElement::parse(
        r#"<jingle xmlns="urn:xmpp:jingle:1" action="session-initiate" sid="1">
             <content name="a"><description xmlns="urn:xmpp:jingle:apps:rtp:1"/></content>
             <content name="b"><description xmlns="urn:example:share"/></content>
           </jingle>"#,
    )?;
    assert_eq!(
        parse_content_type(SignalingProtocol::Jingle, &mixed),
        Err(Error::ErrMultipleContentTypes)
    );

    let empty = XmlElement::parse(r#"<jingle xmlns="urn:xmpp:jingle:1" action="session-initiate" sid="1"/>"#)?;
    assert_eq!(
        parse_content_type(SignalingProtocol::Jingle, &empty),
        Err(Error::ErrNoContents)
    );

    Ok(())
}

#[test]
fn test_find_session_redirect() -> Result<()> {
    let tests = vec![
        (
            r#"<iq xmlns="jabber:client" type="error" id="1"><error type="modify"><redirect xmlns="http://www.google.com/session">xmpp:carol@example.com/desk</redirect></error></iq>"#,
            Some("carol@example.com/desk".to_owned()),
        ),
        (
            r#"<iq xmlns="jabber:client" type="error" id="1"><error type="modify"><redirect xmlns="urn:ietf:params:xml:ns:xmpp-stanzas">xmpp:dave@example.com</redirect></error></iq>"#,
            Some("dave@example.com".to_owned()),
        ),
        (
            r#"<iq xmlns="jabber:client" type="error" id="1"><error type="modify"><redirect xmlns="urn:ietf:params:xml:ns:xmpp-stanzas">carol@example.com</redirect></error></iq>"#,
            None,
        ),
        (
            r#"<iq xmlns="jabber:client" type="error" id="1"><error type="cancel"><item-not-found xmlns="urn:ietf:params:xml:ns:xmpp-stanzas"/></error></iq>"#,
            None,
        ),
        (r#"<iq xmlns="jabber:client" type="error" id="1"/>"#, None),
    ];

    for (xml, expected) in tests {
        assert_eq!(find_session_redirect(&XmlElement::parse(xml)?), expected);
    }

    Ok(())
}

#[test]
fn test_jingle_initiate_parse() -> Result<()> {
    let msg = parse_session_message(&XmlElement::parse(JINGLE_INITIATE)?)?;
    let init = with_codec_context(|cx| JingleCodec.parse_session_initiate(&msg.action_elem, cx))?;

    assert_eq!(init.contents.len(), 1);
    assert_eq!(init.contents[0].name, CN_AUDIO);
    assert_eq!(init.contents[0].content_type, NS_JINGLE_RTP);
    assert_eq!(init.contents[0].description.element().attr("media"), Some("audio"));

    assert_eq!(init.groups, vec![ContentGroup {
        semantics: GROUP_TYPE_BUNDLE.to_owned(),
        content_names: vec![CN_AUDIO.to_owned()],
    }]);

    assert_eq!(init.transports.len(), 1);
    let tinfo = &init.transports[0];
    assert_eq!(tinfo.content_name, CN_AUDIO);
    assert_eq!(tinfo.description.ice_ufrag, "u1");
    assert_eq!(tinfo.description.candidates.len(), 1);
    assert_eq!(tinfo.description.candidates[0].component, 1);

    Ok(())
}

#[test]
fn test_jingle_transport_info_unknown_content() -> Result<()> {
    let xml = r#"
<jingle xmlns="urn:xmpp:jingle:1" action="transport-info" sid="42">
  <content name="screen" creator="initiator">
    <transport xmlns="http://www.google.com/transport/p2p"/>
  </content>
</jingle>"#;
    let elem = XmlElement::parse(xml)?;
    let contents = vec![ContentInfo::new(CN_AUDIO, NS_JINGLE_RTP, rtp_description("payload-type"))];

    let result = with_codec_context(|cx| JingleCodec.parse_transport_infos(&elem, &contents, cx));
    assert_eq!(result, Err(Error::ErrUnknownContentName("screen".to_owned())));

    Ok(())
}

#[test]
fn test_jingle_write_initiate() -> Result<()> {
    let mut rejected = ContentInfo::new(CN_VIDEO, NS_JINGLE_RTP, rtp_description("payload-type"));
    rejected.rejected = true;
    let init = SessionInitiate {
        contents: vec![
            ContentInfo::new(CN_AUDIO, NS_JINGLE_RTP, rtp_description("payload-type")),
            rejected,
        ],
        transports: vec![TransportInfo::new(
            CN_AUDIO,
            TransportDescription::new(NS_GINGLE_P2P, vec![]),
        )],
        groups: vec![ContentGroup::new(GROUP_TYPE_BUNDLE)],
    };

    let elems = with_codec_context(|cx| JingleCodec.write_session_initiate(&init, cx))?;
    assert_eq!(elems.len(), 2);

    let content = &elems[0];
    assert!(content.is(NS_JINGLE, STR_CONTENT));
    assert_eq!(content.attr(ATTR_NAME), Some(CN_AUDIO));
    assert_eq!(content.attr(ATTR_CREATOR), Some(CREATOR_INITIATOR));
    let children: Vec<&XmlElement> = content.child_elements().collect();
    assert!(children[0].is(NS_JINGLE_RTP, STR_DESCRIPTION));
    assert!(children[1].is(NS_GINGLE_P2P, STR_TRANSPORT));

    // the group lists every content, rejected or not
    let group = &elems[1];
    assert!(group.is(NS_JINGLE_DRAFT, STR_GROUP));
    assert_eq!(group.attr(ATTR_TYPE), Some(GROUP_TYPE_BUNDLE));
    assert_eq!(group.child_elements().count(), 2);

    let no_transport = SessionInitiate {
        transports: vec![],
        ..init
    };
    let result = with_codec_context(|cx| JingleCodec.write_session_initiate(&no_transport, cx));
    assert_eq!(
        result,
        Err(Error::ErrParse("No transport for content: audio".to_owned()))
    );

    Ok(())
}

#[test]
fn test_gingle_video_initiate_splits_contents_and_candidates() -> Result<()> {
    let msg = parse_session_message(&XmlElement::parse(GINGLE_VIDEO_INITIATE)?)?;
    let init = with_codec_context(|cx| GingleCodec.parse_session_initiate(&msg.action_elem, cx))?;

    assert_eq!(init.contents.len(), 2);
    let audio = &init.contents[0];
    assert_eq!(audio.name, CN_AUDIO);
    assert_eq!(audio.content_type, NS_JINGLE_RTP);
    assert!(audio.description.element().is(NS_GINGLE_AUDIO, STR_DESCRIPTION));
    assert_eq!(audio.description.element().child_elements().count(), 1);

    let video = &init.contents[1];
    assert_eq!(video.name, CN_VIDEO);
    assert!(video.description.element().is(NS_GINGLE_VIDEO, STR_DESCRIPTION));

    assert_eq!(init.transports.len(), 2);
    assert_eq!(init.transports[0].content_name, CN_AUDIO);
    assert_eq!(init.transports[0].description.candidates.len(), 1);
    assert_eq!(init.transports[1].content_name, CN_VIDEO);
    assert_eq!(init.transports[1].description.candidates[0].preference, 0.5);
    assert!(init.groups.is_empty());

    Ok(())
}

#[test]
fn test_gingle_candidates_without_media_go_to_main() -> Result<()> {
    let xml = r#"
<session xmlns="http://www.google.com/session" type="candidates" id="1" initiator="a@b/c">
  <candidate name="rtp" address="10.0.0.1" port="5000" preference="1" username="YWJj"
             protocol="udp" generation="0"/>
</session>"#;
    let elem = XmlElement::parse(xml)?;
    let contents = vec![ContentInfo::new(
        CN_OTHER,
        "urn:example:share",
        ContentDescription::default(),
    )];

    let tinfos = with_codec_context(|cx| GingleCodec.parse_transport_infos(&elem, &contents, cx))?;
    assert_eq!(tinfos.len(), 1);
    assert_eq!(tinfos[0].content_name, CN_OTHER);
    assert_eq!(tinfos[0].description.candidates.len(), 1);

    Ok(())
}

#[test]
fn test_gingle_unknown_channel_name() -> Result<()> {
    let xml = r#"
<session xmlns="http://www.google.com/session" type="candidates" id="1" initiator="a@b/c">
  <candidate name="video_rtp" address="10.0.0.1" port="5000" preference="1" username="YWJj"
             protocol="udp" generation="0"/>
</session>"#;
    let elem = XmlElement::parse(xml)?;
    let contents = vec![ContentInfo::new(CN_AUDIO, NS_JINGLE_RTP, rtp_description("payload-type"))];

    let result = with_codec_context(|cx| GingleCodec.parse_transport_infos(&elem, &contents, cx));
    assert_eq!(result, Err(Error::ErrUnknownChannelName("video_rtp".to_owned())));

    Ok(())
}

#[test]
fn test_gingle_write_contents() -> Result<()> {
    let audio = ContentInfo::new(CN_AUDIO, NS_JINGLE_RTP, rtp_description("audio-codec"));
    let video = ContentInfo::new(CN_VIDEO, NS_JINGLE_RTP, rtp_description("video-codec"));

    // audio and video merge into the video description
    let merged = with_codec_context(|cx| {
        GingleCodec.write_description_info(&[audio.clone(), video.clone()], cx)
    })?;
    assert_eq!(merged.len(), 1);
    let locals: Vec<&str> = merged[0]
        .child_elements()
        .map(|e| e.name().local.as_str())
        .collect();
    assert_eq!(locals, vec!["video-codec", "audio-codec"]);

    let share = ContentInfo::new(CN_OTHER, "urn:example:share", ContentDescription::default());
    let mut rejected = audio.clone();
    rejected.rejected = true;

    let tests = vec![
        (vec![], Error::ErrGingleContentCount),
        (
            vec![audio.clone(), share.clone()],
            Error::ErrGingleContentCount,
        ),
        (
            vec![audio.clone(), video.clone(), share],
            Error::ErrGingleContentCount,
        ),
        (vec![rejected.clone()], Error::ErrGingleRejectedContent),
        (vec![rejected, video], Error::ErrGingleRejectedContent),
    ];

    for (contents, expected) in tests {
        let result = with_codec_context(|cx| GingleCodec.write_description_info(&contents, cx));
        if let Err(err) = result {
            assert_eq!(err, expected);
        } else {
            panic!("expected error, but got ok");
        }
    }

    Ok(())
}

#[test]
fn test_gingle_write_candidates_flat() -> Result<()> {
    let candidate = Candidate {
        component: 1,
        address: "10.0.0.1:5000".parse().unwrap(),
        username: "YWJj".to_owned(),
        preference: 1.0,
        ..Default::default()
    };
    let tinfos = vec![
        TransportInfo::new(
            CN_AUDIO,
            TransportDescription::new(NS_GINGLE_P2P, vec![candidate.clone()]),
        ),
        TransportInfo::new(
            CN_VIDEO,
            TransportDescription::new(NS_GINGLE_P2P, vec![candidate]),
        ),
    ];

    let elems = with_codec_context(|cx| GingleCodec.write_transport_infos(&tinfos, cx))?;
    let names: Vec<Option<&str>> = elems.iter().map(|e| e.attr(ATTR_NAME)).collect();
    assert_eq!(names, vec![Some("rtp"), Some("video_rtp")]);
    assert!(elems.iter().all(|e| e.is(NS_GINGLE, STR_CANDIDATE)));

    let elems = with_codec_context(|cx| JingleCodec.write_transport_infos(&tinfos, cx))?;
    assert_eq!(elems.len(), 2);
    assert!(elems[1].is(NS_JINGLE, STR_CONTENT));
    assert_eq!(elems[1].attr(ATTR_NAME), Some(CN_VIDEO));

    Ok(())
}

#[test]
fn test_session_terminate_reasons() -> Result<()> {
    let term = SessionTerminate::new(STR_TERMINATE_DECLINE);

    let jingle = JingleCodec.write_session_terminate(&term);
    assert_eq!(jingle.len(), 1);
    assert!(jingle[0].is(NS_JINGLE, STR_REASON));
    let body = XmlElement::new(jingle_name()).with_child(jingle[0].clone());
    assert_eq!(JingleCodec.parse_session_terminate(&body), term);

    let gingle = GingleCodec.write_session_terminate(&term);
    assert!(gingle[0].is(NS_GINGLE, STR_TERMINATE_DECLINE));

    let body = XmlElement::parse(
        r#"<session xmlns="http://www.google.com/session" type="terminate" id="1" initiator="a@b/c"><call-ended><timeout/></call-ended></session>"#,
    )?;
    let parsed = GingleCodec.parse_session_terminate(&body);
    assert_eq!(parsed.reason, "call-ended");
    assert_eq!(parsed.debug_reason, "timeout");

    assert!(JingleCodec
        .write_session_terminate(&SessionTerminate::default())
        .is_empty());
    assert!(GingleCodec
        .write_session_terminate(&SessionTerminate::default())
        .is_empty());

    Ok(())
}

#[test]
fn test_action_names() {
    let tests = vec![
        (ActionType::SessionInitiate, Some("session-initiate"), Some("initiate")),
        (ActionType::SessionReject, Some("session-terminate"), Some("reject")),
        (ActionType::TransportInfo, Some("transport-info"), Some("candidates")),
        (ActionType::TransportAccept, Some("transport-accept"), None),
        (ActionType::DescriptionInfo, Some("description-info"), Some("update")),
    ];

    for (action, jingle, gingle) in tests {
        assert_eq!(JingleCodec.action_name(action), jingle);
        assert_eq!(GingleCodec.action_name(action), gingle);
        if let Some(name) = gingle {
            assert_eq!(ActionType::from_wire(name), Some(action));
        }
    }

    assert_matches!(dialect_codec(SignalingProtocol::Hybrid).protocol(), SignalingProtocol::Jingle);
    assert_eq!(
        write_dialects(SignalingProtocol::Hybrid),
        &[SignalingProtocol::Jingle, SignalingProtocol::Gingle]
    );
}

#[test]
fn test_write_session_message_hybrid() -> Result<()> {
    let mut stanza = XmlElement::new(iq_name());
    for protocol in write_dialects(SignalingProtocol::Hybrid) {
        let msg = SessionMessage::new(
            *protocol,
            ActionType::SessionInitiate,
            "42",
            "alice@example.com/desk",
            "bob@example.com/phone",
        );
        write_session_message(&msg, vec![], &mut stanza);
    }

    assert_eq!(stanza.attr(ATTR_TO), Some("bob@example.com/phone"));
    assert_eq!(stanza.attr(ATTR_TYPE), Some(IQ_SET));
    let jingle = stanza.require_child(&jingle_name())?;
    assert_eq!(jingle.attr(ATTR_ACTION), Some("session-initiate"));
    assert_eq!(jingle.attr(ATTR_INITIATOR), Some("alice@example.com/desk"));
    let session = stanza.require_child(&gingle_session_name())?;
    assert_eq!(session.attr(ATTR_TYPE), Some("initiate"));
    assert_eq!(session.attr(ATTR_ID), Some("42"));

    let msg = parse_session_message(&stanza)?;
    assert_eq!(msg.protocol, SignalingProtocol::Hybrid);

    Ok(())
}
