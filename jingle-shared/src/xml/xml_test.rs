use super::*;

const NS_JINGLE: &str = "urn:xmpp:jingle:1";

#[test]
fn test_parse_resolves_namespaces() -> Result<()> {
    let stanza = XmlElement::parse(
        r#"<iq xmlns="jabber:client" type="set" id="7">
             <jingle xmlns="urn:xmpp:jingle:1" action="session-info" sid="42">
               <p:ping xmlns:p="urn:example:ping" p:seq="3"/>
             </jingle>
           </iq>"#,
    )?;

    assert!(stanza.is("jabber:client", "iq"));
    assert_eq!(stanza.attr("type"), Some("set"));

    let jingle = stanza.require_child(&QName::new(NS_JINGLE, "jingle"))?;
    assert_eq!(jingle.attr("action"), Some("session-info"));

    let ping = jingle.first_element().expect("ping child");
    assert_eq!(ping.name(), &QName::new("urn:example:ping", "ping"));
    assert_eq!(
        ping.attr_qualified(&QName::new("urn:example:ping", "seq")),
        Some("3")
    );
    assert_eq!(ping.attr("seq"), None);

    Ok(())
}

#[test]
fn test_write_emits_namespace_only_on_change() -> Result<()> {
    let mut reason = XmlElement::new(QName::new(NS_JINGLE, "reason"));
    reason.add_child(XmlElement::new(QName::new(NS_JINGLE, "decline")));
    let mut text = XmlElement::new(QName::new(NS_JINGLE, "text"));
    text.set_attr_qualified(QName::new(NS_XML, "lang"), "en");
    text.add_text("busy & away");
    reason.add_child(text);

    let xml = reason.to_xml_string()?;
    assert_eq!(
        xml,
        r#"<reason xmlns="urn:xmpp:jingle:1"><decline/><text xml:lang="en">busy &amp; away</text></reason>"#
    );

    let parsed = XmlElement::parse(&xml)?;
    assert_eq!(parsed, reason);

    Ok(())
}

#[test]
fn test_missing_attribute_names_field() {
    let elem = XmlElement::new(QName::local("candidate")).with_attr("name", "rtp");

    if let Err(err) = elem.require_attr("port") {
        assert_eq!(err, Error::ErrMissingAttribute("port".to_owned()));
    } else {
        panic!("expected error, but got ok");
    }
}

#[test]
fn test_parse_rejects_malformed_documents() {
    let tests = vec![
        ("empty", ""),
        ("unclosed", "<iq><query>"),
        ("undeclared prefix", "<iq a:b='c'/>"),
    ];

    for (name, xml) in tests {
        assert!(XmlElement::parse(xml).is_err(), "{name} should fail");
    }
}

#[test]
fn test_text_concatenates_direct_children() -> Result<()> {
    let elem: XmlElement = "<redirect>xmpp:<b>x</b>bob@example.com</redirect>".parse()?;
    assert_eq!(elem.text(), "xmpp:bob@example.com");
    Ok(())
}
