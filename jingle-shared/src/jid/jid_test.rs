use super::*;

#[test]
fn test_jid_parse() -> Result<()> {
    let tests = vec![
        ("bob@example.com", "bob", "example.com", ""),
        ("Bob@Example.COM/Phone", "bob", "example.com", "Phone"),
        ("example.com", "", "example.com", ""),
        ("example.com/res/with/slash", "", "example.com", "res/with/slash"),
    ];

    for (input, node, domain, resource) in tests {
        let jid = Jid::parse(input)?;
        assert_eq!(jid.node(), node, "{input}");
        assert_eq!(jid.domain(), domain, "{input}");
        assert_eq!(jid.resource(), resource, "{input}");
    }

    Ok(())
}

#[test]
fn test_jid_parse_invalid() {
    for input in ["", "bob@", "bob@example.com/", "a@b@c"] {
        if let Err(err) = Jid::parse(input) {
            assert_eq!(err, Error::ErrInvalidJid(input.to_owned()));
        } else {
            panic!("expected error for {input}, but got ok");
        }
    }
}

#[test]
fn test_jid_bare_equals() -> Result<()> {
    let phone = Jid::parse("bob@example.com/phone")?;
    let laptop = Jid::parse("BOB@example.com/laptop")?;
    let alice = Jid::parse("alice@example.com/phone")?;

    assert!(phone.bare_equals(&laptop));
    assert!(!phone.bare_equals(&alice));
    assert!(!phone.bare_equals(&Jid::default()));
    assert_eq!(laptop.bare().to_string(), "bob@example.com");
    assert_eq!(phone.to_string(), "bob@example.com/phone");

    Ok(())
}
