use shared::error::{Error, Result};
use shared::{QName, XmlElement};

use super::*;
use crate::content::{ContentGroup, find_content_by_name};
use crate::transport::TransportInfo;

/// The XEP-0166 dialect: one `<jingle>` element carrying `<content>` pairs.
#[derive(Default, Debug, Copy, Clone)]
pub struct JingleCodec;

fn content_name() -> QName {
    QName::new(NS_JINGLE, STR_CONTENT)
}

fn group_name() -> QName {
    QName::new(NS_JINGLE_DRAFT, STR_GROUP)
}

fn reason_name() -> QName {
    QName::new(NS_JINGLE, STR_REASON)
}

fn new_content(name: &str, children: Vec<XmlElement>) -> XmlElement {
    let mut elem = XmlElement::new(content_name());
    elem.set_attr(ATTR_NAME, name);
    elem.set_attr(ATTR_CREATOR, CREATOR_INITIATOR);
    for child in children {
        elem.add_child(child);
    }
    elem
}

impl JingleCodec {
    fn parse_contents(&self, jingle: &XmlElement, cx: &CodecContext<'_>) -> Result<ContentInfos> {
        let mut contents = vec![];
        for pair_elem in jingle.children_named(&content_name()) {
            let name = pair_elem.require_attr(ATTR_NAME)?;
            let content_elem = require_child_by_local(pair_elem, STR_DESCRIPTION)?;
            let content_type = content_elem.name().namespace.clone();
            contents.push(cx.parse_content_info(
                SignalingProtocol::Jingle,
                name,
                &content_type,
                content_elem,
            )?);
        }
        Ok(contents)
    }

    fn parse_groups(&self, jingle: &XmlElement) -> Result<ContentGroups> {
        let mut groups = vec![];
        for pair_elem in jingle.children_named(&group_name()) {
            let mut group = ContentGroup::new(pair_elem.require_attr(ATTR_TYPE)?);
            for child in pair_elem.children_named(&content_name()) {
                group.add_content_name(child.require_attr(ATTR_NAME)?);
            }
            groups.push(group);
        }
        Ok(groups)
    }

    fn parse_transport_info(
        &self,
        trans_elem: &XmlElement,
        content_name: &str,
        cx: &CodecContext<'_>,
    ) -> Result<TransportInfo> {
        let parser = cx.transport_parsers.get(&trans_elem.name().namespace)?;
        // A missing translator only fails once a candidate needs it.
        let description = parser.parse_transport_description(trans_elem, cx.translator(content_name))?;
        Ok(TransportInfo::new(content_name, description))
    }

    fn write_transport_info(&self, tinfo: &TransportInfo, cx: &CodecContext<'_>) -> Result<XmlElement> {
        let (parser, translator) = cx.writer(&tinfo.description.transport_type, &tinfo.content_name)?;
        parser.write_transport_description(&tinfo.description, Some(translator))
    }

    fn write_group(&self, contents: &[ContentInfo], groups: &ContentGroups) -> Option<XmlElement> {
        if groups.is_empty() {
            return None;
        }
        let mut group = XmlElement::new(group_name());
        group.set_attr(ATTR_TYPE, GROUP_TYPE_BUNDLE);
        for content in contents {
            let mut child = XmlElement::new(content_name());
            child.set_attr(ATTR_NAME, content.name.as_str());
            group.add_child(child);
        }
        Some(group)
    }
}

impl DialectCodec for JingleCodec {
    fn protocol(&self) -> SignalingProtocol {
        SignalingProtocol::Jingle
    }

    fn action_name(&self, action: ActionType) -> Option<&'static str> {
        let name = match action {
            ActionType::SessionInitiate => JINGLE_ACTION_SESSION_INITIATE,
            ActionType::SessionInfo => JINGLE_ACTION_SESSION_INFO,
            ActionType::SessionAccept => JINGLE_ACTION_SESSION_ACCEPT,
            // there is no reject in this dialect
            ActionType::SessionReject | ActionType::SessionTerminate => {
                JINGLE_ACTION_SESSION_TERMINATE
            }
            ActionType::TransportInfo => JINGLE_ACTION_TRANSPORT_INFO,
            ActionType::TransportAccept => JINGLE_ACTION_TRANSPORT_ACCEPT,
            ActionType::DescriptionInfo => JINGLE_ACTION_DESCRIPTION_INFO,
        };
        Some(name)
    }

    fn write_action(&self, msg: &SessionMessage, action_elems: Vec<XmlElement>) -> XmlElement {
        let mut jingle = XmlElement::new(jingle_name());
        jingle.set_attr(ATTR_ACTION, self.action_name(msg.action).unwrap_or_default());
        jingle.set_attr(ATTR_SID, msg.sid.as_str());
        if msg.action == ActionType::SessionInitiate {
            jingle.set_attr(ATTR_INITIATOR, msg.initiator.as_str());
        }
        for elem in action_elems {
            jingle.add_child(elem);
        }
        jingle
    }

    fn parse_content_message(
        &self,
        action_elem: &XmlElement,
        expect_transports: bool,
        cx: &CodecContext<'_>,
    ) -> Result<SessionInitiate> {
        let contents = self.parse_contents(action_elem, cx)?;
        let groups = self.parse_groups(action_elem)?;
        let transports = if expect_transports {
            self.parse_transport_infos(action_elem, &contents, cx)?
        } else {
            vec![]
        };
        Ok(SessionInitiate {
            contents,
            transports,
            groups,
        })
    }

    fn write_content_message(
        &self,
        init: &SessionInitiate,
        cx: &CodecContext<'_>,
    ) -> Result<Vec<XmlElement>> {
        let mut elems = vec![];
        for content in init.contents.iter().filter(|c| !c.rejected) {
            let tinfo = init
                .transports
                .iter()
                .find(|t| t.content_name == content.name)
                .ok_or_else(|| Error::ErrParse(format!("No transport for content: {}", content.name)))?;

            let description = cx.write_content_info(SignalingProtocol::Jingle, content)?;
            let transport = self.write_transport_info(tinfo, cx)?;
            elems.push(new_content(&content.name, vec![description, transport]));
        }
        if let Some(group) = self.write_group(&init.contents, &init.groups) {
            elems.push(group);
        }
        Ok(elems)
    }

    fn parse_session_terminate(&self, action_elem: &XmlElement) -> SessionTerminate {
        let mut term = SessionTerminate::default();
        if let Some(reason) = action_elem
            .first_named(&reason_name())
            .and_then(|r| r.first_element())
        {
            term.reason = reason.name().local.clone();
        }
        term
    }

    fn write_session_terminate(&self, term: &SessionTerminate) -> Vec<XmlElement> {
        if term.reason.is_empty() {
            return vec![];
        }
        let reason = XmlElement::new(reason_name())
            .with_child(XmlElement::new(QName::new(NS_JINGLE, &term.reason)));
        vec![reason]
    }

    fn write_description_info(
        &self,
        contents: &[ContentInfo],
        cx: &CodecContext<'_>,
    ) -> Result<Vec<XmlElement>> {
        let mut elems = vec![];
        for content in contents.iter().filter(|c| !c.rejected) {
            let description = cx.write_content_info(SignalingProtocol::Jingle, content)?;
            elems.push(new_content(&content.name, vec![description]));
        }
        Ok(elems)
    }

    fn parse_transport_infos(
        &self,
        action_elem: &XmlElement,
        contents: &[ContentInfo],
        cx: &CodecContext<'_>,
    ) -> Result<TransportInfos> {
        let mut tinfos = vec![];
        for pair_elem in action_elem.children_named(&content_name()) {
            let name = pair_elem.require_attr(ATTR_NAME)?;
            let content = find_content_by_name(contents, name)
                .ok_or_else(|| Error::ErrUnknownContentName(name.to_owned()))?;
            let trans_elem = require_child_by_local(pair_elem, STR_TRANSPORT)?;
            tinfos.push(self.parse_transport_info(trans_elem, &content.name, cx)?);
        }
        Ok(tinfos)
    }

    fn write_transport_infos(
        &self,
        tinfos: &TransportInfos,
        cx: &CodecContext<'_>,
    ) -> Result<Vec<XmlElement>> {
        let mut elems = vec![];
        for tinfo in tinfos {
            let transport = self.write_transport_info(tinfo, cx)?;
            elems.push(new_content(&tinfo.content_name, vec![transport]));
        }
        Ok(elems)
    }
}
