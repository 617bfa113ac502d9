use shared::error::{Error, Result};
use shared::{QName, XmlElement};

use super::*;
use crate::candidate::Candidates;
use crate::content::find_content_by_name;
use crate::transport::{TransportDescription, TransportInfo};

/// The legacy Google dialect: one `<session>` element, a single description
/// and a flat list of candidates.
#[derive(Default, Debug, Copy, Clone)]
pub struct GingleCodec;

impl GingleCodec {
    fn parse_contents(&self, session: &XmlElement, cx: &CodecContext<'_>) -> Result<ContentInfos> {
        let content_elem = require_child_by_local(session, STR_DESCRIPTION)?;
        let content_type = content_elem.name().namespace.as_str();

        let mut contents = vec![];
        if content_type == NS_GINGLE_VIDEO {
            // Audio codecs ride inside the video description; the audio
            // parser gets a copy under its own namespace.
            let mut audio_elem = XmlElement::new(QName::new(NS_GINGLE_AUDIO, STR_DESCRIPTION));
            copy_children(content_elem, &mut audio_elem);
            contents.push(cx.parse_content_info(
                SignalingProtocol::Gingle,
                CN_AUDIO,
                NS_JINGLE_RTP,
                &audio_elem,
            )?);
            contents.push(cx.parse_content_info(
                SignalingProtocol::Gingle,
                CN_VIDEO,
                NS_JINGLE_RTP,
                content_elem,
            )?);
        } else if content_type == NS_GINGLE_AUDIO {
            contents.push(cx.parse_content_info(
                SignalingProtocol::Gingle,
                CN_AUDIO,
                NS_JINGLE_RTP,
                content_elem,
            )?);
        } else {
            contents.push(cx.parse_content_info(
                SignalingProtocol::Gingle,
                CN_OTHER,
                content_type,
                content_elem,
            )?);
        }
        Ok(contents)
    }

    fn parse_candidate(
        &self,
        candidate_elem: &XmlElement,
        content_name: &str,
        cx: &CodecContext<'_>,
        candidates: &mut Candidates,
    ) -> Result<()> {
        let parser = cx.transport_parsers.get(NS_GINGLE_P2P)?;
        let translator = cx
            .translator(content_name)
            .ok_or_else(|| Error::ErrNoCandidateTranslator(content_name.to_owned()))?;
        candidates.push(parser.parse_gingle_candidate(candidate_elem, Some(translator))?);
        Ok(())
    }

    fn write_contents(&self, contents: &[ContentInfo], cx: &CodecContext<'_>) -> Result<XmlElement> {
        match contents {
            [content] => self.write_single(content, cx),
            [content, other] if !cx.is_writable(SignalingProtocol::Gingle, other) => {
                self.write_single(content, cx)
            }
            [audio, video]
                if audio.content_type == NS_JINGLE_RTP && video.content_type == NS_JINGLE_RTP =>
            {
                if audio.rejected || video.rejected {
                    return Err(Error::ErrGingleRejectedContent);
                }
                // audio and video travel as one merged video description
                let audio_elem = cx.write_content_info(SignalingProtocol::Gingle, audio)?;
                let mut video_elem = cx.write_content_info(SignalingProtocol::Gingle, video)?;
                copy_children(&audio_elem, &mut video_elem);
                Ok(video_elem)
            }
            _ => Err(Error::ErrGingleContentCount),
        }
    }

    fn write_single(&self, content: &ContentInfo, cx: &CodecContext<'_>) -> Result<XmlElement> {
        if content.rejected {
            return Err(Error::ErrGingleRejectedContent);
        }
        cx.write_content_info(SignalingProtocol::Gingle, content)
    }
}

fn is_candidate(elem: &XmlElement) -> bool {
    elem.name().local == STR_CANDIDATE
}

impl DialectCodec for GingleCodec {
    fn protocol(&self) -> SignalingProtocol {
        SignalingProtocol::Gingle
    }

    fn action_name(&self, action: ActionType) -> Option<&'static str> {
        match action {
            ActionType::SessionInitiate => Some(GINGLE_ACTION_INITIATE),
            ActionType::SessionInfo => Some(GINGLE_ACTION_INFO),
            ActionType::SessionAccept => Some(GINGLE_ACTION_ACCEPT),
            ActionType::SessionReject => Some(GINGLE_ACTION_REJECT),
            ActionType::SessionTerminate => Some(GINGLE_ACTION_TERMINATE),
            ActionType::TransportInfo => Some(GINGLE_ACTION_CANDIDATES),
            ActionType::DescriptionInfo => Some(GINGLE_ACTION_UPDATE),
            ActionType::TransportAccept => None,
        }
    }

    fn write_action(&self, msg: &SessionMessage, action_elems: Vec<XmlElement>) -> XmlElement {
        let mut session = XmlElement::new(gingle_session_name());
        session.set_attr(ATTR_TYPE, self.action_name(msg.action).unwrap_or_default());
        session.set_attr(ATTR_ID, msg.sid.as_str());
        session.set_attr(ATTR_INITIATOR, msg.initiator.as_str());
        for elem in action_elems {
            session.add_child(elem);
        }
        session
    }

    fn parse_content_message(
        &self,
        action_elem: &XmlElement,
        expect_transports: bool,
        cx: &CodecContext<'_>,
    ) -> Result<SessionInitiate> {
        let contents = self.parse_contents(action_elem, cx)?;
        let transports = if expect_transports {
            self.parse_transport_infos(action_elem, &contents, cx)?
        } else {
            vec![]
        };
        Ok(SessionInitiate {
            contents,
            transports,
            groups: vec![],
        })
    }

    fn write_content_message(
        &self,
        init: &SessionInitiate,
        cx: &CodecContext<'_>,
    ) -> Result<Vec<XmlElement>> {
        let mut elems = vec![self.write_contents(&init.contents, cx)?];
        elems.extend(self.write_transport_infos(&init.transports, cx)?);
        Ok(elems)
    }

    fn parse_session_terminate(&self, action_elem: &XmlElement) -> SessionTerminate {
        let mut term = SessionTerminate::default();
        if let Some(reason) = action_elem.first_element() {
            term.reason = reason.name().local.clone();
            if let Some(debug) = reason.first_element() {
                term.debug_reason = debug.name().local.clone();
            }
        }
        term
    }

    fn write_session_terminate(&self, term: &SessionTerminate) -> Vec<XmlElement> {
        if term.reason.is_empty() {
            return vec![];
        }
        vec![XmlElement::new(QName::new(NS_GINGLE, &term.reason))]
    }

    fn write_description_info(
        &self,
        contents: &[ContentInfo],
        cx: &CodecContext<'_>,
    ) -> Result<Vec<XmlElement>> {
        Ok(vec![self.write_contents(contents, cx)?])
    }

    fn parse_transport_infos(
        &self,
        action_elem: &XmlElement,
        contents: &[ContentInfo],
        cx: &CodecContext<'_>,
    ) -> Result<TransportInfos> {
        let has_audio = find_content_by_name(contents, CN_AUDIO).is_some();
        let has_video = find_content_by_name(contents, CN_VIDEO).is_some();

        // Without media there is nothing to split.
        if !has_audio && !has_video {
            let mut candidates = vec![];
            for candidate_elem in action_elem.child_elements().filter(|e| is_candidate(e)) {
                self.parse_candidate(candidate_elem, CN_OTHER, cx, &mut candidates)?;
            }
            return Ok(vec![TransportInfo::new(
                CN_OTHER,
                TransportDescription::new(NS_GINGLE_P2P, candidates),
            )]);
        }

        let mut audio_candidates = vec![];
        let mut video_candidates = vec![];
        for candidate_elem in action_elem.child_elements().filter(|e| is_candidate(e)) {
            let channel_name = candidate_elem.attr(ATTR_NAME).unwrap_or_default();
            match channel_name {
                GICE_CHANNEL_NAME_RTP | GICE_CHANNEL_NAME_RTCP if has_audio => {
                    self.parse_candidate(candidate_elem, CN_AUDIO, cx, &mut audio_candidates)?
                }
                GICE_CHANNEL_NAME_VIDEO_RTP | GICE_CHANNEL_NAME_VIDEO_RTCP if has_video => {
                    self.parse_candidate(candidate_elem, CN_VIDEO, cx, &mut video_candidates)?
                }
                _ => return Err(Error::ErrUnknownChannelName(channel_name.to_owned())),
            }
        }

        let mut tinfos = vec![];
        if has_audio {
            tinfos.push(TransportInfo::new(
                CN_AUDIO,
                TransportDescription::new(NS_GINGLE_P2P, audio_candidates),
            ));
        }
        if has_video {
            tinfos.push(TransportInfo::new(
                CN_VIDEO,
                TransportDescription::new(NS_GINGLE_P2P, video_candidates),
            ));
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
            let (parser, translator) =
                cx.writer(&tinfo.description.transport_type, &tinfo.content_name)?;
            for candidate in &tinfo.description.candidates {
                elems.push(parser.write_gingle_candidate(candidate, Some(translator))?);
            }
        }
        Ok(elems)
    }
}
