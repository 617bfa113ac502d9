//! Namespaces, element names and action strings of both signaling dialects.

pub const NS_JINGLE: &str = "urn:xmpp:jingle:1";
pub const NS_GINGLE: &str = "http://www.google.com/session";
pub const NS_JINGLE_RTP: &str = "urn:xmpp:jingle:apps:rtp:1";
pub const NS_GINGLE_AUDIO: &str = "http://www.google.com/session/phone";
pub const NS_GINGLE_VIDEO: &str = "http://www.google.com/session/video";
pub const NS_GINGLE_P2P: &str = "http://www.google.com/transport/p2p";
pub const NS_JINGLE_DRAFT: &str = "google:jingle";

// Jingle
pub const JINGLE_ACTION_SESSION_INITIATE: &str = "session-initiate";
pub const JINGLE_ACTION_SESSION_INFO: &str = "session-info";
pub const JINGLE_ACTION_SESSION_ACCEPT: &str = "session-accept";
pub const JINGLE_ACTION_SESSION_TERMINATE: &str = "session-terminate";
pub const JINGLE_ACTION_TRANSPORT_INFO: &str = "transport-info";
pub const JINGLE_ACTION_TRANSPORT_ACCEPT: &str = "transport-accept";
pub const JINGLE_ACTION_DESCRIPTION_INFO: &str = "description-info";

// Gingle
pub const GINGLE_ACTION_INITIATE: &str = "initiate";
pub const GINGLE_ACTION_INFO: &str = "info";
pub const GINGLE_ACTION_ACCEPT: &str = "accept";
pub const GINGLE_ACTION_REJECT: &str = "reject";
pub const GINGLE_ACTION_TERMINATE: &str = "terminate";
pub const GINGLE_ACTION_CANDIDATES: &str = "candidates";
pub const GINGLE_ACTION_UPDATE: &str = "update";

pub const STR_JINGLE: &str = "jingle";
pub const STR_SESSION: &str = "session";
pub const STR_CONTENT: &str = "content";
pub const STR_DESCRIPTION: &str = "description";
pub const STR_TRANSPORT: &str = "transport";
pub const STR_CANDIDATE: &str = "candidate";
pub const STR_REASON: &str = "reason";
pub const STR_GROUP: &str = "group";
pub const STR_REDIRECT: &str = "redirect";

pub const ATTR_ACTION: &str = "action";
pub const ATTR_SID: &str = "sid";
pub const ATTR_INITIATOR: &str = "initiator";
pub const ATTR_NAME: &str = "name";
pub const ATTR_CREATOR: &str = "creator";
pub const ATTR_UFRAG: &str = "ufrag";
pub const ATTR_PWD: &str = "pwd";

pub const ATTR_ADDRESS: &str = "address";
pub const ATTR_PORT: &str = "port";
pub const ATTR_PREFERENCE: &str = "preference";
pub const ATTR_USERNAME: &str = "username";
pub const ATTR_PASSWORD: &str = "password";
pub const ATTR_PROTOCOL: &str = "protocol";
pub const ATTR_GENERATION: &str = "generation";
pub const ATTR_NETWORK: &str = "network";

pub const CREATOR_INITIATOR: &str = "initiator";
pub const GROUP_TYPE_BUNDLE: &str = "BUNDLE";

pub const CN_AUDIO: &str = "audio";
pub const CN_VIDEO: &str = "video";
pub const CN_OTHER: &str = "main";

pub const GICE_CHANNEL_NAME_RTP: &str = "rtp";
pub const GICE_CHANNEL_NAME_RTCP: &str = "rtcp";
pub const GICE_CHANNEL_NAME_VIDEO_RTP: &str = "video_rtp";
pub const GICE_CHANNEL_NAME_VIDEO_RTCP: &str = "video_rtcp";

pub const STR_TERMINATE_SUCCESS: &str = "success";
pub const STR_TERMINATE_ERROR: &str = "general-error";
pub const STR_TERMINATE_DECLINE: &str = "decline";

pub const STR_REDIRECT_PREFIX: &str = "xmpp:";

pub const MAX_GICE_USERNAME_SIZE: usize = 16;
pub const MAX_ICE_USERNAME_SIZE: usize = 256;
