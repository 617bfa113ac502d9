//! XMPP stream level names shared by every signaling layer.

pub const NS_CLIENT: &str = "jabber:client";
pub const NS_STANZA: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";
pub const NS_XML: &str = "http://www.w3.org/XML/1998/namespace";

pub const STR_IQ: &str = "iq";
pub const STR_ERROR: &str = "error";
pub const STR_TEXT: &str = "text";

pub const ATTR_ID: &str = "id";
pub const ATTR_TO: &str = "to";
pub const ATTR_FROM: &str = "from";
pub const ATTR_TYPE: &str = "type";
pub const ATTR_LANG: &str = "lang";

pub const IQ_GET: &str = "get";
pub const IQ_SET: &str = "set";
pub const IQ_RESULT: &str = "result";
pub const IQ_ERROR: &str = "error";

pub const ERROR_TYPE_CANCEL: &str = "cancel";
pub const ERROR_TYPE_CONTINUE: &str = "continue";
pub const ERROR_TYPE_MODIFY: &str = "modify";
pub const ERROR_TYPE_WAIT: &str = "wait";

pub const COND_BAD_REQUEST: &str = "bad-request";
pub const COND_ITEM_NOT_FOUND: &str = "item-not-found";
pub const COND_NOT_ACCEPTABLE: &str = "not-acceptable";
pub const COND_NOT_ALLOWED: &str = "not-allowed";
pub const COND_SERVICE_UNAVAILABLE: &str = "service-unavailable";
pub const COND_UNDEFINED_CONDITION: &str = "undefined-condition";
