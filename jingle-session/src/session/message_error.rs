use std::fmt;

use shared::constants::*;
use shared::error::Error;

/// The stanza error condition an inbound action is refused with.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StanzaErrorCondition {
    BadRequest,
    NotAllowed,
    NotAcceptable,
    ItemNotFound,
    ServiceUnavailable,
}

impl StanzaErrorCondition {
    /// Local name of the condition element in the stanza error namespace.
    pub fn as_str(&self) -> &'static str {
        match *self {
            StanzaErrorCondition::BadRequest => COND_BAD_REQUEST,
            StanzaErrorCondition::NotAllowed => COND_NOT_ALLOWED,
            StanzaErrorCondition::NotAcceptable => COND_NOT_ACCEPTABLE,
            StanzaErrorCondition::ItemNotFound => COND_ITEM_NOT_FOUND,
            StanzaErrorCondition::ServiceUnavailable => COND_SERVICE_UNAVAILABLE,
        }
    }
}

impl fmt::Display for StanzaErrorCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A refused inbound action, answered with an `iq` error of this condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageError {
    pub condition: StanzaErrorCondition,
    pub error_type: String,
    pub text: String,
}

impl MessageError {
    pub fn new(condition: StanzaErrorCondition, text: impl Into<String>) -> Self {
        MessageError {
            condition,
            error_type: ERROR_TYPE_MODIFY.to_owned(),
            text: text.into(),
        }
    }

    pub fn bad_request(text: impl Into<String>) -> Self {
        MessageError::new(StanzaErrorCondition::BadRequest, text)
    }

    pub fn not_allowed(text: impl Into<String>) -> Self {
        MessageError::new(StanzaErrorCondition::NotAllowed, text)
    }

    pub fn not_acceptable(text: impl Into<String>) -> Self {
        MessageError::new(StanzaErrorCondition::NotAcceptable, text)
    }
}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.condition, self.error_type, self.text)
    }
}

impl From<Error> for MessageError {
    fn from(err: Error) -> Self {
        match err {
            Error::ErrUnsupportedTransport(_)
            | Error::ErrNoContentParser(_)
            | Error::ErrUnknownContentType(_) => MessageError::not_acceptable(err.to_string()),
            _ => MessageError::bad_request(err.to_string()),
        }
    }
}
