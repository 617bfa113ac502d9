use std::fmt;

/// Negotiation state of a [`Session`](super::Session).
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SessionState {
    #[default]
    Init,
    SentInitiate,
    ReceivedInitiate,
    SentAccept,
    ReceivedAccept,
    SentReject,
    ReceivedReject,
    /// Reached once an accept in either direction has been processed.
    InProgress,
    SentTerminate,
    ReceivedTerminate,
    /// The manager dropped the session.
    Deinit,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            SessionState::Init => "init",
            SessionState::SentInitiate => "sent-initiate",
            SessionState::ReceivedInitiate => "received-initiate",
            SessionState::SentAccept => "sent-accept",
            SessionState::ReceivedAccept => "received-accept",
            SessionState::SentReject => "sent-reject",
            SessionState::ReceivedReject => "received-reject",
            SessionState::InProgress => "in-progress",
            SessionState::SentTerminate => "sent-terminate",
            SessionState::ReceivedTerminate => "received-terminate",
            SessionState::Deinit => "deinit",
        };
        write!(f, "{s}")
    }
}

impl SessionState {
    pub fn is_terminated(&self) -> bool {
        matches!(
            self,
            SessionState::SentTerminate | SessionState::ReceivedTerminate | SessionState::Deinit
        )
    }
}

/// Why a session gave up. Any kind other than `None` ends the session with a
/// `general-error` terminate.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SessionError {
    #[default]
    None,
    Time,
    Response,
    Protocol,
    Content,
    Transport,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            SessionError::None => "none",
            SessionError::Time => "time",
            SessionError::Response => "response",
            SessionError::Protocol => "protocol",
            SessionError::Content => "content",
            SessionError::Transport => "transport",
        };
        write!(f, "{s}")
    }
}

/// Which side a transport description pushed down came from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ContentSource {
    Local,
    Remote,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ContentAction {
    Offer,
    Answer,
}
