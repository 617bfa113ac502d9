use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq, Clone)]
#[non_exhaustive]
pub enum Error {
    #[error("task: not found")]
    ErrTaskNotFound,
    #[error("task: start is only allowed from init")]
    ErrTaskAlreadyStarted,
    #[error("task: stopped")]
    ErrTaskStopped,
    #[error("signaling: client is closed")]
    ErrClientClosed,

    #[error("xml: {0}")]
    ErrXml(String),
    #[error("xml: document has no root element")]
    ErrXmlNoRoot,
    #[error("missing required attribute: {0}")]
    ErrMissingAttribute(String),
    #[error("missing required element: {0}")]
    ErrMissingElement(String),
    #[error("invalid value for {name}: {value}")]
    ErrInvalidAttribute { name: String, value: String },
    #[error("{0}")]
    ErrParse(String),

    #[error("invalid jid: {0}")]
    ErrInvalidJid(String),

    #[error("unsupported transport type: {0}")]
    ErrUnsupportedTransport(String),
    #[error("no candidate translator for content: {0}")]
    ErrNoCandidateTranslator(String),
    #[error("Unknown channel name: {0}")]
    ErrUnknownChannelName(String),
    #[error("unknown component: {0}")]
    ErrUnknownComponent(u16),
    #[error("candidate username is invalid: {0}")]
    ErrInvalidUsername(String),

    #[error("Unknown content name: {0}")]
    ErrUnknownContentName(String),
    #[error("unknown content type: {0}")]
    ErrUnknownContentType(String),
    #[error("no content parser for type: {0}")]
    ErrNoContentParser(String),
    #[error("too many content types")]
    ErrMultipleContentTypes,
    #[error("No contents found")]
    ErrNoContents,
    #[error("Gingle protocol may only have one content.")]
    ErrGingleContentCount,
    #[error("Gingle protocol may not reject individual contents.")]
    ErrGingleRejectedContent,
    #[error("no {0} form in the gingle dialect")]
    ErrGingleUnsupportedAction(String),

    #[error("session: {operation} not allowed in state {state}")]
    ErrSessionInvalidState { operation: String, state: String },
    #[error("session: already terminated")]
    ErrSessionAlreadyTerminated,
    #[error("session: not found: {0}")]
    ErrSessionNotFound(String),
    #[error("session: already exists: {0}")]
    ErrSessionExists(String),
    #[error("session: remote name is not set")]
    ErrNoRemoteName,
    #[error("Redirection not allowed: {0}")]
    ErrRedirectNotAllowed(String),
    #[error("no client registered for content type: {0}")]
    ErrUnknownClient(String),

    #[error("{0}")]
    Other(String),
}
