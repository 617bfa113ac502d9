#![warn(rust_2018_idioms)]

pub mod candidate;
pub mod client;
pub mod constants;
pub mod content;
pub mod manager;
pub mod message;
pub mod session;
pub mod transport;

pub use candidate::{Candidate, CandidateProtocol, CandidateType, Candidates};
pub use client::{SignalingClient, SignalingClientBuilder, SignalingCommand, SignalingContext};
pub use content::{ContentInfo, ContentParser, SessionDescription};
pub use manager::{SessionClient, SessionManager, SessionManagerConfig, SessionManagerEvent};
pub use message::SignalingProtocol;
pub use session::{Session, SessionError, SessionEvent, SessionState};
