#[cfg(test)]
mod client_test;

pub mod manager_task;
pub mod send_task;

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use shared::constants::*;
use shared::error::{Error, Result};
use shared::{Jid, QName, StanzaMessage, XmlElement};
use task::{StanzaSink, TaskHandle, TaskRunner, TaskRunnerEvent};

use crate::candidate::Candidates;
use crate::content::SessionDescription;
use crate::manager::{
    create_error_message, SessionClient, SessionManager, SessionManagerConfig, SessionManagerEvent,
};
pub use manager_task::SessionManagerTask;
pub use send_task::SessionSendTask;

const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Application requests for [`SignalingClient::handle_event`].
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingCommand {
    Initiate {
        sid: String,
        to: String,
        description: SessionDescription,
    },
    Accept {
        sid: String,
        description: SessionDescription,
    },
    Reject {
        sid: String,
        reason: String,
    },
    Terminate {
        sid: String,
        reason: String,
    },
    Info {
        sid: String,
        elems: Vec<XmlElement>,
    },
    CandidatesReady {
        sid: String,
        content_name: String,
        candidates: Candidates,
    },
}

/// What tasks of a [`SignalingClient`] see: the session manager and the
/// outbound stanza queue.
pub struct SignalingContext {
    jid: Jid,
    next_id: u64,
    send_timeout: Duration,
    manager: SessionManager,
    outgoing: VecDeque<XmlElement>,
}

impl SignalingContext {
    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut SessionManager {
        &mut self.manager
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }
}

impl StanzaSink for SignalingContext {
    fn send_stanza(&mut self, stanza: XmlElement) -> Result<()> {
        self.outgoing.push_back(stanza);
        Ok(())
    }

    fn next_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }

    fn jid(&self) -> &Jid {
        &self.jid
    }
}

pub struct SignalingClientBuilder {
    jid: Option<Jid>,
    send_timeout: Duration,
    manager_config: SessionManagerConfig,
    clients: Vec<(String, Box<dyn SessionClient>)>,
}

impl Default for SignalingClientBuilder {
    fn default() -> Self {
        SignalingClientBuilder::new()
    }
}

impl SignalingClientBuilder {
    pub fn new() -> Self {
        SignalingClientBuilder {
            jid: None,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            manager_config: SessionManagerConfig::default(),
            clients: vec![],
        }
    }

    /// with_local_jid sets the full address sessions are created under.
    pub fn with_local_jid(mut self, jid: Jid) -> Self {
        self.jid = Some(jid);
        self
    }

    /// with_send_timeout sets how long a session request waits for its
    /// acknowledgement.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_manager_config(mut self, config: SessionManagerConfig) -> Self {
        self.manager_config = config;
        self
    }

    /// with_session_client registers the client owning `content_type`.
    pub fn with_session_client(
        mut self,
        content_type: &str,
        client: Box<dyn SessionClient>,
    ) -> Self {
        self.clients.push((content_type.to_owned(), client));
        self
    }

    pub fn build(self, now: Instant) -> Result<SignalingClient> {
        let jid = self
            .jid
            .filter(|jid| !jid.is_empty())
            .ok_or_else(|| Error::ErrInvalidJid("local jid is required".to_owned()))?;
        if self.send_timeout.is_zero() {
            return Err(Error::Other("send timeout must be positive".to_owned()));
        }

        let mut manager = SessionManager::new(self.manager_config);
        for (content_type, client) in self.clients {
            manager.add_client(&content_type, client);
        }

        SignalingClient::new(
            SignalingContext {
                jid,
                next_id: 0,
                send_timeout: self.send_timeout,
                manager,
                outgoing: VecDeque::new(),
            },
            now,
        )
    }
}

/// SignalingClient is the sans-IO session signaling endpoint.
///
/// Inbound stanzas are offered to the task runner, where a
/// [`SessionManagerTask`] routes session requests to the manager. Every
/// request a session sends gets its own [`SessionSendTask`] that waits for the
/// acknowledgement. Acks and error replies go out directly.
pub struct SignalingClient {
    runner: TaskRunner<SignalingContext>,
    context: SignalingContext,
    manager_task: TaskHandle,
    reads: VecDeque<StanzaMessage>,
    events: VecDeque<SessionManagerEvent>,
    closed: bool,
}

impl SignalingClient {
    fn new(mut context: SignalingContext, now: Instant) -> Result<Self> {
        let mut runner: TaskRunner<SignalingContext> = TaskRunner::new(now);
        let manager_task = runner.spawn(None, Box::new(SessionManagerTask::new()))?;
        runner.run_tasks(&mut context);

        let mut client = SignalingClient {
            runner,
            context,
            manager_task,
            reads: VecDeque::new(),
            events: VecDeque::new(),
            closed: false,
        };
        client.drive()?;
        Ok(client)
    }

    pub fn jid(&self) -> &Jid {
        &self.context.jid
    }

    pub fn manager(&self) -> &SessionManager {
        &self.context.manager
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of session requests still waiting for an acknowledgement.
    pub fn pending_requests(&self) -> usize {
        self.runner
            .children(None)
            .iter()
            .filter(|handle| **handle != self.manager_task && !self.runner.is_done(**handle))
            .count()
    }

    /// Creates an outbound session of `content_type` and returns its id.
    pub fn create_session(&mut self, content_type: &str) -> Result<String> {
        if self.closed {
            return Err(Error::ErrClientClosed);
        }
        let local = self.context.jid.to_string();
        let sid = self.context.manager.create_session(&local, content_type)?;
        self.drive()?;
        Ok(sid)
    }

    fn run_command(&mut self, command: SignalingCommand) -> Result<()> {
        let manager = &mut self.context.manager;
        match command {
            SignalingCommand::Initiate {
                sid,
                to,
                description,
            } => manager.initiate(&sid, &to, description),
            SignalingCommand::Accept { sid, description } => manager.accept(&sid, description),
            SignalingCommand::Reject { sid, reason } => manager.reject(&sid, &reason),
            SignalingCommand::Terminate { sid, reason } => manager.terminate(&sid, &reason),
            SignalingCommand::Info { sid, elems } => manager.send_info(&sid, elems),
            SignalingCommand::CandidatesReady {
                sid,
                content_name,
                candidates,
            } => manager.candidates_ready(&sid, &content_name, candidates),
        }
    }

    /// An inbound request nobody claimed.
    fn handle_unclaimed(&mut self, msg: StanzaMessage) {
        let stanza = &msg.stanza;
        if *stanza.name() != QName::new(NS_CLIENT, STR_IQ) {
            self.reads.push_back(msg);
            return;
        }
        match stanza.attr(ATTR_TYPE) {
            Some(IQ_GET) | Some(IQ_SET) => {
                debug!(
                    "no handler for iq {} from {}",
                    stanza.attr(ATTR_ID).unwrap_or_default(),
                    stanza.attr(ATTR_FROM).unwrap_or_default()
                );
                self.context.outgoing.push_back(create_error_message(
                    stanza,
                    &QName::new(NS_STANZA, COND_SERVICE_UNAVAILABLE),
                    ERROR_TYPE_CANCEL,
                    "",
                    None,
                ));
            }
            _ => trace!(
                "dropped unmatched iq {}",
                stanza.attr(ATTR_ID).unwrap_or_default()
            ),
        }
    }

    /// Runs tasks and moves what the manager queued to the wire until nothing
    /// is left to do. Every session request gets a send task of its own.
    fn drive(&mut self) -> Result<()> {
        loop {
            if self.runner.needs_run() {
                self.runner.run_tasks(&mut self.context);
            }

            while let Some(mut stanza) = self.context.manager.poll_outgoing() {
                if stanza.attr(ATTR_TYPE) == Some(IQ_SET) && !self.closed {
                    let id = self.context.next_id();
                    stanza.set_attr(ATTR_ID, id.as_str());
                    let task = SessionSendTask::new(
                        stanza,
                        id,
                        self.context.jid.clone(),
                        self.context.send_timeout,
                    );
                    self.runner.spawn(None, Box::new(task))?;
                } else {
                    if stanza.attr(ATTR_ID).is_none() {
                        stanza.set_attr(ATTR_ID, self.context.next_id().as_str());
                    }
                    self.context.send_stanza(stanza)?;
                }
            }
            while let Some(event) = self.context.manager.poll_event() {
                self.events.push_back(event);
            }
            while let Some(event) = self.runner.poll_event() {
                match event {
                    TaskRunnerEvent::TaskTimedOut(handle) => debug!("{handle} timed out"),
                    TaskRunnerEvent::NextTimeoutChanged(next) => {
                        trace!("next task timeout: {next:?}")
                    }
                }
            }

            if !self.runner.needs_run() {
                return Ok(());
            }
        }
    }
}

impl sansio::Protocol<StanzaMessage, StanzaMessage, SignalingCommand> for SignalingClient {
    type Rout = StanzaMessage;
    type Wout = StanzaMessage;
    type Eout = SessionManagerEvent;
    type Error = Error;
    type Time = Instant;

    /// Offers an inbound stanza to the running tasks. Stanzas no task claims
    /// that are not `iq` come back out of `poll_read`.
    fn handle_read(&mut self, msg: StanzaMessage) -> Result<()> {
        if self.closed {
            return Err(Error::ErrClientClosed);
        }
        self.runner.set_now(msg.now);
        if !self.runner.dispatch_stanza(&msg.stanza) {
            self.handle_unclaimed(msg);
        }
        self.drive()
    }

    fn poll_read(&mut self) -> Option<Self::Rout> {
        self.reads.pop_front()
    }

    /// Sends a stanza the host built itself, untracked.
    fn handle_write(&mut self, msg: StanzaMessage) -> Result<()> {
        if self.closed {
            return Err(Error::ErrClientClosed);
        }
        self.runner.set_now(msg.now);
        self.context.send_stanza(msg.stanza)
    }

    fn poll_write(&mut self) -> Option<Self::Wout> {
        let now = self.runner.now();
        self.context
            .outgoing
            .pop_front()
            .map(|stanza| StanzaMessage::new(now, stanza))
    }

    fn handle_event(&mut self, command: SignalingCommand) -> Result<()> {
        if self.closed {
            return Err(Error::ErrClientClosed);
        }
        let result = self.run_command(command);
        // a refused command may still have queued output
        self.drive()?;
        result
    }

    fn poll_event(&mut self) -> Option<Self::Eout> {
        self.events.pop_front()
    }

    fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.runner.poll_tasks(now, &mut self.context);
        self.drive()
    }

    fn poll_timeout(&mut self) -> Option<Self::Time> {
        self.runner.next_task_timeout()
    }

    /// Aborts every task and terminates every session. The terminate requests
    /// go out but are no longer tracked.
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::ErrClientClosed);
        }
        self.closed = true;
        self.runner.abort_all();
        self.runner.run_tasks(&mut self.context);
        self.context.manager.terminate_all();
        if let Err(err) = self.drive() {
            warn!("close: {err}");
        }
        debug!("{} closed", self.context.jid);
        Ok(())
    }
}
