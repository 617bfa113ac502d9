use std::time::Duration;

use log::{debug, trace, warn};
use shared::constants::*;
use shared::{Jid, XmlElement};
use task::protocol::match_response_iq;
use task::{HandlerLevel, ProtocolTask, StanzaQueue, Step, Task, TaskContext, TaskState};

use super::SignalingContext;

/// Sends one session request and waits for its acknowledgement.
///
/// A `result` reply is handed to the manager as a response and an `error`
/// reply as a failed send. When nothing arrives before the timeout the send
/// fails without an error stanza.
pub struct SessionSendTask {
    queue: StanzaQueue,
    stanza: XmlElement,
    to: Jid,
    local: Jid,
    timeout: Duration,
}

impl SessionSendTask {
    /// `stanza` must already carry `id` as its correlation id.
    pub fn new(stanza: XmlElement, id: String, local: Jid, timeout: Duration) -> Self {
        let to = stanza
            .attr(ATTR_TO)
            .and_then(|to| Jid::parse(to).ok())
            .unwrap_or_default();
        SessionSendTask {
            queue: StanzaQueue::new(id),
            stanza,
            to,
            local,
            timeout,
        }
    }

    pub fn stanza(&self) -> &XmlElement {
        &self.stanza
    }

    fn matches(&self, stanza: &XmlElement) -> bool {
        if match_response_iq(stanza, &self.to, self.queue.task_id(), &self.local) {
            return true;
        }
        // a request to a bare jid is answered by one of its resources
        self.to.is_bare()
            && stanza.attr(ATTR_ID) == Some(self.queue.task_id())
            && stanza
                .attr(ATTR_FROM)
                .and_then(|from| Jid::parse(from).ok())
                .is_some_and(|from| from.bare() == self.to)
    }
}

impl Task<SignalingContext> for SessionSendTask {
    fn process_start(&mut self, cx: &mut TaskContext<'_, SignalingContext>) -> Step {
        cx.set_timeout(self.timeout);
        if let Err(err) = self.queue.send(cx.app_mut(), self.stanza.clone()) {
            warn!("send {}: {err}", self.queue.task_id());
            return Step::Next(TaskState::Error);
        }
        Step::Next(TaskState::Response)
    }

    fn process_response(&mut self, cx: &mut TaskContext<'_, SignalingContext>) -> Step {
        let Some(response) = self.queue.next_stanza() else {
            return Step::Blocked;
        };
        let manager = cx.app_mut().manager_mut();
        if response.attr(ATTR_TYPE) == Some(IQ_RESULT) {
            trace!("{} acknowledged", self.queue.task_id());
            manager.on_incoming_response(&self.stanza, &response);
        } else {
            debug!("{} failed", self.queue.task_id());
            manager.on_failed_send(&self.stanza, Some(&response));
        }
        Step::Next(TaskState::Done)
    }

    fn on_timeout(&mut self, cx: &mut TaskContext<'_, SignalingContext>) -> Step {
        debug!(
            "{} to {} timed out after {:?}",
            self.queue.task_id(),
            self.to,
            self.timeout
        );
        cx.app_mut()
            .manager_mut()
            .on_failed_send(&self.stanza, None);
        Step::Next(TaskState::Error)
    }

    fn on_stop(&mut self) {
        self.queue.stop();
    }

    fn as_protocol(&mut self) -> Option<&mut dyn ProtocolTask> {
        Some(self)
    }
}

impl ProtocolTask for SessionSendTask {
    fn handler_level(&self) -> HandlerLevel {
        HandlerLevel::Single
    }

    fn handle_stanza(&mut self, stanza: &XmlElement) -> bool {
        if !self.matches(stanza) {
            return false;
        }
        match stanza.attr(ATTR_TYPE) {
            Some(IQ_RESULT) | Some(IQ_ERROR) => {
                self.queue.queue_stanza(stanza);
                true
            }
            _ => false,
        }
    }
}
