use log::trace;
use shared::constants::*;
use shared::XmlElement;
use task::{HandlerLevel, ProtocolTask, StanzaQueue, Step, Task, TaskContext};

use super::SignalingContext;
use crate::message::is_session_message;

/// Feeds inbound session requests of either dialect to the session manager.
/// Lives for as long as the client.
#[derive(Default)]
pub struct SessionManagerTask {
    queue: StanzaQueue,
}

impl SessionManagerTask {
    pub fn new() -> Self {
        SessionManagerTask::default()
    }
}

impl Task<SignalingContext> for SessionManagerTask {
    fn process_start(&mut self, cx: &mut TaskContext<'_, SignalingContext>) -> Step {
        while let Some(stanza) = self.queue.next_stanza() {
            trace!(
                "session request {} from {}",
                stanza.attr(ATTR_ID).unwrap_or_default(),
                stanza.attr(ATTR_FROM).unwrap_or_default()
            );
            cx.app_mut().manager_mut().on_incoming_message(&stanza);
        }
        Step::Blocked
    }

    fn on_stop(&mut self) {
        self.queue.stop();
    }

    fn as_protocol(&mut self) -> Option<&mut dyn ProtocolTask> {
        Some(self)
    }
}

impl ProtocolTask for SessionManagerTask {
    fn handler_level(&self) -> HandlerLevel {
        HandlerLevel::Single
    }

    fn handle_stanza(&mut self, stanza: &XmlElement) -> bool {
        if !is_session_message(stanza) {
            return false;
        }
        self.queue.queue_stanza(stanza);
        true
    }
}
