
use std::collections::VecDeque;

use shared::constants::*;
use shared::error::{Error, Result};
use shared::{Jid, QName, XmlElement};

use crate::runner::TaskRunner;

/// Where a protocol task sits in the inbound dispatch order.
///
/// Stanzas are offered level by level, lowest first. `Peek` handlers see every
/// stanza without consuming it; at any other level the first task that claims a
/// stanza ends dispatch.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HandlerLevel {
    Peek,
    Single,
    Sender,
    Type,
    All,
}

impl HandlerLevel {
    pub const ORDER: [HandlerLevel; 5] = [
        HandlerLevel::Peek,
        HandlerLevel::Single,
        HandlerLevel::Sender,
        HandlerLevel::Type,
        HandlerLevel::All,
    ];
}

/// The stanza-facing half of a task that speaks the signaling protocol.
pub trait ProtocolTask {
    fn handler_level(&self) -> HandlerLevel {
        HandlerLevel::Single
    }

    /// Offers an inbound stanza. Returning true claims it, and the runner wakes
    /// the task so it can pick the stanza up from its queue.
    fn handle_stanza(&mut self, stanza: &XmlElement) -> bool;
}

/// The host side that protocol tasks send through.
pub trait StanzaSink {
    fn send_stanza(&mut self, stanza: XmlElement) -> Result<()>;

    /// A fresh correlation id for an outbound request.
    fn next_id(&mut self) -> String;

    /// The local full address.
    fn jid(&self) -> &Jid;
}

/// Per-task correlation id and inbound queue.
#[derive(Default, Debug, Clone)]
pub struct StanzaQueue {
    task_id: String,
    queue: VecDeque<XmlElement>,
    stopped: bool,
}

impl StanzaQueue {
    pub fn new(task_id: String) -> Self {
        StanzaQueue {
            task_id,
            queue: VecDeque::new(),
            stopped: false,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn queue_stanza(&mut self, stanza: &XmlElement) {
        if !self.stopped {
            self.queue.push_back(stanza.clone());
        }
    }

    pub fn next_stanza(&mut self) -> Option<XmlElement> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Drops queued stanzas and refuses new ones.
    pub fn stop(&mut self) {
        self.stopped = true;
        self.queue.clear();
    }

    pub fn send<S: StanzaSink>(&self, sink: &mut S, stanza: XmlElement) -> Result<()> {
        if self.stopped {
            return Err(Error::ErrTaskStopped);
        }
        sink.send_stanza(stanza)
    }
}

fn iq_name() -> QName {
    QName::new(NS_CLIENT, STR_IQ)
}

pub fn make_iq(iq_type: &str, to: &Jid, id: &str) -> XmlElement {
    let mut iq = XmlElement::new(iq_name());
    if !to.is_empty() {
        iq.set_attr(ATTR_TO, to.to_string());
    }
    iq.set_attr(ATTR_TYPE, iq_type);
    iq.set_attr(ATTR_ID, id);
    iq
}

/// An empty result for an inbound request.
pub fn make_iq_result(request: &XmlElement) -> XmlElement {
    let mut iq = XmlElement::new(iq_name());
    if let Some(from) = request.attr(ATTR_FROM) {
        iq.set_attr(ATTR_TO, from);
    }
    iq.set_attr(ATTR_TYPE, IQ_RESULT);
    if let Some(id) = request.attr(ATTR_ID) {
        iq.set_attr(ATTR_ID, id);
    }
    iq
}

/// Checks the sender of a stanza against `to`, the address a request went to.
/// The server is addressed with an empty jid and may answer as the bare local
/// address or as the local domain.
pub fn match_stanza_from(stanza: &XmlElement, to: &Jid, local: &Jid) -> bool {
    let from = stanza
        .attr(ATTR_FROM)
        .and_then(|f| Jid::parse(f).ok())
        .unwrap_or_default();
    if from == *to {
        return true;
    }
    if !to.is_empty() {
        return false;
    }
    let domain = Jid::new("", local.domain(), "").ok();
    from == local.bare() || Some(&from) == domain.as_ref()
}

/// A response to our request `id` sent to `to`.
pub fn match_response_iq(stanza: &XmlElement, to: &Jid, id: &str, local: &Jid) -> bool {
    if *stanza.name() != iq_name() {
        return false;
    }
    if stanza.attr(ATTR_ID) != Some(id) {
        return false;
    }
    match_stanza_from(stanza, to, local)
}

/// An inbound request of `iq_type` whose first payload is `payload`.
pub fn match_request_iq(stanza: &XmlElement, iq_type: &str, payload: &QName) -> bool {
    *stanza.name() == iq_name()
        && stanza.attr(ATTR_TYPE) == Some(iq_type)
        && stanza.first_named(payload).is_some()
}

impl<C> TaskRunner<C> {
    /// Offers an inbound stanza to started protocol tasks, level by level and in
    /// registration order within a level. Returns whether a non-peek task
    /// claimed it.
    pub fn dispatch_stanza(&mut self, stanza: &XmlElement) -> bool {
        for level in HandlerLevel::ORDER {
            for i in 0..self.order.len() {
                let handle = self.order[i];
                let claimed = match self.entry_mut(handle) {
                    Some(entry) if !entry.core.done => match entry
                        .handler
                        .as_mut()
                        .and_then(|handler| handler.as_protocol())
                    {
                        Some(task) if task.handler_level() == level => {
                            task.handle_stanza(stanza)
                        }
                        _ => false,
                    },
                    _ => false,
                };
                if claimed {
                    self.wake(handle);
                    if level != HandlerLevel::Peek {
                        return true;
                    }
                }
            }
        }
        false
    }
}
