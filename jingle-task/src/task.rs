use std::fmt;
use std::time::{Duration, Instant};

use crate::protocol::ProtocolTask;
use crate::runner::TaskContext;

/// TaskState is the stored state of a [`Task`].
///
/// Every task starts in `Init`, moves to `Start` once the runner first steps it,
/// and ends in `Done` or `Error`. Anything between is up to the task itself:
/// `Response` is the conventional "waiting for a reply" state and `Custom`
/// carries caller-defined states.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TaskState {
    #[default]
    Init,
    Start,
    Response,
    Custom(u16),
    Done,
    Error,
}

const TASK_STATE_INIT_STR: &str = "init";
const TASK_STATE_START_STR: &str = "start";
const TASK_STATE_RESPONSE_STR: &str = "response";
const TASK_STATE_DONE_STR: &str = "done";
const TASK_STATE_ERROR_STR: &str = "error";

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TaskState::Init => write!(f, "{TASK_STATE_INIT_STR}"),
            TaskState::Start => write!(f, "{TASK_STATE_START_STR}"),
            TaskState::Response => write!(f, "{TASK_STATE_RESPONSE_STR}"),
            TaskState::Custom(n) => write!(f, "custom({n})"),
            TaskState::Done => write!(f, "{TASK_STATE_DONE_STR}"),
            TaskState::Error => write!(f, "{TASK_STATE_ERROR_STR}"),
        }
    }
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Done | TaskState::Error)
    }

    /// Timeouts only run while a task is between `Init` and its terminal state.
    pub(crate) fn allows_timeout(&self) -> bool {
        !matches!(self, TaskState::Init | TaskState::Done | TaskState::Error)
    }
}

/// The result of one state-transition function call.
///
/// `Blocked` is the pseudo-state: the stored state stays as it is and the task
/// sleeps until something wakes it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Step {
    Blocked,
    Next(TaskState),
}

impl From<TaskState> for Step {
    fn from(state: TaskState) -> Self {
        Step::Next(state)
    }
}

/// A generation-checked reference to a task living in a [`TaskRunner`].
///
/// `id` is unique for the lifetime of the runner, so a handle kept after its
/// task has been collected never resolves to whatever reuses the arena slot.
///
/// [`TaskRunner`]: crate::runner::TaskRunner
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    pub(crate) index: usize,
    pub(crate) id: u64,
}

impl TaskHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.id)
    }
}

/// Task is one finite-state machine of cooperative work.
///
/// The runner calls [`Task::process`] with the current state whenever the task
/// is not blocked. Implementations return the next state, or [`Step::Blocked`]
/// to sleep until woken by an inbound stanza, a child, or a timeout.
///
/// `C` is the host context the runner was driven with; tasks reach it through
/// [`TaskContext::app`] and [`TaskContext::app_mut`].
pub trait Task<C> {
    fn process_start(&mut self, cx: &mut TaskContext<'_, C>) -> Step;

    fn process_response(&mut self, _cx: &mut TaskContext<'_, C>) -> Step {
        Step::Next(TaskState::Done)
    }

    fn process_custom(&mut self, _state: u16, _cx: &mut TaskContext<'_, C>) -> Step {
        Step::Next(TaskState::Error)
    }

    fn process(&mut self, state: TaskState, cx: &mut TaskContext<'_, C>) -> Step {
        match state {
            TaskState::Init => Step::Next(TaskState::Start),
            TaskState::Start => self.process_start(cx),
            TaskState::Response => self.process_response(cx),
            TaskState::Custom(n) => self.process_custom(n, cx),
            TaskState::Done | TaskState::Error => Step::Blocked,
        }
    }

    /// Called instead of [`Task::process`] once the armed timeout expires.
    fn on_timeout(&mut self, _cx: &mut TaskContext<'_, C>) -> Step {
        Step::Next(TaskState::Done)
    }

    /// Called once when the task stops, after its children were aborted.
    fn on_stop(&mut self) {}

    fn as_protocol(&mut self) -> Option<&mut dyn ProtocolTask> {
        None
    }
}

/// Per-task bookkeeping kept by the runner, separate from the boxed handler so
/// it stays reachable while the handler is executing.
#[derive(Debug)]
pub(crate) struct TaskCore {
    pub(crate) id: u64,
    pub(crate) parent: Option<TaskHandle>,
    pub(crate) state: TaskState,
    pub(crate) started: bool,
    pub(crate) blocked: bool,
    pub(crate) done: bool,
    pub(crate) aborted: bool,
    pub(crate) busy: bool,
    pub(crate) error: bool,
    pub(crate) start_time: Option<Instant>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) deadline: Option<Instant>,
    pub(crate) timeout_suspended: bool,
}

impl TaskCore {
    pub(crate) fn new(id: u64, parent: Option<TaskHandle>) -> Self {
        TaskCore {
            id,
            parent,
            state: TaskState::Init,
            started: false,
            blocked: false,
            done: false,
            aborted: false,
            busy: false,
            error: false,
            start_time: None,
            timeout: None,
            deadline: None,
            timeout_suspended: false,
        }
    }

    pub(crate) fn timed_out(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(deadline) if self.timeout.is_some() && now >= deadline)
    }

    /// Recomputes the deadline from the armed duration and the current state.
    pub(crate) fn reset_deadline(&mut self, now: Instant) {
        self.deadline = match self.timeout {
            Some(timeout) if self.state.allows_timeout() && !self.timeout_suspended => {
                Some(now + timeout)
            }
            _ => None,
        };
    }
}
