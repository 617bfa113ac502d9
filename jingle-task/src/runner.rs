
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use log::{trace, warn};
use shared::error::{Error, Result};
use slab::Slab;

use crate::parent::TaskParent;
use crate::task::{Step, Task, TaskCore, TaskHandle, TaskState};

/// Notifications for the host event loop.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TaskRunnerEvent {
    /// The earliest armed deadline moved; the host should re-arm its timer.
    NextTimeoutChanged(Option<Instant>),
    /// A task's timeout expired and its timeout handler ran.
    TaskTimedOut(TaskHandle),
}

pub(crate) struct TaskEntry<C> {
    pub(crate) core: TaskCore,
    pub(crate) registry: TaskParent,
    pub(crate) handler: Option<Box<dyn Task<C>>>,
}

/// TaskRunner owns every task and steps them cooperatively.
///
/// This object performs no I/O and never reads the clock: the host feeds time in
/// with [`TaskRunner::poll_tasks`] or [`TaskRunner::set_now`], drives passes with
/// [`TaskRunner::run_tasks`] whenever [`TaskRunner::needs_run`] reports pending
/// wake-ups, and arms its own timer from [`TaskRunner::next_task_timeout`].
///
/// Tasks live in an arena. Ownership is the arena entry plus the registration in
/// the parent's child set; tasks refer to their parent only by handle. A task is
/// collected at the end of the pass in which it finished.
pub struct TaskRunner<C> {
    pub(crate) tasks: Slab<TaskEntry<C>>,
    /// Started tasks in registration order.
    pub(crate) order: Vec<TaskHandle>,
    root: TaskParent,
    next_id: u64,
    now: Instant,
    wake_pending: bool,
    running: bool,
    next_timeout: Option<Instant>,
    events: VecDeque<TaskRunnerEvent>,
}

impl<C> TaskRunner<C> {
    pub fn new(now: Instant) -> Self {
        TaskRunner {
            tasks: Slab::new(),
            order: vec![],
            root: TaskParent::default(),
            next_id: 0,
            now,
            wake_pending: false,
            running: false,
            next_timeout: None,
            events: VecDeque::new(),
        }
    }

    /// Current time as seen by tasks.
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Advances the runner clock. Time never moves backwards.
    pub fn set_now(&mut self, now: Instant) {
        if now > self.now {
            self.now = now;
        }
    }

    /// Registers a task under `parent`, or under the root when `None`.
    /// The task stays in `Init` until [`TaskRunner::start`].
    pub fn add_task(
        &mut self,
        parent: Option<TaskHandle>,
        task: Box<dyn Task<C>>,
    ) -> Result<TaskHandle> {
        if let Some(parent) = parent {
            let entry = self.entry(parent).ok_or(Error::ErrTaskNotFound)?;
            if entry.core.done {
                return Err(Error::ErrTaskStopped);
            }
        }

        self.next_id += 1;
        let id = self.next_id;
        let index = self.tasks.insert(TaskEntry {
            core: TaskCore::new(id, parent),
            registry: TaskParent::default(),
            handler: Some(task),
        });
        let handle = TaskHandle { index, id };
        self.registry_mut(parent)
            .ok_or(Error::ErrTaskNotFound)?
            .add_child(handle);
        trace!("{handle} added under {parent:?}");
        Ok(handle)
    }

    /// Starts a task; only allowed while it is still in `Init`.
    pub fn start(&mut self, handle: TaskHandle) -> Result<()> {
        let now = self.now;
        let entry = self.entry_mut(handle).ok_or(Error::ErrTaskNotFound)?;
        if entry.core.started || entry.core.state != TaskState::Init || entry.core.done {
            return Err(Error::ErrTaskAlreadyStarted);
        }
        entry.core.started = true;
        entry.core.start_time = Some(now);
        self.order.push(handle);
        self.update_task_timeout();
        self.wake_tasks();
        Ok(())
    }

    /// Adds and starts a task in one go.
    pub fn spawn(
        &mut self,
        parent: Option<TaskHandle>,
        task: Box<dyn Task<C>>,
    ) -> Result<TaskHandle> {
        let handle = self.add_task(parent, task)?;
        self.start(handle)?;
        Ok(handle)
    }

    pub fn contains(&self, handle: TaskHandle) -> bool {
        self.entry(handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn state(&self, handle: TaskHandle) -> Option<TaskState> {
        self.entry(handle).map(|e| e.core.state)
    }

    pub fn is_done(&self, handle: TaskHandle) -> bool {
        self.entry(handle).is_none_or(|e| e.core.done)
    }

    pub fn is_blocked(&self, handle: TaskHandle) -> bool {
        self.entry(handle).is_none_or(|e| e.core.blocked)
    }

    pub fn has_error(&self, handle: TaskHandle) -> bool {
        self.entry(handle).is_some_and(|e| e.core.error)
    }

    pub fn is_aborted(&self, handle: TaskHandle) -> bool {
        self.entry(handle).is_some_and(|e| e.core.aborted)
    }

    pub fn start_time(&self, handle: TaskHandle) -> Option<Instant> {
        self.entry(handle).and_then(|e| e.core.start_time)
    }

    pub fn parent(&self, handle: TaskHandle) -> Option<TaskHandle> {
        self.entry(handle).and_then(|e| e.core.parent)
    }

    /// Children of `parent`, or of the root when `None`.
    pub fn children(&self, parent: Option<TaskHandle>) -> &[TaskHandle] {
        self.registry(parent).map(|r| r.children()).unwrap_or(&[])
    }

    /// Whether any child of `parent` (or of the root) stopped in error.
    pub fn child_error(&self, parent: Option<TaskHandle>) -> bool {
        self.registry(parent).is_some_and(|r| r.child_error())
    }

    /// Deadline of the task's armed timeout, if one is running.
    pub fn deadline(&self, handle: TaskHandle) -> Option<Instant> {
        self.entry(handle).and_then(|e| e.core.deadline)
    }

    /// The earliest armed deadline among live tasks.
    pub fn next_task_timeout(&self) -> Option<Instant> {
        self.next_timeout
    }

    /// Whether some task was woken since the last pass.
    pub fn needs_run(&self) -> bool {
        self.wake_pending
    }

    pub fn poll_event(&mut self) -> Option<TaskRunnerEvent> {
        self.events.pop_front()
    }

    /// Clears `blocked` so the next pass steps the task. No-op once done.
    pub fn wake(&mut self, handle: TaskHandle) {
        let Some(entry) = self.entry_mut(handle) else {
            return;
        };
        if entry.core.done {
            return;
        }
        if entry.core.blocked {
            entry.core.blocked = false;
            self.wake_tasks();
        }
    }

    /// Flags an asynchronous error; the task moves to `Error` on its next step.
    pub fn error(&mut self, handle: TaskHandle) {
        let Some(entry) = self.entry_mut(handle) else {
            return;
        };
        if entry.core.error || entry.core.done {
            return;
        }
        entry.core.error = true;
        self.wake(handle);
    }

    /// Aborts a task and, depth-first, all of its descendants.
    pub fn abort(&mut self, handle: TaskHandle) {
        self.abort_with(handle, false);
    }

    /// Aborts every task registered under the root.
    pub fn abort_all(&mut self) {
        let children = self.root.children().to_vec();
        for child in children {
            self.abort_with(child, true);
        }
        self.wake_tasks();
    }

    /// Arms (or with `None` disarms) the task's timeout. The deadline counts
    /// from now and restarts on every state change.
    pub fn set_timeout(&mut self, handle: TaskHandle, timeout: Option<Duration>) {
        if let Some(entry) = self.entry_mut(handle) {
            entry.core.timeout = timeout;
            self.reset_timeout(handle);
        }
    }

    pub fn clear_timeout(&mut self, handle: TaskHandle) {
        if let Some(entry) = self.entry_mut(handle) {
            entry.core.deadline = None;
            self.update_task_timeout();
        }
    }

    pub fn suspend_timeout(&mut self, handle: TaskHandle) {
        if let Some(entry) = self.entry_mut(handle) {
            if !entry.core.timeout_suspended {
                entry.core.timeout_suspended = true;
                self.reset_timeout(handle);
            }
        }
    }

    pub fn resume_timeout(&mut self, handle: TaskHandle) {
        if let Some(entry) = self.entry_mut(handle) {
            if entry.core.timeout_suspended {
                entry.core.timeout_suspended = false;
                self.reset_timeout(handle);
            }
        }
    }

    pub fn timed_out(&self, handle: TaskHandle) -> bool {
        self.entry(handle).is_some_and(|e| e.core.timed_out(self.now))
    }

    /// Advances the clock and wakes every task whose deadline has passed, then
    /// runs a pass if anything is pending.
    pub fn poll_tasks(&mut self, now: Instant, app: &mut C) {
        self.set_now(now);
        let expired: Vec<TaskHandle> = self
            .tasks
            .iter()
            .filter(|(_, e)| !e.core.done && e.core.timed_out(self.now))
            .map(|(index, e)| TaskHandle { index, id: e.core.id })
            .collect();
        for handle in expired {
            self.wake(handle);
        }
        if self.wake_pending {
            self.run_tasks(app);
        }
    }

    /// Steps every unblocked task, in registration order, until a full pass
    /// makes no progress; then collects finished tasks.
    pub fn run_tasks(&mut self, app: &mut C) {
        if self.running {
            return;
        }
        self.running = true;
        let previous_timeout = self.next_timeout;

        loop {
            self.wake_pending = false;
            let mut progressed = false;
            let mut i = 0;
            while i < self.order.len() {
                let handle = self.order[i];
                while self.is_runnable(handle) {
                    self.step(handle, app);
                    progressed = true;
                }
                i += 1;
            }
            if !progressed {
                break;
            }
        }

        self.collect_finished();
        self.running = false;
        self.check_for_timeout_change(previous_timeout);
    }

    fn is_runnable(&self, handle: TaskHandle) -> bool {
        self.entry(handle)
            .is_some_and(|e| e.core.started && !e.core.blocked)
    }

    fn step(&mut self, handle: TaskHandle, app: &mut C) {
        let now = self.now;
        let Some(entry) = self.entry_mut(handle) else {
            return;
        };

        if entry.core.done {
            warn!("{handle} stepped after it finished");
            entry.core.blocked = true;
            return;
        }

        if entry.core.error {
            entry.core.done = true;
            entry.core.state = TaskState::Error;
            entry.core.blocked = true;
            self.stop(handle);
            return;
        }

        let Some(mut handler) = entry.handler.take() else {
            return;
        };
        let state = entry.core.state;
        let timed_out = entry.core.timed_out(now);
        entry.core.busy = true;

        let next = {
            let mut cx = TaskContext {
                handle,
                runner: self,
                app,
            };
            if timed_out {
                cx.runner.clear_timeout(handle);
                let next = handler.on_timeout(&mut cx);
                cx.runner
                    .events
                    .push_back(TaskRunnerEvent::TaskTimedOut(handle));
                next
            } else {
                handler.process(state, &mut cx)
            }
        };

        let Some(entry) = self.entry_mut(handle) else {
            return;
        };
        entry.handler = Some(handler);
        entry.core.busy = false;

        if entry.core.aborted {
            self.abort_with(handle, true);
            return;
        }

        match next {
            Step::Blocked => entry.core.blocked = true,
            Step::Next(state) => {
                trace!("{handle}: {} -> {state}", entry.core.state);
                entry.core.state = state;
                entry.core.blocked = false;
                match state {
                    TaskState::Done => entry.core.done = true,
                    TaskState::Error => {
                        entry.core.done = true;
                        entry.core.error = true;
                    }
                    _ => {}
                }
                self.reset_timeout(handle);
            }
        }

        if self.entry(handle).is_some_and(|e| e.core.done) {
            self.stop(handle);
            if let Some(entry) = self.entry_mut(handle) {
                entry.core.blocked = true;
            }
        }
    }

    pub(crate) fn abort_with(&mut self, handle: TaskHandle, nowake: bool) {
        let Some(entry) = self.entry_mut(handle) else {
            return;
        };
        // aborted without done means a deferred abort still has to run
        if entry.core.done {
            return;
        }
        entry.core.aborted = true;
        if entry.core.busy {
            return;
        }
        entry.core.done = true;
        entry.core.blocked = true;
        entry.core.error = true;
        // done is set before stop so this runs once per task
        self.stop(handle);
        if !nowake {
            self.wake_tasks();
        }
    }

    /// Aborts children depth-first, then detaches from the parent.
    fn stop(&mut self, handle: TaskHandle) {
        let children = match self.entry(handle) {
            Some(entry) => entry.registry.children().to_vec(),
            None => return,
        };
        for child in children {
            self.abort_with(child, true);
        }

        let Some(entry) = self.entry_mut(handle) else {
            return;
        };
        entry.core.deadline = None;
        let parent = entry.core.parent;
        let had_error = entry.core.error;
        if let Some(handler) = entry.handler.as_mut() {
            handler.on_stop();
        }
        if let Some(registry) = self.registry_mut(parent) {
            registry.on_child_stopped(handle, had_error);
        }
        self.update_task_timeout();
        trace!("{handle} stopped, error: {had_error}");
    }

    fn collect_finished(&mut self) {
        let finished: Vec<usize> = self
            .tasks
            .iter()
            .filter(|(_, e)| e.core.done && !e.core.busy)
            .map(|(index, _)| index)
            .collect();
        if finished.is_empty() {
            return;
        }
        for index in &finished {
            self.tasks.remove(*index);
        }
        let tasks = &self.tasks;
        self.order
            .retain(|h| tasks.get(h.index).is_some_and(|e| e.core.id == h.id));
        self.update_task_timeout();
    }

    pub(crate) fn reset_timeout(&mut self, handle: TaskHandle) {
        let now = self.now;
        if let Some(entry) = self.entry_mut(handle) {
            entry.core.reset_deadline(now);
            self.update_task_timeout();
        }
    }

    fn update_task_timeout(&mut self) {
        let previous = self.next_timeout;
        self.next_timeout = self
            .tasks
            .iter()
            .filter(|(_, e)| !e.core.done)
            .filter_map(|(_, e)| e.core.deadline)
            .min();
        if !self.running {
            self.check_for_timeout_change(previous);
        }
    }

    fn check_for_timeout_change(&mut self, previous: Option<Instant>) {
        if self.next_timeout != previous {
            self.events
                .push_back(TaskRunnerEvent::NextTimeoutChanged(self.next_timeout));
        }
    }

    fn wake_tasks(&mut self) {
        self.wake_pending = true;
    }

    pub(crate) fn entry(&self, handle: TaskHandle) -> Option<&TaskEntry<C>> {
        self.tasks
            .get(handle.index)
            .filter(|e| e.core.id == handle.id)
    }

    pub(crate) fn entry_mut(&mut self, handle: TaskHandle) -> Option<&mut TaskEntry<C>> {
        self.tasks
            .get_mut(handle.index)
            .filter(|e| e.core.id == handle.id)
    }

    fn registry(&self, parent: Option<TaskHandle>) -> Option<&TaskParent> {
        match parent {
            Some(handle) => self.entry(handle).map(|e| &e.registry),
            None => Some(&self.root),
        }
    }

    fn registry_mut(&mut self, parent: Option<TaskHandle>) -> Option<&mut TaskParent> {
        match parent {
            Some(handle) => self.entry_mut(handle).map(|e| &mut e.registry),
            None => Some(&mut self.root),
        }
    }
}

/// What a task sees while one of its state-transition functions runs.
pub struct TaskContext<'a, C> {
    handle: TaskHandle,
    runner: &'a mut TaskRunner<C>,
    app: &'a mut C,
}

impl<'a, C> TaskContext<'a, C> {
    /// Handle of the task being stepped.
    pub fn handle(&self) -> TaskHandle {
        self.handle
    }

    pub fn now(&self) -> Instant {
        self.runner.now()
    }

    pub fn app(&self) -> &C {
        &*self.app
    }

    pub fn app_mut(&mut self) -> &mut C {
        &mut *self.app
    }

    pub fn runner(&mut self) -> &mut TaskRunner<C> {
        &mut *self.runner
    }

    /// Arms this task's timeout; see [`TaskRunner::set_timeout`].
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.runner.set_timeout(self.handle, Some(timeout));
    }

    pub fn clear_timeout(&mut self) {
        self.runner.clear_timeout(self.handle);
    }

    pub fn suspend_timeout(&mut self) {
        self.runner.suspend_timeout(self.handle);
    }

    pub fn resume_timeout(&mut self) {
        self.runner.resume_timeout(self.handle);
    }

    pub fn elapsed(&self) -> Duration {
        self.runner
            .start_time(self.handle)
            .map(|start| self.runner.now().saturating_duration_since(start))
            .unwrap_or_default()
    }

    /// Adds and starts a child of this task.
    pub fn spawn(&mut self, task: Box<dyn Task<C>>) -> Result<TaskHandle> {
        self.runner.spawn(Some(self.handle), task)
    }

    pub fn children(&self) -> &[TaskHandle] {
        self.runner.children(Some(self.handle))
    }

    pub fn child_error(&self) -> bool {
        self.runner.child_error(Some(self.handle))
    }

    /// Aborts this task once the current step returns.
    pub fn abort(&mut self) {
        self.runner.abort_with(self.handle, false);
    }

    pub fn abort_all_children(&mut self) {
        let children = self.children().to_vec();
        for child in children {
            self.runner.abort_with(child, true);
        }
    }
}
