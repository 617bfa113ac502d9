use crate::task::TaskHandle;

/// The child registry carried by every task and by the runner root.
///
/// Children hold their parent only as a handle; the registry entry is what
/// keeps a child attached to the tree.
#[derive(Default, Debug, Clone)]
pub struct TaskParent {
    children: Vec<TaskHandle>,
    child_error: bool,
}

impl TaskParent {
    pub fn children(&self) -> &[TaskHandle] {
        &self.children
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Whether any child stopped in error.
    pub fn child_error(&self) -> bool {
        self.child_error
    }

    pub(crate) fn add_child(&mut self, child: TaskHandle) {
        self.children.push(child);
    }

    pub(crate) fn on_child_stopped(&mut self, child: TaskHandle, had_error: bool) {
        if had_error {
            self.child_error = true;
        }
        self.children.retain(|h| *h != child);
    }
}
