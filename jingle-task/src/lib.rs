#![warn(rust_2018_idioms)]

pub mod parent;
pub mod protocol;
pub mod runner;
pub mod task;

pub use protocol::{HandlerLevel, ProtocolTask, StanzaQueue, StanzaSink};
pub use runner::{TaskContext, TaskRunner, TaskRunnerEvent};
pub use task::{Step, Task, TaskHandle, TaskState};
