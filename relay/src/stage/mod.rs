//! Stage tasks: the extractor → filters → applier loop.

mod progress;
mod schedule;
mod task;

pub use progress::{TaskProgress, TaskProgressSnapshot};
pub use schedule::{Disposition, Schedule};
pub use task::{StageNotification, StageTask, StageTaskHandle};
