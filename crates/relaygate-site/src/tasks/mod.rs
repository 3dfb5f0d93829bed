//! In-memory per-relay task queues.
//!
//! Tasks are short-lived work items the site hands to relays. Each relay
//! owns a bounded FIFO queue; tasks expire `task_ttl` seconds after creation
//! and are purged lazily whenever the queue is touched. A background sweeper
//! reclaims memory for relays that stopped polling.

mod clock;
mod model;
mod repository;
mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use model::{ConfigSerial, Task, TaskSpec, TaskStatus};
pub use repository::{TaskError, TaskLimits, TasksRepository};
pub use sweeper::spawn_task_sweeper;
