//! Postgres-backed task queue.
//!
//! Tasks are rows in `tasks`. The worker pool claims them with
//! `FOR UPDATE SKIP LOCKED`, so any number of API processes can run a pool
//! against the same database.

pub mod context;
pub mod queue;

pub use context::{empty_context_weak, TaskHandlerContext};
pub use queue::{SubmitTask, TaskQueue, TaskQueueConfig, MAX_RETRY_BACKOFF_SECS};
