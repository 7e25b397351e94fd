//! The seam between the queue and the code that actually runs tasks.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::{Arc, Weak};

use advisor_core::models::Task;

/// Implemented by the API's application state. The worker holds a weak
/// reference so the queue never keeps the state alive on its own.
///
/// Handlers signal "do not retry" by returning an
/// [`advisor_core::TaskError::unrecoverable`] wrapped in `anyhow`.
#[async_trait]
pub trait TaskHandlerContext: Send + Sync {
    async fn dispatch_task(self: Arc<Self>, task: &Task) -> Result<serde_json::Value>;
}

struct NoopContext;

#[async_trait]
impl TaskHandlerContext for NoopContext {
    async fn dispatch_task(self: Arc<Self>, _task: &Task) -> Result<serde_json::Value> {
        Err(anyhow!("No task handler context available"))
    }
}

/// Dangling context for a queue built before the application state exists.
pub fn empty_context_weak() -> Weak<dyn TaskHandlerContext> {
    let n: Arc<dyn TaskHandlerContext> = Arc::new(NoopContext);
    Arc::downgrade(&n)
}
