//! Advisor API Library
//!
//! HTTP handlers, middleware, background task handlers and application setup.

mod api_doc;
mod handlers;
mod middleware;
mod services;
mod task_dispatch;
mod task_handlers;
mod utils;

pub mod auth;
pub mod error;
pub mod setup;
pub mod state;

pub use api_doc::get_openapi_spec;
pub use error::ErrorResponse;
pub use services::ReportPipeline;
pub use task_handlers::TaskHandler;
