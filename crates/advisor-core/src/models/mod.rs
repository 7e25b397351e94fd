//! Data models, one sub-module per domain area.

mod analytics;
mod client;
mod pagination;
mod recommendation;
mod report;
mod share;
mod task;
mod template;
mod user;

pub use analytics::*;
pub use client::*;
pub use pagination::*;
pub use recommendation::*;
pub use report::*;
pub use share::*;
pub use task::*;
pub use template::*;
pub use user::*;
