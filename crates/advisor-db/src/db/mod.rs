//! Database repositories, one per table.
//!
//! Repositories own a clone of the pool and expose typed queries. Everything
//! except [`TaskRepository`] reports failures as [`advisor_core::AppError`] so
//! handlers can map them to HTTP statuses; the task queue works in `anyhow`.

pub mod analytics;
pub mod client;
pub mod recommendation;
pub mod report;
pub mod share;
pub mod task;
pub mod template;
pub mod user;

pub use analytics::AnalyticsRepository;
pub use client::ClientRepository;
pub use recommendation::RecommendationRepository;
pub use report::{AttachedCsv, NewReport, ReportRepository};
pub use share::ShareRepository;
pub use task::{NewTask, TaskRepository, TASK_NOTIFY_CHANNEL};
pub use template::TemplateRepository;
pub use user::{NewUser, UserRepository};
