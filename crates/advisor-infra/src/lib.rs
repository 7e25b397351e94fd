//! Advisor Infrastructure Library
//!
//! Process-level plumbing shared by the API server and the worker:
//! tracing setup, HTTP middleware, the task rate limiter and the periodic
//! cleanup service.

#[cfg(feature = "middleware")]
pub mod middleware;

#[cfg(feature = "observability-basic")]
pub mod telemetry;

#[cfg(feature = "rate-limit")]
pub mod rate_limit;

#[cfg(feature = "cleanup")]
pub mod cleanup;

#[cfg(feature = "middleware")]
pub use middleware::{
    get_request_id, request_id_middleware, security_headers_middleware, RequestId,
    REQUEST_ID_HEADER,
};

#[cfg(feature = "observability-basic")]
pub use telemetry::{init_telemetry, shutdown_telemetry};

#[cfg(feature = "rate-limit")]
pub use rate_limit::RateLimiter;

#[cfg(feature = "cleanup")]
pub use cleanup::{CleanupReport, CleanupService};
