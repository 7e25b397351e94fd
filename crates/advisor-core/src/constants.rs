//! Application-wide constants.

use uuid::Uuid;

pub const API_VERSION: &str = "v1";
pub const API_PREFIX: &str = "/api/v1";

/// A report may fail generation at most this many times before it needs a new CSV.
pub const MAX_REPORT_RETRIES: i32 = 5;

/// Identity used when a request authenticates with the master API key.
/// Stable across deployments and distinct from `Uuid::nil()`.
pub const SYSTEM_USER_ID: Uuid = Uuid::from_u128(0x5a1d_7c3e_9b2f_4e6a_8d0c_1f3b5e7a9c2d);

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;
/// Highest page number honoured. Larger values read as this page, which
/// keeps `(page - 1) * page_size` far from overflow.
pub const MAX_PAGE_NUMBER: i64 = 1_000_000;

/// Row errors listed in a rejected CSV upload.
pub const MAX_REPORTED_ROW_ERRORS: usize = 20;

pub const DEFAULT_CURRENCY: &str = "USD";
