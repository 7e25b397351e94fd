//! Advisor Storage Library
//!
//! Blob storage for uploaded CSV exports and rendered reports, behind the
//! [`Storage`] trait with a local filesystem backend and an Azure Blob backend.
//!
//! # Storage key format
//!
//! Every file belonging to a report lives under `reports/{report_id}/`:
//! `source.csv`, `report.html` and `report.pdf`. Keys never contain `..` or a
//! leading `/`. Key generation lives in [`keys`] so all backends agree.

#[cfg(feature = "storage-azure")]
pub mod azure;
pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod traits;

pub use advisor_core::StorageBackend;
#[cfg(feature = "storage-azure")]
pub use azure::AzureBlobStorage;
pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use traits::{ByteStream, Storage, StorageError, StorageResult};
