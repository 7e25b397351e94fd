#[cfg(feature = "storage-azure")]
use crate::AzureBlobStorage;
#[cfg(feature = "storage-local")]
use crate::LocalStorage;
use crate::{Storage, StorageBackend, StorageError, StorageResult};
use advisor_core::Config;
use std::sync::Arc;

/// Create a storage backend based on configuration
pub async fn create_storage(config: &Config) -> StorageResult<Arc<dyn Storage>> {
    match config.storage_backend() {
        #[cfg(feature = "storage-azure")]
        StorageBackend::Azure => {
            let account = config
                .azure_storage_account()
                .map(String::from)
                .ok_or_else(|| {
                    StorageError::ConfigError("AZURE_STORAGE_ACCOUNT not configured".to_string())
                })?;
            let container = config
                .azure_storage_container()
                .map(String::from)
                .ok_or_else(|| {
                    StorageError::ConfigError("AZURE_STORAGE_CONTAINER not configured".to_string())
                })?;
            let access_key = config.azure_storage_access_key().map(String::from);

            let storage = AzureBlobStorage::new(
                account,
                access_key,
                container,
                config.azure_storage_use_emulator(),
            )?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-azure"))]
        StorageBackend::Azure => Err(StorageError::ConfigError(
            "Azure storage backend not available (storage-azure feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let base_path = config.local_storage_path().map(String::from).ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
            })?;
            let base_url = config
                .local_storage_base_url()
                .map(String::from)
                .ok_or_else(|| {
                    StorageError::ConfigError("LOCAL_STORAGE_BASE_URL not configured".to_string())
                })?;

            let storage = LocalStorage::new(base_path, base_url).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),
    }
}
