//! Per-invocation wiring: the store file, the cloud connection and the
//! algorithm and key manager registries.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::core::cloud::Cloud;
use crate::core::keymanager::KmsKeyManager;
use crate::core::secrets::Registries;
use crate::core::store::FileStore;
use crate::error::{CloudError, Error, Result, ValidationError};

/// Path of an in-memory cloud state file. Used by the binary tests.
#[cfg(feature = "test-kms")]
pub const TEST_CLOUD_ENV: &str = "STRONGBOX_TEST_CLOUD";

/// Comma-separated regions the in-memory cloud treats as down.
#[cfg(feature = "test-kms")]
pub const TEST_FAIL_REGIONS_ENV: &str = "STRONGBOX_TEST_FAIL_REGIONS";

/// Open the store named by `--filename`.
pub fn store(filename: Option<PathBuf>) -> Result<FileStore> {
    filename
        .map(FileStore::new)
        .ok_or_else(|| ValidationError::MissingFilename.into())
}

/// Connect to the cloud services.
pub async fn connect() -> Result<Arc<dyn Cloud>> {
    #[cfg(feature = "test-kms")]
    if let Some(path) = std::env::var_os(TEST_CLOUD_ENV) {
        let cloud = crate::core::cloud::memory::MemoryCloud::open(path)?;
        if let Ok(regions) = std::env::var(TEST_FAIL_REGIONS_ENV) {
            for region in regions.split(',').filter(|r| !r.trim().is_empty()) {
                cloud.fail_region(region.trim());
            }
        }
        return Ok(Arc::new(cloud));
    }
    connect_aws().await
}

#[cfg(feature = "aws")]
async fn connect_aws() -> Result<Arc<dyn Cloud>> {
    Ok(Arc::new(crate::core::cloud::AwsCloud::connect().await))
}

#[cfg(not(feature = "aws"))]
async fn connect_aws() -> Result<Arc<dyn Cloud>> {
    Err(CloudError::NotCompiled.into())
}

/// Registries for secret operations.
///
/// The KMS key manager is registered only when a cloud is available, so
/// secrets under `none` keep working in builds without AWS support.
pub async fn registries() -> Result<Registries> {
    let mut registries = Registries::standard();
    match connect().await {
        Ok(cloud) => {
            let default_region = std::env::var("AWS_REGION").ok().filter(|r| !r.is_empty());
            registries
                .key_managers
                .register(Arc::new(KmsKeyManager::new(cloud, default_region)))?;
        }
        Err(Error::Cloud(CloudError::NotCompiled)) => {
            debug!("no cloud support compiled in, kms key manager unavailable");
        }
        Err(e) => return Err(e),
    }
    Ok(registries)
}
