// # File Store
//
// File-based implementation of Store with crash recovery.
//
// ## Purpose
//
// Lets the daemon run without an external database: declared rows and
// instance snapshots live in one JSON document that survives restarts.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good state
// - Recovery: Falls back to backup if corruption detected
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "data": {
//     "profiles": [{ "id": 1, "name": "default" }],
//     "resources": [],
//     "dns_providers": [],
//     "router_dns": [],
//     "instance_endpoints": [],
//     "instances": []
//   }
// }
// ```

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use super::StoreData;
use crate::Error;
use crate::model::{
    DnsProviderRow, InstanceEndpoint, InstanceSnapshot, InstanceUpdate, Profile, Protocol,
    ResourceKind, ResourceRow, RouterDnsBinding, RouterDnsLink,
};
use crate::traits::Store;

/// Store file format version
const STORE_FILE_VERSION: &str = "1.0";

/// File-based store with crash recovery
///
/// Every mutation is written through before it returns.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    data: Arc<RwLock<StoreData>>,
}

/// Serializable store file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StoreFileFormat {
    version: String,
    #[serde(default)]
    data: StoreData,
}

/// Why a load failed
enum LoadError {
    /// The file exists but is not a valid store document
    Corrupt(Error),
    /// The file could not be read at all
    Unreadable(Error),
}

impl FileStore {
    /// Create or load a file store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Try to load the existing store file
    /// 3. If it is corrupt, load the backup and restore the file from it
    /// 4. If both fail, start with an empty store
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let data = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            data: Arc::new(RwLock::new(data)),
        })
    }

    async fn load_with_recovery(path: &Path) -> Result<StoreData, Error> {
        let err = match Self::load(path).await {
            Ok(data) => {
                tracing::debug!(
                    "Loaded store from file: {} resources, {} instances",
                    data.resources.len(),
                    data.instances.len()
                );
                return Ok(data);
            }
            Err(LoadError::Unreadable(e)) => return Err(e),
            Err(LoadError::Corrupt(e)) => e,
        };

        tracing::warn!(
            "Store file appears corrupted: {}. Attempting recovery from backup.",
            err
        );

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            tracing::warn!("No backup file found. Starting with empty store.");
            return Ok(StoreData::default());
        }

        match Self::load(&backup_path).await {
            Ok(data) => {
                tracing::info!("Recovered store from backup");
                if let Err(restore_err) = fs::copy(&backup_path, path).await {
                    tracing::error!(
                        "Failed to restore store file from backup: {}",
                        restore_err
                    );
                }
                Ok(data)
            }
            Err(LoadError::Corrupt(e)) | Err(LoadError::Unreadable(e)) => {
                tracing::error!("Backup also unusable: {}. Starting with empty store.", e);
                Ok(StoreData::default())
            }
        }
    }

    async fn load(path: &Path) -> Result<StoreData, LoadError> {
        if !path.exists() {
            tracing::debug!("Store file does not exist: {}", path.display());
            return Ok(StoreData::default());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            LoadError::Unreadable(Error::storage(format!(
                "Failed to read store file {}: {}",
                path.display(),
                e
            )))
        })?;

        let file: StoreFileFormat = serde_json::from_str(&content).map_err(|e| {
            LoadError::Corrupt(Error::storage(format!(
                "Failed to parse store file {}: {}",
                path.display(),
                e
            )))
        })?;

        if file.version != STORE_FILE_VERSION {
            tracing::warn!(
                "Store file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STORE_FILE_VERSION,
                file.version
            );
        }

        Ok(file.data)
    }

    /// Write `data` to disk atomically, keeping the previous file as backup
    async fn persist(&self, data: &StoreData) -> Result<(), Error> {
        let file = StoreFileFormat {
            version: STORE_FILE_VERSION.to_string(),
            data: data.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| Error::storage(format!("Failed to serialize store: {e}")))?;

        let temp_path = self.temp_path();
        {
            let mut out = fs::File::create(&temp_path).await.map_err(|e| {
                Error::storage(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            out.write_all(json.as_bytes()).await.map_err(|e| {
                Error::storage(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            out.flush().await.map_err(|e| {
                Error::storage(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists()
            && let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await
        {
            tracing::warn!("Failed to create backup: {}", e);
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::storage(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Store written to file: {}", self.path.display());
        Ok(())
    }

    /// Apply a mutation and write the result through
    ///
    /// The mutation runs on a copy that replaces the in-memory state only
    /// once it is on disk, so a failed write leaves both sides unchanged.
    async fn mutate<T>(&self, f: impl FnOnce(&mut StoreData) -> T) -> Result<T, Error> {
        let mut guard = self.data.write().await;
        let mut next = (*guard).clone();
        let out = f(&mut next);
        self.persist(&next).await?;
        *guard = next;
        Ok(out)
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }

    pub async fn insert_profile(&self, profile: Profile) -> Result<(), Error> {
        self.mutate(|d| d.insert_profile(profile)).await
    }

    pub async fn upsert_resource(&self, row: ResourceRow) -> Result<(), Error> {
        self.mutate(|d| d.upsert_resource(row)).await
    }

    pub async fn remove_resource(&self, id: i64) -> Result<Option<ResourceRow>, Error> {
        self.mutate(|d| d.remove_resource(id)).await
    }

    pub async fn upsert_dns_provider(&self, row: DnsProviderRow) -> Result<(), Error> {
        self.mutate(|d| d.upsert_dns_provider(row)).await
    }

    pub async fn link_router_dns(&self, link: RouterDnsLink) -> Result<(), Error> {
        self.mutate(|d| d.link_router_dns(link)).await
    }

    pub async fn unlink_router_dns(&self, protocol: Protocol, router_id: i64) -> Result<(), Error> {
        self.mutate(|d| d.unlink_router_dns(protocol, router_id))
            .await
    }

    pub async fn upsert_instance_endpoint(&self, endpoint: InstanceEndpoint) -> Result<(), Error> {
        self.mutate(|d| d.upsert_instance_endpoint(endpoint)).await
    }

    /// Force immediate write to disk
    pub async fn sync(&self) -> Result<(), Error> {
        let guard = self.data.read().await;
        self.persist(&guard).await
    }
}

#[async_trait]
impl Store for FileStore {
    async fn get_profile(&self, id: i64) -> Result<Option<Profile>, Error> {
        Ok(self.data.read().await.profile(id))
    }

    async fn get_profile_by_name(&self, name: &str) -> Result<Option<Profile>, Error> {
        Ok(self.data.read().await.profile_by_name(name))
    }

    async fn list_enabled(
        &self,
        profile_id: i64,
        protocol: Protocol,
        kind: ResourceKind,
    ) -> Result<Vec<ResourceRow>, Error> {
        Ok(self.data.read().await.list_enabled(profile_id, protocol, kind))
    }

    async fn get_dns_provider(&self, id: i64) -> Result<Option<DnsProviderRow>, Error> {
        Ok(self.data.read().await.dns_provider(id))
    }

    async fn list_router_dns_bindings(&self) -> Result<Vec<RouterDnsBinding>, Error> {
        Ok(self.data.read().await.router_dns_bindings())
    }

    async fn list_instance_endpoints(&self, name: &str) -> Result<Vec<InstanceEndpoint>, Error> {
        Ok(self.data.read().await.instance_endpoints(name))
    }

    async fn list_all_instance_endpoints(&self) -> Result<Vec<InstanceEndpoint>, Error> {
        Ok(self.data.read().await.instance_endpoints.clone())
    }

    async fn get_instance(
        &self,
        profile_id: i64,
        name: &str,
    ) -> Result<Option<InstanceSnapshot>, Error> {
        Ok(self.data.read().await.instance(profile_id, name))
    }

    async fn upsert_instance(&self, update: InstanceUpdate) -> Result<InstanceSnapshot, Error> {
        self.mutate(|d| d.upsert_instance(update, Utc::now())).await
    }
}
