use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;

use super::{StoreError, StoredObject};
use crate::naming;

/// Prefix given to files taken out of circulation for delivery.
const CLAIM_PREFIX: &str = ".claimed-";

/// A flat directory of independently named files.
///
/// Every name handed to a `FileStore` goes through [`naming::resolve`], so no
/// operation can reach outside the root.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, std::io::Error> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, name: &str) -> Result<PathBuf, StoreError> {
        Ok(naming::resolve(&self.root, name)?)
    }

    /// Write `data` under a name that must not exist yet.
    pub async fn create(&self, name: &str, data: &[u8]) -> Result<PathBuf, StoreError> {
        let path = self.resolve(name)?;
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = async {
            file.write_all(data).await?;
            file.flush().await
        }
        .await
        {
            drop(file);
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e.into());
        }

        Ok(path)
    }

    pub async fn exists(&self, name: &str) -> Result<bool, StoreError> {
        let path = self.resolve(name)?;
        match tokio::fs::metadata(&path).await {
            Ok(m) => Ok(m.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete `name`. Returns `false` when it was already gone.
    pub async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        let path = self.resolve(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Move a file produced elsewhere into the store under `name`.
    ///
    /// Never replaces an existing file. Links the source in when possible and
    /// falls back to an exclusive copy, e.g. across filesystems. The source
    /// never survives a successful import.
    pub async fn import(&self, source: &Path, name: &str) -> Result<PathBuf, StoreError> {
        let target = self.resolve(name)?;

        match tokio::fs::hard_link(source, &target).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists(name.to_string()))
            }
            Err(_) => self.copy_exclusive(source, &target, name).await?,
        }

        if let Err(e) = tokio::fs::remove_file(source).await {
            tracing::warn!(path = %source.display(), error = %e, "Failed to remove imported source");
        }
        Ok(target)
    }

    async fn copy_exclusive(&self, source: &Path, target: &Path, name: &str) -> Result<(), StoreError> {
        let mut reader = tokio::fs::File::open(source).await?;
        let mut writer = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(target)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = async {
            tokio::io::copy(&mut reader, &mut writer).await?;
            writer.flush().await
        }
        .await
        {
            drop(writer);
            let _ = tokio::fs::remove_file(target).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Atomically take `name` out of circulation.
    ///
    /// The file is renamed to a private name so that only one caller can
    /// claim it. Returns `None` when the name does not exist.
    pub async fn claim(&self, name: &str) -> Result<Option<PathBuf>, StoreError> {
        let path = self.resolve(name)?;
        let claimed = self
            .root
            .join(format!("{CLAIM_PREFIX}{}", uuid::Uuid::new_v4().simple()));

        match tokio::fs::rename(&path, &claimed).await {
            Ok(()) => Ok(Some(claimed)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Put a claimed file back under its original name.
    pub async fn unclaim(&self, claimed: &Path, name: &str) -> Result<(), StoreError> {
        let path = self.resolve(name)?;
        tokio::fs::rename(claimed, &path).await?;
        Ok(())
    }

    /// Every regular file in the store, claimed ones included.
    pub async fn list(&self) -> Result<Vec<StoredObject>, StoreError> {
        let mut objects = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                // Removed between listing and stat
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if !metadata.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let modified: DateTime<Utc> = metadata.modified()?.into();
            objects.push(StoredObject { name, modified });
        }

        Ok(objects)
    }
}
