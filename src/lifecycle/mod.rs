//! The file lifecycle manager.
//!
//! Files move through `uploaded -> converting -> staged -> delivered`. An
//! upload stays in the upload store until its session is cleared or a sweep
//! finds it past the retention window. A converted file sits in the output
//! store until one client downloads it, after which it is deleted.

mod delivery;

pub use delivery::{Delivery, DeliveryBody};

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::conversion::{self, ConversionError, ConversionKind, Converter};
use crate::naming::{self, NamingError};
use crate::session::SessionStore;
use crate::store::{is_private, FileStore, StoreError};
use delivery::CleanupGuard;

/// How many fresh names to try before giving up on a collision.
const MAX_NAME_ATTEMPTS: usize = 8;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("No file provided")]
    NoFile,
    #[error("No file selected")]
    EmptyFilename,
    #[error("Invalid file name: {0}")]
    InvalidName(String),
    #[error("File not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StoreError> for LifecycleError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Io(e) => LifecycleError::Io(e),
            StoreError::Naming(NamingError::InvalidName(name)) => LifecycleError::InvalidName(name),
            StoreError::AlreadyExists(name) => LifecycleError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("storage name already taken: {name}"),
            )),
        }
    }
}

/// An uploaded file as received from the client.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub file_name: Option<String>,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct Upload {
    pub session_id: String,
    pub storage_name: String,
    pub display_name: String,
    pub available_conversions: &'static [ConversionKind],
}

/// A converted file waiting in the output store.
#[derive(Debug, Clone)]
pub struct StagedOutput {
    pub storage_name: String,
    pub display_name: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub uploads: u64,
    pub outputs: u64,
}

pub struct FileLifecycleManager {
    uploads: FileStore,
    outputs: FileStore,
    sessions: Arc<dyn SessionStore>,
    converter: Arc<dyn Converter>,
}

impl FileLifecycleManager {
    pub fn new(
        uploads: FileStore,
        outputs: FileStore,
        sessions: Arc<dyn SessionStore>,
        converter: Arc<dyn Converter>,
    ) -> Self {
        Self {
            uploads,
            outputs,
            sessions,
            converter,
        }
    }

    pub fn uploads(&self) -> &FileStore {
        &self.uploads
    }

    pub fn outputs(&self) -> &FileStore {
        &self.outputs
    }

    pub fn sessions(&self) -> &dyn SessionStore {
        self.sessions.as_ref()
    }

    /// Store an upload and register it under its session, minting a session
    /// id when the client did not supply one.
    pub async fn receive_upload(
        &self,
        session_id: Option<String>,
        file: Option<IncomingFile>,
    ) -> Result<Upload, LifecycleError> {
        let file = file.ok_or(LifecycleError::NoFile)?;
        let original_name = file
            .file_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or(LifecycleError::EmptyFilename)?;

        let session_id = session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let storage_name = self.store_upload(original_name, &file.data).await?;
        self.sessions.track(&session_id, &storage_name);

        let display_name = naming::display_name(&storage_name).to_string();
        let available_conversions =
            conversion::available_conversions(&naming::extension_of(&display_name));

        info!(
            session_id = %session_id,
            storage_name = %storage_name,
            bytes = file.data.len(),
            "File uploaded"
        );

        Ok(Upload {
            session_id,
            storage_name,
            display_name,
            available_conversions,
        })
    }

    /// Convert an upload and stage the result in the output store.
    ///
    /// The upload itself is never modified. On failure nothing is left in the
    /// output store and the client may retry.
    pub async fn request_conversion(
        &self,
        storage_name: &str,
        identifier: &str,
    ) -> Result<StagedOutput, LifecycleError> {
        let input = self.uploads.resolve(storage_name)?;
        if !self.uploads.exists(storage_name).await? {
            return Err(LifecycleError::NotFound(storage_name.to_string()));
        }
        let conversion = conversion::lookup(identifier)?;

        info!(storage_name = %storage_name, conversion = identifier, "Starting conversion");

        let converter = Arc::clone(&self.converter);
        let id = identifier.to_string();
        let raw_output = tokio::task::spawn_blocking(move || converter.convert(&input, &id))
            .await
            .map_err(|e| ConversionError::Failed {
                identifier: identifier.to_string(),
                cause: format!("conversion task failed: {e}"),
            })??;

        let display_name = naming::converted_display_name(
            naming::display_name(storage_name),
            conversion.output_extension,
        );

        match self.stage_output(&raw_output, &display_name).await {
            Ok(output_name) => {
                info!(
                    storage_name = %storage_name,
                    output_name = %output_name,
                    conversion = identifier,
                    "Conversion staged"
                );
                Ok(StagedOutput {
                    storage_name: output_name,
                    display_name,
                })
            }
            Err(e) => {
                remove_quietly(&raw_output).await;
                Err(ConversionError::Failed {
                    identifier: identifier.to_string(),
                    cause: format!("failed to stage output: {e}"),
                }
                .into())
            }
        }
    }

    /// Hand out a staged output exactly once.
    ///
    /// The file is claimed before it is opened, so of two concurrent requests
    /// for the same name one gets the file and the other `NotFound`. The file
    /// is deleted when the returned body is dropped.
    pub async fn download(&self, output_name: &str) -> Result<Delivery, LifecycleError> {
        let claimed = self
            .outputs
            .claim(output_name)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(output_name.to_string()))?;

        debug!(output_name = %output_name, "Delivering file");
        Delivery::open(
            &claimed,
            naming::display_name(output_name).to_string(),
            CleanupGuard::new(vec![claimed.clone()]),
        )
        .await
    }

    /// Deliver every still-existing output in `output_names` as one zip.
    ///
    /// Names that no longer exist (or are not valid storage names) are
    /// skipped. Included files and the archive are deleted when the body is
    /// dropped.
    pub async fn download_bundle(
        &self,
        output_names: &[String],
    ) -> Result<Delivery, LifecycleError> {
        if output_names.is_empty() {
            return Err(LifecycleError::NoFile);
        }

        let mut claimed: Vec<(String, PathBuf)> = Vec::with_capacity(output_names.len());
        for name in output_names {
            match self.outputs.claim(name).await {
                Ok(Some(path)) => claimed.push((name.clone(), path)),
                Ok(None) => debug!(output_name = %name, "Skipping missing bundle entry"),
                Err(StoreError::Naming(e)) => {
                    warn!(output_name = %name, error = %e, "Skipping invalid bundle entry")
                }
                Err(e) => {
                    self.unclaim_all(&claimed).await;
                    return Err(e.into());
                }
            }
        }

        let entries: Vec<(PathBuf, String)> = claimed
            .iter()
            .map(|(name, path)| (path.clone(), naming::display_name(name).to_string()))
            .collect();
        let dir = self.outputs.root().to_path_buf();

        let built = tokio::task::spawn_blocking(move || delivery::build_bundle(&dir, &entries))
            .await
            .map_err(|e| LifecycleError::Io(std::io::Error::other(e)))
            .and_then(|r| r);
        let archive = match built {
            Ok(archive) => archive,
            Err(e) => {
                warn!(error = %e, "Failed to build bundle, restoring files");
                self.unclaim_all(&claimed).await;
                return Err(e);
            }
        };

        let token = uuid::Uuid::new_v4().simple().to_string();
        let file_name = format!("converted_files_{}.zip", &token[..8]);
        debug!(files = claimed.len(), archive = %file_name, "Delivering bundle");

        let archive_path = archive.to_path_buf();
        let paths = claimed.into_iter().map(|(_, path)| path).collect();
        Delivery::open(
            &archive_path,
            file_name,
            CleanupGuard::with_archive(paths, archive),
        )
        .await
    }

    /// Delete every upload tracked for `session_id` and forget the session.
    /// Returns how many files were actually deleted; unknown sessions yield 0.
    pub async fn clear_session(&self, session_id: &str) -> usize {
        let mut deleted = 0;
        for name in self.sessions.take(session_id) {
            match self.uploads.delete(&name).await {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => warn!(storage_name = %name, error = %e, "Failed to delete upload"),
            }
        }

        info!(session_id = %session_id, deleted, "Cleaned up session");
        deleted
    }

    /// Delete every file in both stores whose age reaches `max_age`.
    pub async fn sweep(&self, max_age: Duration) -> Result<SweepStats, LifecycleError> {
        // Ages beyond chrono's range can never be reached
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return Ok(SweepStats::default());
        };
        let now = Utc::now();

        let swept_uploads = sweep_store(&self.uploads, now, max_age).await?;
        let swept_outputs = sweep_store(&self.outputs, now, max_age).await?;
        self.sessions.forget(&swept_uploads);

        let stats = SweepStats {
            uploads: swept_uploads.len() as u64,
            outputs: swept_outputs.len() as u64,
        };
        if stats != SweepStats::default() {
            info!(uploads = stats.uploads, outputs = stats.outputs, "Swept expired files");
        }
        Ok(stats)
    }

    /// Remove claimed files and bundle archives left behind by a previous
    /// process. Only safe before any delivery has started.
    pub async fn discard_abandoned(&self) -> Result<u64, LifecycleError> {
        let mut removed = 0;
        for object in self.outputs.list().await? {
            if !is_private(&object.name) {
                continue;
            }
            let path = self.outputs.root().join(&object.name);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove abandoned file"),
            }
        }
        if removed > 0 {
            info!(removed, "Discarded abandoned deliveries");
        }
        Ok(removed)
    }

    async fn store_upload(&self, original_name: &str, data: &[u8]) -> Result<String, LifecycleError> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let name = naming::store_name(original_name);
            match self.uploads.create(&name, data).await {
                Ok(_) => return Ok(name),
                Err(StoreError::AlreadyExists(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::AlreadyExists(original_name.to_string()).into())
    }

    async fn stage_output(&self, raw_output: &Path, display_name: &str) -> Result<String, StoreError> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let name = naming::store_name(display_name);
            match self.outputs.import(raw_output, &name).await {
                Ok(_) => return Ok(name),
                Err(StoreError::AlreadyExists(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(StoreError::AlreadyExists(display_name.to_string()))
    }

    async fn unclaim_all(&self, claimed: &[(String, PathBuf)]) {
        for (name, path) in claimed {
            if let Err(e) = self.outputs.unclaim(path, name).await {
                warn!(output_name = %name, error = %e, "Failed to restore claimed file");
            }
        }
    }
}

async fn sweep_store(
    store: &FileStore,
    now: DateTime<Utc>,
    max_age: chrono::Duration,
) -> Result<HashSet<String>, LifecycleError> {
    let mut removed = HashSet::new();
    for object in store.list().await? {
        // Deliveries in progress clean up after themselves
        if is_private(&object.name) {
            continue;
        }
        // Clock skew can put mtimes in the future
        let age = now
            .signed_duration_since(object.modified)
            .max(chrono::Duration::zero());
        if age < max_age {
            continue;
        }
        match store.delete(&object.name).await {
            Ok(true) => {
                debug!(store = %store.root().display(), name = %object.name, "Swept file");
                removed.insert(object.name);
            }
            Ok(false) => {}
            Err(e) => warn!(name = %object.name, error = %e, "Failed to sweep file"),
        }
    }
    Ok(removed)
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove file");
        }
    }
}
