//! One-shot delivery of stored files.
//!
//! A [`Delivery`] owns the files it streams. Whatever happens to the body
//! (fully sent, client gone, response dropped), the files are deleted when
//! the body is dropped.

use std::collections::HashSet;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tempfile::TempPath;
use tokio_util::io::ReaderStream;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::LifecycleError;

/// A file (or a bundle of files) ready to be streamed to a client.
pub struct Delivery {
    pub file_name: String,
    pub content_type: String,
    pub content_length: u64,
    body: DeliveryBody,
}

impl Delivery {
    pub(super) async fn open(
        path: &Path,
        file_name: String,
        cleanup: CleanupGuard,
    ) -> Result<Self, LifecycleError> {
        let file = tokio::fs::File::open(path).await?;
        let content_length = file.metadata().await?.len();
        let content_type = mime_guess::from_path(&file_name)
            .first_or_octet_stream()
            .to_string();

        Ok(Self {
            file_name,
            content_type,
            content_length,
            body: DeliveryBody {
                stream: ReaderStream::new(file),
                _cleanup: cleanup,
            },
        })
    }

    pub fn into_body(self) -> DeliveryBody {
        self.body
    }

    /// Read the whole delivery into memory, finishing it.
    pub async fn into_bytes(self) -> std::io::Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.content_length as usize);
        let mut body = self.body;
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

/// Byte stream of a delivery. Dropping it deletes the delivered files.
pub struct DeliveryBody {
    // Declared first so the file handle closes before cleanup runs
    stream: ReaderStream<tokio::fs::File>,
    _cleanup: CleanupGuard,
}

impl Stream for DeliveryBody {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.stream).poll_next(cx)
    }
}

/// Deletes delivered files on drop. Failures are logged, never raised.
pub(super) struct CleanupGuard {
    paths: Vec<PathBuf>,
    archive: Option<TempPath>,
}

impl CleanupGuard {
    pub(super) fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            archive: None,
        }
    }

    pub(super) fn with_archive(paths: Vec<PathBuf>, archive: TempPath) -> Self {
        Self {
            paths,
            archive: Some(archive),
        }
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        for path in &self.paths {
            match std::fs::remove_file(path) {
                Ok(()) => tracing::debug!(path = %path.display(), "Deleted delivered file"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to delete delivered file")
                }
            }
        }
        if let Some(archive) = self.archive.take() {
            let path = archive.to_path_buf();
            if let Err(e) = archive.close() {
                tracing::warn!(path = %path.display(), error = %e, "Failed to delete bundle archive");
            }
        }
    }
}

/// Write a zip of `entries` (source path, entry name) into a private
/// temporary file under `dir`. The archive is removed if building fails.
pub(super) fn build_bundle(
    dir: &Path,
    entries: &[(PathBuf, String)],
) -> Result<TempPath, LifecycleError> {
    let (file, archive) = tempfile::Builder::new()
        .prefix(".bundle-")
        .suffix(".zip")
        .tempfile_in(dir)?
        .into_parts();

    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let mut used = HashSet::new();

    for (path, name) in entries {
        zip.start_file(unique_entry_name(name, &mut used), options)?;
        let mut source = std::fs::File::open(path)?;
        std::io::copy(&mut source, &mut zip)?;
    }
    zip.finish()?.flush()?;

    Ok(archive)
}

/// Entry names must be unique within an archive: `a.png`, `a (2).png`, ...
fn unique_entry_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }

    let (stem, extension) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{ext}")),
        _ => (name, String::new()),
    };
    (2..)
        .map(|n| format!("{stem} ({n}){extension}"))
        .find(|candidate| used.insert(candidate.clone()))
        .unwrap_or_else(|| name.to_string())
}
