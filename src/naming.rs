//! Storage naming and path resolution.
//!
//! Every file the service keeps on disk lives under a storage name of the form
//! `<uuid>_<sanitized original name>`. The random prefix keeps names unique; the
//! suffix lets us recover a readable name for downloads and zip entries.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Name used when sanitization leaves nothing behind.
const FALLBACK_NAME: &str = "unnamed";

/// Separator between the unique token and the display name.
const TOKEN_SEPARATOR: char = '_';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NamingError {
    #[error("Invalid file name: {0}")]
    InvalidName(String),
}

/// Reduce a client-supplied file name to a safe, flat file name.
///
/// Only ASCII letters, digits, `.`, `-` and `_` survive; whitespace and path
/// separators collapse into `_`. Leading and trailing dots/underscores are
/// stripped so the result can never be `.`, `..` or a hidden file.
pub fn sanitize(original: &str) -> String {
    // Browsers on Windows may send the full client path
    let base = original.rsplit(['/', '\\']).next().unwrap_or(original);

    let mut out = String::with_capacity(base.len());
    let mut last_was_gap = false;
    for ch in base.chars() {
        if ch.is_ascii_alphanumeric() || ch == '.' || ch == '-' || ch == '_' {
            out.push(ch);
            last_was_gap = false;
        } else if ch.is_whitespace() && !last_was_gap {
            out.push('_');
            last_was_gap = true;
        }
    }

    let trimmed = out.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Generate a fresh storage name for `original`.
///
/// Uniqueness against a particular store is enforced by the store itself when
/// it creates the file; callers regenerate on collision.
pub fn store_name(original: &str) -> String {
    format!(
        "{}{TOKEN_SEPARATOR}{}",
        uuid::Uuid::new_v4(),
        sanitize(original)
    )
}

/// Recover the human-readable name from a storage name.
///
/// Names that do not carry a token prefix are returned unchanged.
pub fn display_name(storage_name: &str) -> &str {
    match storage_name.split_once(TOKEN_SEPARATOR) {
        Some((token, rest)) if !rest.is_empty() && uuid::Uuid::parse_str(token).is_ok() => rest,
        _ => storage_name,
    }
}

/// Display name for a converted file: the source's stem plus `extension`
/// (which includes its leading dot).
pub fn converted_display_name(source_display_name: &str, extension: &str) -> String {
    let stem = Path::new(source_display_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(FALLBACK_NAME);
    format!("{stem}{extension}")
}

/// Lower-cased extension of a display name including the leading dot, or an
/// empty string when there is none.
pub fn extension_of(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => format!(".{}", ext.to_ascii_lowercase()),
        _ => String::new(),
    }
}

/// Resolve `storage_name` to a path inside `root`.
///
/// This is purely lexical and never touches the filesystem. Any name that is
/// not a single normal path component is rejected.
pub fn resolve(root: &Path, storage_name: &str) -> Result<PathBuf, NamingError> {
    let invalid = || NamingError::InvalidName(storage_name.to_string());

    if storage_name.is_empty()
        || storage_name.contains(['/', '\\', ':', '\0'])
        || storage_name == "."
        || storage_name == ".."
    {
        return Err(invalid());
    }

    let mut components = Path::new(storage_name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == storage_name => {}
        _ => return Err(invalid()),
    }

    let path = root.join(storage_name);
    if path.parent() != Some(root) {
        return Err(invalid());
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_traversal() {
        assert_eq!(sanitize("../../etc/passwd"), "passwd");
        assert_eq!(sanitize("..\\..\\boot.ini"), "boot.ini");
        assert_eq!(sanitize(".."), FALLBACK_NAME);
    }

    #[test]
    fn test_sanitize_whitespace_and_unicode() {
        assert_eq!(sanitize("my  holiday photo.jpg"), "my_holiday_photo.jpg");
        assert_eq!(sanitize("résumé.docx"), "rsum.docx");
        assert_eq!(sanitize("   "), FALLBACK_NAME);
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("Photo.JPG"), ".jpg");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of("README"), "");
    }
}
