mod local;

pub use local::FileStore;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::naming::NamingError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Naming(#[from] NamingError),
    #[error("File already exists: {0}")]
    AlreadyExists(String),
}

/// Names the store uses for files in flight (claims, bundle archives).
/// Storage names never start with a dot.
pub fn is_private(name: &str) -> bool {
    name.starts_with('.')
}

/// A file found while listing a store.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub name: String,
    pub modified: DateTime<Utc>,
}
