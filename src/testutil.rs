//! Shared test helpers for file-converter unit tests.

use std::sync::Arc;

use crate::config::{Config, ServerConfig, StorageConfig, ToolsConfig};
use crate::conversion::Executor;
use crate::lifecycle::FileLifecycleManager;
use crate::session::InMemorySessionStore;
use crate::store::FileStore;
use crate::AppState;

/// Create a test AppState with upload and output stores in a temporary directory.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    test_state_with_limit(temp_dir, 10 * 1024 * 1024) // 10MB for tests
}

/// Like [`test_state`] with a custom upload size limit in bytes.
pub fn test_state_with_limit(temp_dir: &tempfile::TempDir, max_upload_size: u64) -> Arc<AppState> {
    let upload_dir = temp_dir.path().join("uploads");
    let output_dir = temp_dir.path().join("outputs");

    let config = Config {
        server: ServerConfig {
            bind_address: "127.0.0.1:0".to_string(),
        },
        storage: StorageConfig {
            upload_dir: upload_dir.clone(),
            output_dir: output_dir.clone(),
            ..Default::default()
        },
        tools: ToolsConfig::default(),
        max_upload_size,
    };

    let uploads = FileStore::new(&upload_dir).expect("Failed to create test upload store");
    let outputs = FileStore::new(&output_dir).expect("Failed to create test output store");
    let files = FileLifecycleManager::new(
        uploads,
        outputs,
        Arc::new(InMemorySessionStore::new()),
        Arc::new(Executor::new(config.tools.clone())),
    );

    Arc::new(AppState { config, files })
}

/// Encode a solid-colour JPEG of the given size.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::from_pixel(width, height, image::Rgb([200, 30, 90]));
    let mut buf = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut buf, image::ImageFormat::Jpeg)
        .expect("Failed to encode test JPEG");
    buf.into_inner()
}
