//! file-converter - A file conversion service with session-scoped file lifecycle
//!
//! This crate provides upload, conversion and one-shot download of documents,
//! images and audio with:
//! - Collision-free storage names confined to flat upload and output stores
//! - A closed registry of conversions with ordered fallback strategies
//! - Delete-on-delivery for single files and zip bundles
//! - Session cleanup and age-based sweeping of unclaimed files

pub mod api;
pub mod config;
pub mod conversion;
pub mod lifecycle;
pub mod naming;
pub mod session;
pub mod store;
#[cfg(test)]
pub mod testutil;

use config::Config;
use lifecycle::FileLifecycleManager;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub files: FileLifecycleManager,
}
