use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub tools: ToolsConfig,
    /// Maximum upload size in bytes
    pub max_upload_size: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding uploaded source files
    pub upload_dir: PathBuf,
    /// Directory holding converted files awaiting download
    pub output_dir: PathBuf,
    /// Files older than this are removed by a sweep (seconds)
    pub retention_seconds: u64,
    /// How often to sweep in the background (seconds). 0 disables it.
    pub sweep_interval_seconds: u64,
}

/// Locations of the external programs some conversions shell out to.
#[derive(Debug, Clone)]
pub struct ToolsConfig {
    pub ffmpeg: String,
    pub mutool: String,
    pub pdftoppm: String,
    pub soffice: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("./uploads"),
            output_dir: PathBuf::from("./outputs"),
            retention_seconds: 3600,
            sweep_interval_seconds: 0,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            mutool: "mutool".to_string(),
            pdftoppm: "pdftoppm".to_string(),
            soffice: "soffice".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let bind_address = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| {
            match std::env::var("PORT") {
                Ok(port) => format!("0.0.0.0:{port}"),
                Err(_) => ServerConfig::default().bind_address,
            }
        });

        let data_dir = PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| ".".to_string()));
        let upload_dir = std::env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("uploads"));
        let output_dir = std::env::var("OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("outputs"));

        let retention_seconds = std::env::var("RETENTION_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3600); // 1 hour

        let sweep_interval_seconds = std::env::var("SWEEP_INTERVAL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        let max_upload_size = std::env::var("MAX_UPLOAD_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(100 * 1024 * 1024); // 100MB

        let defaults = ToolsConfig::default();
        let tools = ToolsConfig {
            ffmpeg: std::env::var("FFMPEG_PATH").unwrap_or(defaults.ffmpeg),
            mutool: std::env::var("MUTOOL_PATH").unwrap_or(defaults.mutool),
            pdftoppm: std::env::var("PDFTOPPM_PATH").unwrap_or(defaults.pdftoppm),
            soffice: std::env::var("SOFFICE_PATH").unwrap_or(defaults.soffice),
        };

        let config = Config {
            server: ServerConfig { bind_address },
            storage: StorageConfig {
                upload_dir,
                output_dir,
                retention_seconds,
                sweep_interval_seconds,
            },
            tools,
            max_upload_size,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.upload_dir == self.storage.output_dir {
            return Err(ConfigError::ValidationError(
                "UPLOAD_DIR and OUTPUT_DIR must be different directories".to_string(),
            ));
        }

        if self.max_upload_size == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_UPLOAD_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.storage.sweep_interval_seconds > 0
            && self.storage.sweep_interval_seconds > self.storage.retention_seconds
        {
            tracing::warn!(
                "Sweep interval {}s exceeds retention window {}s; \
                 files may outlive the retention window.",
                self.storage.sweep_interval_seconds,
                self.storage.retention_seconds
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(storage: StorageConfig) -> Config {
        Config {
            server: ServerConfig::default(),
            storage,
            tools: ToolsConfig::default(),
            max_upload_size: 1024,
        }
    }

    #[test]
    fn test_validate_rejects_shared_directory() {
        let config = config_with(StorageConfig {
            upload_dir: PathBuf::from("/tmp/files"),
            output_dir: PathBuf::from("/tmp/files"),
            ..Default::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(config_with(StorageConfig::default()).validate().is_ok());
    }
}
