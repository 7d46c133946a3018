mod admin;
mod files;

use crate::api::response::ApiError;
use crate::conversion::ConversionError;
use crate::lifecycle::LifecycleError;

pub use admin::{cleanup, cleanup_session, health};
pub use files::{convert_file, download_file, download_zip, list_conversions, upload_file};

/// Map a LifecycleError to an ApiError
fn lifecycle_error(e: LifecycleError) -> ApiError {
    match e {
        LifecycleError::NoFile | LifecycleError::EmptyFilename | LifecycleError::InvalidName(_) => {
            ApiError::bad_request(e.to_string())
        }
        LifecycleError::NotFound(_) => ApiError::not_found("File not found"),
        LifecycleError::Conversion(ConversionError::UnknownConversion(_)) => {
            ApiError::bad_request(e.to_string())
        }
        LifecycleError::Conversion(ConversionError::NotImplemented(_)) => {
            ApiError::not_implemented(e.to_string())
        }
        LifecycleError::Conversion(ConversionError::Failed { .. }) => {
            tracing::warn!(error = %e, "Conversion failed");
            ApiError::internal(e.to_string())
        }
        LifecycleError::Archive(_) | LifecycleError::Io(_) => {
            tracing::error!(error = %e, "Request failed");
            ApiError::internal(e.to_string())
        }
    }
}
