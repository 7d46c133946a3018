use axum::body::Body;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::lifecycle_error;
use crate::api::response::{ApiError, AppJson, AppQuery, JSend};
use crate::conversion::{self, ConversionKind};
use crate::lifecycle::{Delivery, IncomingFile};
use crate::naming;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub available_conversions: Vec<ConversionKind>,
    pub display_name: String,
    pub session_id: String,
    pub storage_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertRequest {
    #[serde(alias = "unique_filename")]
    pub storage_name: String,
    #[serde(alias = "conversion_type")]
    pub conversion_identifier: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    pub display_name: String,
    pub download_url: String,
    pub output_storage_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadZipRequest {
    #[serde(alias = "filenames")]
    pub output_storage_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionsParams {
    pub file_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionsResponse {
    pub conversions: Vec<ConversionKind>,
    pub file_name: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<JSend<UploadResponse>>, ApiError> {
    let mut file: Option<IncomingFile> = None;
    let mut session_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, state.config.max_upload_size))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                let file_name = field.file_name().map(|s| s.to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error(e, state.config.max_upload_size))?;

                if data.len() as u64 > state.config.max_upload_size {
                    return Err(too_large(state.config.max_upload_size));
                }

                file = Some(IncomingFile { file_name, data });
            }
            "session_id" | "sessionId" => {
                session_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Invalid session id: {e}")))?,
                );
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let upload = state
        .files
        .receive_upload(session_id, file)
        .await
        .map_err(lifecycle_error)?;

    Ok(JSend::success(UploadResponse {
        available_conversions: upload.available_conversions.to_vec(),
        display_name: upload.display_name,
        session_id: upload.session_id,
        storage_name: upload.storage_name,
    }))
}

pub async fn convert_file(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<ConvertRequest>,
) -> Result<Json<JSend<ConvertResponse>>, ApiError> {
    if req.storage_name.is_empty() || req.conversion_identifier.is_empty() {
        return Err(ApiError::bad_request("Missing filename or conversion type"));
    }

    let staged = state
        .files
        .request_conversion(&req.storage_name, &req.conversion_identifier)
        .await
        .map_err(lifecycle_error)?;

    Ok(JSend::success(ConvertResponse {
        download_url: format!("/download/{}", staged.storage_name),
        display_name: staged.display_name,
        output_storage_name: staged.storage_name,
    }))
}

pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let delivery = state.files.download(&name).await.map_err(lifecycle_error)?;
    Ok(attachment(delivery))
}

pub async fn download_zip(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<DownloadZipRequest>,
) -> Result<Response, ApiError> {
    if req.output_storage_names.is_empty() {
        return Err(ApiError::bad_request("No files specified"));
    }

    let delivery = state
        .files
        .download_bundle(&req.output_storage_names)
        .await
        .map_err(lifecycle_error)?;
    Ok(attachment(delivery))
}

pub async fn list_conversions(
    AppQuery(params): AppQuery<ConversionsParams>,
) -> Json<JSend<ConversionsResponse>> {
    let extension = naming::extension_of(&params.file_name);
    JSend::success(ConversionsResponse {
        conversions: conversion::available_conversions(&extension).to_vec(),
        file_name: params.file_name,
    })
}

// ============================================================================
// Helpers
// ============================================================================

/// The body limit surfaces as a multipart read error; keep its 413.
fn multipart_error(e: MultipartError, max_upload_size: u64) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large(max_upload_size)
    } else {
        ApiError::bad_request(format!("Invalid multipart data: {}", e.body_text()))
    }
}

fn too_large(max_upload_size: u64) -> ApiError {
    ApiError::payload_too_large(format!(
        "File exceeds maximum upload size of {max_upload_size} bytes"
    ))
}

/// Stream a delivery as a file download. The delivered files are removed
/// once the body has been sent or abandoned.
fn attachment(delivery: Delivery) -> Response {
    let content_type = delivery.content_type.clone();
    let content_length = delivery.content_length;
    let disposition = format!("attachment; filename=\"{}\"", delivery.file_name);

    let mut response = (StatusCode::OK, Body::from_stream(delivery.into_body())).into_response();
    let headers = response.headers_mut();

    headers.insert(
        header::CONTENT_TYPE,
        content_type
            .parse()
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(content_length));
    if let Ok(value) = disposition.parse() {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    response
}
