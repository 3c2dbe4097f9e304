// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz


use std::fs::File;
use std::io::{ErrorKind, Read, Seek};
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::rejection::JsonRejection;
use axum::extract::multipart::Field;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodRouter, get, post};
use axum::{Json, Router};
use fluxion_firmware_repo::{
    Download, FirmwarePayload, ReleasePublisher, UpdateDecision, UpdateDecisionService,
};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::auth::{self, CredentialVerifier};
use crate::config::EndpointSettings;
use crate::error::{self, ApiError};

pub const UPLOAD_OK: &str = "Firmware and version information uploaded successfully";
pub const UPDATE_REQUIRED: &str = "Update required";
pub const UP_TO_DATE: &str = "Device is up to date";

pub const FIRMWARE_VERSION_HEADER: HeaderName = HeaderName::from_static("x-firmware-version");

const FILE_FIELD: &str = "file";
const VERSION_FIELD: &str = "version";
const DEFAULT_FILE_NAME: &str = "firmware.bin";
const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct AppState {
    pub publisher: Arc<ReleasePublisher>,
    pub decisions: Arc<UpdateDecisionService>,
}

#[derive(Debug, Deserialize)]
pub struct VersionRequest {
    pub version: String,
}

pub fn router(
    state: AppState,
    verifier: Arc<dyn CredentialVerifier>,
    endpoints: EndpointSettings,
    max_upload_bytes: usize,
) -> Router {
    let guarded = |route: MethodRouter<AppState>, requires_auth: bool| {
        if requires_auth {
            route.route_layer(middleware::from_fn_with_state(
                Arc::clone(&verifier),
                auth::require_credential,
            ))
        } else {
            route
        }
    };

    Router::new()
        .route(
            "/upload-firmware",
            guarded(
                post(upload_firmware).layer(DefaultBodyLimit::max(max_upload_bytes)),
                endpoints.upload_requires_auth,
            ),
        )
        .route(
            "/check-update",
            guarded(post(check_update), endpoints.check_update_requires_auth),
        )
        .route(
            "/download-firmware",
            guarded(post(download_firmware), endpoints.download_requires_auth),
        )
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn upload_firmware(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<&'static str, ApiError> {
    let mut file: Option<(String, File)> = None;
    let mut version: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().map(ToOwned::to_owned);
        match field_name.as_deref() {
            Some(FILE_FIELD) => {
                let name = field.file_name().unwrap_or(DEFAULT_FILE_NAME).to_owned();
                file = Some((name, spool_field(field).await?));
            }
            Some(VERSION_FIELD) => version = Some(field.text().await?),
            other => debug!(field = ?other, "Ignoring multipart field"),
        }
    }

    let (file_name, mut spool) =
        file.ok_or_else(|| ApiError::BadRequest("Missing firmware file field".to_owned()))?;
    let version = version.ok_or_else(|| ApiError::BadRequest("Missing version field".to_owned()))?;

    let publisher = Arc::clone(&state.publisher);
    let published = tokio::task::spawn_blocking(move || {
        spool.rewind().map_err(spool_failed)?;
        publisher
            .publish(spool, &file_name, &version)
            .map_err(error::upload_error)
    })
    .await
    .map_err(|e| error::task_failed(&e))??;

    info!(
        key = published.release.key,
        version = %published.release.version,
        size = published.size,
        "Firmware uploaded"
    );
    Ok(UPLOAD_OK)
}

/// Copies a multipart field chunk by chunk into an anonymous temp file, so
/// the upload is never held in memory whole
async fn spool_field(mut field: Field<'_>) -> Result<File, ApiError> {
    let spool = tempfile::tempfile().map_err(spool_failed)?;
    let mut out = tokio::fs::File::from_std(spool);
    while let Some(chunk) = field.chunk().await? {
        out.write_all(&chunk).await.map_err(spool_failed)?;
    }
    out.flush().await.map_err(spool_failed)?;
    Ok(out.into_std().await)
}

fn spool_failed(e: std::io::Error) -> ApiError {
    tracing::error!(error = %e, "Failed to spool firmware upload");
    ApiError::Internal("An error occurred while uploading firmware")
}

async fn check_update(
    State(state): State<AppState>,
    request: Result<Json<VersionRequest>, JsonRejection>,
) -> Result<&'static str, ApiError> {
    let Json(request) = request?;

    let decisions = Arc::clone(&state.decisions);
    let decision = tokio::task::spawn_blocking(move || decisions.check_update(&request.version))
        .await
        .map_err(|e| error::task_failed(&e))?
        .map_err(error::check_update_error)?;

    Ok(match decision {
        UpdateDecision::UpdateRequired { .. } => UPDATE_REQUIRED,
        UpdateDecision::UpToDate { .. } => UP_TO_DATE,
    })
}

async fn download_firmware(
    State(state): State<AppState>,
    request: Result<Json<VersionRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = request?;

    let decisions = Arc::clone(&state.decisions);
    let download =
        tokio::task::spawn_blocking(move || decisions.download_firmware(&request.version))
            .await
            .map_err(|e| error::task_failed(&e))?
            .map_err(error::download_error)?;

    match download {
        Download::Firmware(payload) => {
            info!(
                key = payload.key,
                version = %payload.version,
                file = %payload.file_name,
                len = payload.len,
                "Serving firmware download"
            );
            Ok(firmware_response(payload))
        }
        Download::UpToDate { .. } => Ok(UP_TO_DATE.into_response()),
    }
}

async fn health() -> &'static str {
    "ok"
}

fn firmware_response(payload: FirmwarePayload) -> Response {
    let FirmwarePayload {
        version,
        file_name,
        len,
        reader,
        ..
    } = payload;

    let mut response = Response::new(stream_reader(reader));
    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(CONTENT_LENGTH, HeaderValue::from(len));

    let quoted: String = file_name
        .chars()
        .filter(|c| *c != '"' && *c != '\\')
        .collect();
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{quoted}\"")) {
        headers.insert(CONTENT_DISPOSITION, value);
    }
    if let Ok(value) = HeaderValue::from_str(&version) {
        headers.insert(FIRMWARE_VERSION_HEADER, value);
    }
    response
}

/// Streams a blocking reader as a response body without loading it whole
fn stream_reader(mut reader: Box<dyn Read + Send>) -> Body {
    let (tx, rx) = mpsc::channel::<std::io::Result<Bytes>>(4);

    tokio::task::spawn_blocking(move || {
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let chunk = Bytes::copy_from_slice(buf.get(..n).unwrap_or_default());
                    if tx.blocking_send(Ok(chunk)).is_err() {
                        debug!("Client disconnected during firmware download");
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    let _ = tx.blocking_send(Err(e));
                    break;
                }
            }
        }
    });

    Body::from_stream(ReceiverStream::new(rx))
}
