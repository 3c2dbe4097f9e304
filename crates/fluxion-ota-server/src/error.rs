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


//! Translation of repository failures into HTTP responses
//!
//! Every response body is plain text. Each endpoint has its own wording for
//! the "not found" and "internal" cases, so the mapping lives in one function
//! per endpoint.

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fluxion_firmware_repo::RepositoryError;
use tokio::task::JoinError;
use tracing::{error, warn};

pub const UNAUTHORIZED: &str = "Invalid or missing API Key";

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    BadRequest(String),
    NotFound(&'static str),
    Conflict(String),
    Multipart(MultipartError),
    Internal(&'static str),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, UNAUTHORIZED).into_response(),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message).into_response(),
            Self::Conflict(message) => (StatusCode::CONFLICT, message).into_response(),
            Self::Multipart(e) => (e.status(), e.body_text()).into_response(),
            Self::Internal(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        warn!(error = %e, "Malformed multipart upload");
        Self::Multipart(e)
    }
}

/// A blocking task panicked or was cancelled
pub fn task_failed(e: &JoinError) -> ApiError {
    error!(error = %e, "Blocking store task failed");
    ApiError::Internal("Internal server error")
}

pub fn upload_error(e: RepositoryError) -> ApiError {
    match e {
        RepositoryError::InvalidUpload(reason) => ApiError::BadRequest(reason),
        RepositoryError::VersionRegression { .. } => ApiError::Conflict(e.to_string()),
        other => {
            error!(error = %other, "Firmware upload failed");
            ApiError::Internal("An error occurred while uploading firmware")
        }
    }
}

pub fn check_update_error(e: RepositoryError) -> ApiError {
    match e {
        RepositoryError::StoreUnavailable(_) => ApiError::NotFound("Firmware directory not found."),
        RepositoryError::NoFirmwareAvailable | RepositoryError::ReleaseNotFound(_) => {
            ApiError::NotFound("No firmware versions found.")
        }
        other => {
            error!(error = %other, "Update check failed");
            ApiError::Internal("An error occurred while checking for updates")
        }
    }
}

pub fn download_error(e: RepositoryError) -> ApiError {
    match e {
        err if err.is_not_found() => ApiError::NotFound("No firmware versions available."),
        RepositoryError::BinaryMissing(key) => {
            warn!(key, "Latest release has no firmware binary");
            ApiError::NotFound("Firmware file not found.")
        }
        other => {
            error!(error = %other, "Firmware download failed");
            ApiError::Internal("An error occurred while downloading firmware")
        }
    }
}
