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


//! Shared-secret credential check

use std::fmt;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::InvalidHeaderName;
use axum::http::{HeaderMap, HeaderName};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::error::ApiError;

/// Decides whether a request carries a valid credential
pub trait CredentialVerifier: fmt::Debug + Send + Sync {
    fn verify(&self, headers: &HeaderMap) -> bool;
}

/// Exact match of one request header against a configured secret
pub struct SharedSecretVerifier {
    header: HeaderName,
    secret: String,
}

impl SharedSecretVerifier {
    pub fn new(header: &str, secret: impl Into<String>) -> Result<Self, InvalidHeaderName> {
        Ok(Self {
            header: HeaderName::try_from(header)?,
            secret: secret.into(),
        })
    }
}

impl fmt::Debug for SharedSecretVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSecretVerifier")
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

impl CredentialVerifier for SharedSecretVerifier {
    fn verify(&self, headers: &HeaderMap) -> bool {
        headers
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| !v.is_empty() && v == self.secret)
    }
}

/// Middleware rejecting requests without a valid credential before the
/// handler (and its body extraction) runs
pub async fn require_credential(
    State(verifier): State<Arc<dyn CredentialVerifier>>,
    request: Request,
    next: Next,
) -> Response {
    if verifier.verify(request.headers()) {
        return next.run(request).await;
    }

    warn!(
        method = %request.method(),
        path = %request.uri().path(),
        "Request rejected: invalid or missing credential"
    );
    ApiError::Unauthorized.into_response()
}
