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


//! FluxION OTA server
//!
//! HTTP front end for the firmware repository: authenticated uploads and
//! update checks, plus firmware downloads for devices.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use fluxion_firmware_repo::{
    FsReleaseStore, PublishPolicy, ReleasePublisher, ReleaseStore, UpdateDecisionService,
};
use tracing::info;

use crate::auth::SharedSecretVerifier;
use crate::config::ServerConfig;
use crate::routes::AppState;

/// Router backed by the directory store configured in `repository.root`
pub fn build_router(config: &ServerConfig) -> Result<Router> {
    let store = FsReleaseStore::new(&config.repository.root);
    info!(root = %store.root().display(), "Using firmware directory");
    build_router_with_store(config, Arc::new(store))
}

pub fn build_router_with_store(
    config: &ServerConfig,
    store: Arc<dyn ReleaseStore>,
) -> Result<Router> {
    let comparator = config.repository.comparator.build();
    let policy = PublishPolicy {
        reject_older_versions: config.repository.reject_older_versions,
    };

    let publisher = ReleasePublisher::new(Arc::clone(&store), Arc::clone(&comparator), policy)
        .context("Failed to read existing releases")?;
    let decisions = UpdateDecisionService::new(store, comparator)
        .with_binary_suffix(config.repository.binary_suffix.clone());

    let verifier = SharedSecretVerifier::new(&config.auth.header, config.auth.shared_secret.clone())
        .with_context(|| format!("Invalid auth header name: {}", config.auth.header))?;

    let state = AppState {
        publisher: Arc::new(publisher),
        decisions: Arc::new(decisions),
    };

    Ok(routes::router(
        state,
        Arc::new(verifier),
        config.endpoints,
        config.server.max_upload_bytes,
    ))
}
