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


//! Error types for the firmware repository

use crate::release::CreationKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("firmware store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("release {0} not found")]
    ReleaseNotFound(CreationKey),

    #[error("release {key} is incomplete: {reason}")]
    IncompleteRelease { key: CreationKey, reason: String },

    #[error("no firmware available")]
    NoFirmwareAvailable,

    #[error("release {0} has no firmware binary")]
    BinaryMissing(CreationKey),

    #[error("release {0} already exists")]
    KeyCollision(CreationKey),

    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    #[error("version {attempted} is older than latest version {latest}")]
    VersionRegression { latest: String, attempted: String },

    #[error("publish failed: {0}")]
    PublishFailed(#[source] std::io::Error),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RepositoryError {
    /// True for the conditions a client sees as "nothing to download yet"
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_) | Self::NoFirmwareAvailable | Self::ReleaseNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RepositoryError>;
