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


//! Latest release resolution

use crate::error::{RepositoryError, Result};
use crate::release::Release;
use crate::store::ReleaseStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Finds the latest fully formed release by creation order
#[derive(Debug, Clone)]
pub struct ReleaseResolver {
    store: Arc<dyn ReleaseStore>,
}

impl ReleaseResolver {
    pub fn new(store: Arc<dyn ReleaseStore>) -> Self {
        Self { store }
    }

    /// The release with the highest creation key that opens cleanly.
    ///
    /// Entries that are incomplete or vanish while being read are skipped.
    /// Returns `NoFirmwareAvailable` if nothing usable is left and passes
    /// `StoreUnavailable` through when the root collection is missing.
    pub fn latest(&self) -> Result<Release> {
        let mut keys = self.store.list_release_keys()?;
        keys.sort_unstable_by(|a, b| b.cmp(a));

        for key in keys {
            match self.store.open_release(key) {
                Ok(release) => {
                    debug!(key, version = %release.version, "Resolved latest release");
                    return Ok(release);
                }
                Err(RepositoryError::IncompleteRelease { key, reason }) => {
                    warn!(key, %reason, "Skipping incomplete release");
                }
                Err(RepositoryError::ReleaseNotFound(key)) => {
                    debug!(key, "Release disappeared during resolution");
                }
                Err(e) => return Err(e),
            }
        }

        Err(RepositoryError::NoFirmwareAvailable)
    }
}
