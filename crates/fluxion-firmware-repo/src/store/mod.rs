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


//! Release storage backends

mod fs;
mod memory;

pub use fs::{FsReleaseStore, STALE_STAGING_AGE};
pub use memory::MemoryReleaseStore;

use crate::error::{RepositoryError, Result};
use crate::release::{BinaryReader, CreationKey, Release, ReleaseDraft, sanitize_file_name};
use std::fmt::Debug;

/// Durable, append-only collection of releases
pub trait ReleaseStore: Debug + Send + Sync {
    /// Creation keys of all release entries, highest first.
    ///
    /// Fails with `StoreUnavailable` when the root collection does not exist.
    fn list_release_keys(&self) -> Result<Vec<CreationKey>>;

    /// Reads the release stored under `key`.
    ///
    /// Fails with `ReleaseNotFound` when no entry exists and with
    /// `IncompleteRelease` when the entry lacks a version marker or payload.
    fn open_release(&self, key: CreationKey) -> Result<Release>;

    fn open_binary(&self, key: CreationKey, file_name: &str) -> Result<BinaryReader>;

    /// Writes the draft into a location invisible to readers. Nothing is
    /// published until [`StagedRelease::commit`] succeeds.
    fn stage_release(&self, draft: ReleaseDraft<'_>) -> Result<Box<dyn StagedRelease>>;
}

/// A fully written release waiting to become visible
pub trait StagedRelease: Debug + Send {
    /// Makes the staged release visible under `key` in one step.
    ///
    /// On `KeyCollision` the staged contents are kept so the caller can retry
    /// with another key. Dropping an uncommitted release discards it.
    fn commit(&mut self, key: CreationKey) -> Result<Release>;
}

/// Rejects draft file names that would escape or shadow release contents
fn check_file_name(name: &str) -> Result<()> {
    if sanitize_file_name(name).as_deref() == Some(name) {
        Ok(())
    } else {
        Err(RepositoryError::InvalidUpload(format!(
            "invalid firmware file name: {name:?}"
        )))
    }
}
