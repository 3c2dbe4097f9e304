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


//! In-memory release store

use super::{ReleaseStore, StagedRelease};
use crate::error::{RepositoryError, Result};
use crate::release::{BinaryReader, CreationKey, Release, ReleaseDraft};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct StoredRelease {
    /// Raw marker contents
    version: Option<String>,
    files: BTreeMap<String, Arc<[u8]>>,
}

/// `None` models a root collection that was never created
type Releases = Arc<RwLock<Option<BTreeMap<CreationKey, StoredRelease>>>>;

/// Release store kept entirely in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryReleaseStore {
    releases: Releases,
}

impl MemoryReleaseStore {
    /// Store whose root collection does not exist yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with an existing, empty root collection
    pub fn with_root() -> Self {
        let store = Self::default();
        *store.releases.write() = Some(BTreeMap::new());
        store
    }

    /// Inserts a raw entry, bypassing staging. Lets tests model releases
    /// left behind by other writers.
    pub fn insert_raw(&self, key: CreationKey, version: Option<&str>, files: &[(&str, &[u8])]) {
        let entry = StoredRelease {
            version: version.map(ToOwned::to_owned),
            files: files
                .iter()
                .map(|(name, data)| ((*name).to_owned(), Arc::from(*data)))
                .collect(),
        };
        self.releases
            .write()
            .get_or_insert_with(BTreeMap::new)
            .insert(key, entry);
    }

    pub fn len(&self) -> usize {
        self.releases.read().as_ref().map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReleaseStore for MemoryReleaseStore {
    fn list_release_keys(&self) -> Result<Vec<CreationKey>> {
        let guard = self.releases.read();
        let releases = guard.as_ref().ok_or_else(unavailable)?;
        Ok(releases.keys().rev().copied().collect())
    }

    fn open_release(&self, key: CreationKey) -> Result<Release> {
        let guard = self.releases.read();
        let releases = guard.as_ref().ok_or_else(unavailable)?;
        let stored = releases
            .get(&key)
            .ok_or(RepositoryError::ReleaseNotFound(key))?;

        let version = stored
            .version
            .as_deref()
            .ok_or_else(|| RepositoryError::IncompleteRelease {
                key,
                reason: "missing version marker".to_owned(),
            })?;
        if stored.files.is_empty() {
            return Err(RepositoryError::IncompleteRelease {
                key,
                reason: "no payload file".to_owned(),
            });
        }

        Ok(Release {
            key,
            version: version.trim().to_owned(),
            files: stored.files.keys().cloned().collect(),
        })
    }

    fn open_binary(&self, key: CreationKey, file_name: &str) -> Result<BinaryReader> {
        let guard = self.releases.read();
        let releases = guard.as_ref().ok_or_else(unavailable)?;
        let data = releases
            .get(&key)
            .and_then(|r| r.files.get(file_name))
            .cloned()
            .ok_or(RepositoryError::BinaryMissing(key))?;

        Ok(BinaryReader {
            len: data.len() as u64,
            reader: Box::new(Cursor::new(data)),
        })
    }

    fn stage_release(&self, draft: ReleaseDraft<'_>) -> Result<Box<dyn StagedRelease>> {
        super::check_file_name(draft.file_name)?;

        let mut data = Vec::new();
        draft
            .binary
            .read_to_end(&mut data)
            .map_err(RepositoryError::PublishFailed)?;

        Ok(Box::new(MemoryStagedRelease {
            releases: Arc::clone(&self.releases),
            file_name: draft.file_name.to_owned(),
            version: draft.version.to_owned(),
            data: Some(Arc::from(data)),
        }))
    }
}

fn unavailable() -> RepositoryError {
    RepositoryError::StoreUnavailable("in-memory root not created".to_owned())
}

#[derive(Debug)]
struct MemoryStagedRelease {
    releases: Releases,
    file_name: String,
    version: String,
    /// `None` once committed
    data: Option<Arc<[u8]>>,
}

impl StagedRelease for MemoryStagedRelease {
    fn commit(&mut self, key: CreationKey) -> Result<Release> {
        let mut guard = self.releases.write();
        let releases = guard.get_or_insert_with(BTreeMap::new);
        if releases.contains_key(&key) {
            return Err(RepositoryError::KeyCollision(key));
        }

        let data = self.data.take().ok_or_else(|| {
            RepositoryError::PublishFailed(std::io::Error::other(
                "staged release already committed",
            ))
        })?;

        let mut files = BTreeMap::new();
        files.insert(self.file_name.clone(), data);
        releases.insert(
            key,
            StoredRelease {
                version: Some(self.version.clone()),
                files,
            },
        );

        Ok(Release {
            key,
            version: self.version.trim().to_owned(),
            files: vec![self.file_name.clone()],
        })
    }
}
