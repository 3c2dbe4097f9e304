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


//! Directory-backed release store
//!
//! Layout:
//!
//! ```text
//! <root>/
//!   .staging/            in-progress uploads, ignored by listing
//!   1718031200123/
//!     version.txt
//!     firmware.bin
//! ```

use super::{ReleaseStore, StagedRelease};
use crate::error::{RepositoryError, Result};
use crate::release::{
    BinaryReader, CreationKey, Release, ReleaseDraft, VERSION_MARKER, parse_key,
};
use std::fs::{self, File};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tracing::{debug, info, warn};

const STAGING_DIR: &str = ".staging";

/// Staging entries untouched for this long are left over from crashed uploads
pub const STALE_STAGING_AGE: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
pub struct FsReleaseStore {
    root: PathBuf,
    /// Stale staging entries are swept before the first upload
    pruned: Arc<Once>,
}

impl FsReleaseStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pruned: Arc::new(Once::new()),
        }
    }

    /// Removes staging entries whose last modification is at least
    /// `max_age` ago. Returns how many were removed.
    pub fn prune_stale_staging(&self, max_age: Duration) -> Result<usize> {
        let entries = match fs::read_dir(self.root.join(STAGING_DIR)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let now = SystemTime::now();
        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            let meta = entry.metadata()?;
            let age = now.duration_since(meta.modified()?).unwrap_or_default();
            if age < max_age {
                continue;
            }

            let path = entry.path();
            let result = if meta.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match result {
                Ok(()) => {
                    debug!(path = %path.display(), "Removed stale staging entry");
                    removed += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove stale staging entry"),
            }
        }
        Ok(removed)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn release_dir(&self, key: CreationKey) -> PathBuf {
        self.root.join(key.to_string())
    }

    fn unavailable(&self) -> RepositoryError {
        RepositoryError::StoreUnavailable(format!("{} does not exist", self.root.display()))
    }

    fn read_version(&self, key: CreationKey, dir: &Path) -> Result<String> {
        match fs::read_to_string(dir.join(VERSION_MARKER)) {
            Ok(content) => Ok(content.trim().to_owned()),
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::InvalidData) => {
                Err(RepositoryError::IncompleteRelease {
                    key,
                    reason: format!("unreadable {VERSION_MARKER}: {e}"),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl ReleaseStore for FsReleaseStore {
    fn list_release_keys(&self) -> Result<Vec<CreationKey>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(self.unavailable()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry?;
            let Some(key) = entry.file_name().to_str().and_then(parse_key) else {
                debug!(name = ?entry.file_name(), "Ignoring non-release entry");
                continue;
            };
            // Follows symlinks, a linked release directory is still a release
            match fs::metadata(entry.path()) {
                Ok(meta) if meta.is_dir() => keys.push(key),
                Ok(_) => debug!(key, "Ignoring non-directory entry"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        keys.sort_unstable_by(|a, b| b.cmp(a));
        Ok(keys)
    }

    fn open_release(&self, key: CreationKey) -> Result<Release> {
        let dir = self.release_dir(key);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(if self.root.is_dir() {
                    RepositoryError::ReleaseNotFound(key)
                } else {
                    self.unavailable()
                });
            }
            Err(e) if e.kind() == ErrorKind::NotADirectory => {
                return Err(RepositoryError::ReleaseNotFound(key));
            }
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name == VERSION_MARKER {
                continue;
            }
            if fs::metadata(entry.path()).is_ok_and(|m| m.is_file()) {
                files.push(name);
            }
        }
        files.sort_unstable();

        let version = self.read_version(key, &dir)?;
        if files.is_empty() {
            return Err(RepositoryError::IncompleteRelease {
                key,
                reason: "no payload file".to_owned(),
            });
        }

        Ok(Release {
            key,
            version,
            files,
        })
    }

    fn open_binary(&self, key: CreationKey, file_name: &str) -> Result<BinaryReader> {
        let path = self.release_dir(key).join(file_name);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RepositoryError::BinaryMissing(key));
            }
            Err(e) => return Err(e.into()),
        };
        let len = file.metadata()?.len();

        Ok(BinaryReader {
            len,
            reader: Box::new(file),
        })
    }

    fn stage_release(&self, mut draft: ReleaseDraft<'_>) -> Result<Box<dyn StagedRelease>> {
        super::check_file_name(draft.file_name)?;

        self.pruned.call_once(|| match self.prune_stale_staging(STALE_STAGING_AGE) {
            Ok(0) => {}
            Ok(removed) => info!(removed, "Pruned stale staging entries"),
            Err(e) => warn!(error = %e, "Failed to prune staging directory"),
        });

        let staging_root = self.root.join(STAGING_DIR);
        fs::create_dir_all(&staging_root).map_err(RepositoryError::PublishFailed)?;

        let dir = tempfile::Builder::new()
            .prefix("upload-")
            .tempdir_in(&staging_root)
            .map_err(RepositoryError::PublishFailed)?;

        write_draft(dir.path(), &mut draft).map_err(RepositoryError::PublishFailed)?;

        debug!(path = %dir.path().display(), "Release staged");

        Ok(Box::new(FsStagedRelease {
            dir: Some(dir),
            root: self.root.clone(),
            version: draft.version.trim().to_owned(),
            file_name: draft.file_name.to_owned(),
        }))
    }
}

/// Binary first, version marker second
fn write_draft(dir: &Path, draft: &mut ReleaseDraft<'_>) -> io::Result<()> {
    let mut file = File::create(dir.join(draft.file_name))?;
    io::copy(&mut *draft.binary, &mut file)?;
    file.sync_all()?;

    let mut marker = File::create(dir.join(VERSION_MARKER))?;
    marker.write_all(draft.version.as_bytes())?;
    marker.sync_all()
}

#[derive(Debug)]
struct FsStagedRelease {
    /// `None` once committed
    dir: Option<TempDir>,
    root: PathBuf,
    version: String,
    file_name: String,
}

impl StagedRelease for FsStagedRelease {
    fn commit(&mut self, key: CreationKey) -> Result<Release> {
        let Some(dir) = self.dir.as_ref() else {
            return Err(RepositoryError::PublishFailed(io::Error::other(
                "staged release already committed",
            )));
        };

        let target = self.root.join(key.to_string());
        if target.exists() {
            return Err(RepositoryError::KeyCollision(key));
        }

        match fs::rename(dir.path(), &target) {
            Ok(()) => {}
            Err(e) if matches!(e.kind(), ErrorKind::AlreadyExists | ErrorKind::DirectoryNotEmpty) => {
                return Err(RepositoryError::KeyCollision(key));
            }
            Err(e) => return Err(RepositoryError::PublishFailed(e)),
        }

        // The directory now lives under its final name, don't let TempDir remove it
        if let Some(dir) = self.dir.take() {
            let _ = dir.keep();
        }

        Ok(Release {
            key,
            version: self.version.clone(),
            files: vec![self.file_name.clone()],
        })
    }
}

impl Drop for FsStagedRelease {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!(path = %path.display(), error = %e, "Failed to remove staged release");
            }
        }
    }
}
