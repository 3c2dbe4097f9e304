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


//! Update decisions for clients reporting their installed version

use crate::error::{RepositoryError, Result};
use crate::release::{CreationKey, DEFAULT_BINARY_SUFFIX};
use crate::resolver::ReleaseResolver;
use crate::store::ReleaseStore;
use crate::version::VersionComparator;
use std::fmt;
use std::io::Read;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateDecision {
    UpdateRequired { latest_version: String },
    UpToDate { latest_version: String },
}

impl UpdateDecision {
    pub fn update_required(&self) -> bool {
        matches!(self, Self::UpdateRequired { .. })
    }
}

/// Firmware binary ready to be sent to a client
pub struct FirmwarePayload {
    pub key: CreationKey,
    pub version: String,
    pub file_name: String,
    pub len: u64,
    pub reader: Box<dyn Read + Send>,
}

impl fmt::Debug for FirmwarePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirmwarePayload")
            .field("key", &self.key)
            .field("version", &self.version)
            .field("file_name", &self.file_name)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum Download {
    Firmware(FirmwarePayload),
    UpToDate { latest_version: String },
}

/// Answers "is there newer firmware" against the current store contents.
/// Nothing is cached, every call re-resolves the latest release.
#[derive(Debug, Clone)]
pub struct UpdateDecisionService {
    store: Arc<dyn ReleaseStore>,
    resolver: ReleaseResolver,
    comparator: Arc<dyn VersionComparator>,
    binary_suffix: String,
}

impl UpdateDecisionService {
    pub fn new(store: Arc<dyn ReleaseStore>, comparator: Arc<dyn VersionComparator>) -> Self {
        Self {
            resolver: ReleaseResolver::new(Arc::clone(&store)),
            store,
            comparator,
            binary_suffix: DEFAULT_BINARY_SUFFIX.to_owned(),
        }
    }

    pub fn with_binary_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.binary_suffix = suffix.into();
        self
    }

    pub fn check_update(&self, client_version: &str) -> Result<UpdateDecision> {
        let latest = self.resolver.latest()?;
        let decision = if self.comparator.is_older(client_version, &latest.version) {
            UpdateDecision::UpdateRequired {
                latest_version: latest.version,
            }
        } else {
            UpdateDecision::UpToDate {
                latest_version: latest.version,
            }
        };
        debug!(client_version, ?decision, "Update check");
        Ok(decision)
    }

    pub fn download_firmware(&self, client_version: &str) -> Result<Download> {
        let latest = self.resolver.latest()?;
        if !self.comparator.is_older(client_version, &latest.version) {
            return Ok(Download::UpToDate {
                latest_version: latest.version,
            });
        }

        let file_name = latest
            .binary(&self.binary_suffix)
            .ok_or(RepositoryError::BinaryMissing(latest.key))?
            .to_owned();
        let binary = self.store.open_binary(latest.key, &file_name)?;
        debug!(key = latest.key, file = %file_name, len = binary.len, "Serving firmware");

        Ok(Download::Firmware(FirmwarePayload {
            key: latest.key,
            version: latest.version,
            file_name,
            len: binary.len,
            reader: binary.reader,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryReleaseStore;
    use crate::version::{LexicographicComparator, NumericComparator};

    fn service(store: &MemoryReleaseStore) -> UpdateDecisionService {
        UpdateDecisionService::new(Arc::new(store.clone()), Arc::new(LexicographicComparator))
    }

    #[test]
    fn test_check_update_missing_store() {
        let store = MemoryReleaseStore::new();
        assert!(matches!(
            service(&store).check_update("1"),
            Err(RepositoryError::StoreUnavailable(_))
        ));
    }

    #[test]
    fn test_check_update_empty_store() {
        let store = MemoryReleaseStore::with_root();
        assert!(matches!(
            service(&store).check_update("1"),
            Err(RepositoryError::NoFirmwareAvailable)
        ));
    }

    #[test]
    fn test_check_update_decisions() {
        let store = MemoryReleaseStore::with_root();
        store.insert_raw(1, Some("5"), &[("fw.bin", b"x".as_slice())]);
        let service = service(&store);

        assert!(service.check_update("4").unwrap().update_required());
        assert_eq!(
            service.check_update("5").unwrap(),
            UpdateDecision::UpToDate {
                latest_version: "5".to_owned()
            }
        );
        assert!(!service.check_update("6").unwrap().update_required());
    }

    #[test]
    fn test_check_update_uses_injected_comparator() {
        let store = MemoryReleaseStore::with_root();
        store.insert_raw(1, Some("10"), &[("fw.bin", b"x".as_slice())]);

        assert!(!service(&store).check_update("9").unwrap().update_required());
        let numeric =
            UpdateDecisionService::new(Arc::new(store.clone()), Arc::new(NumericComparator));
        assert!(numeric.check_update("9").unwrap().update_required());
    }

    #[test]
    fn test_download_outdated_returns_bytes() {
        let store = MemoryReleaseStore::with_root();
        store.insert_raw(1, Some("5"), &[("fw.bin", b"\x7fELF payload".as_slice())]);

        let Download::Firmware(mut payload) = service(&store).download_firmware("4").unwrap()
        else {
            panic!("expected firmware");
        };
        assert_eq!(payload.file_name, "fw.bin");
        assert_eq!(payload.version, "5");

        let mut data = Vec::new();
        payload.reader.read_to_end(&mut data).unwrap();
        assert_eq!(data, b"\x7fELF payload");
        assert_eq!(payload.len, data.len() as u64);
    }

    #[test]
    fn test_download_up_to_date() {
        let store = MemoryReleaseStore::with_root();
        store.insert_raw(1, Some("5"), &[("fw.bin", b"x".as_slice())]);

        assert!(matches!(
            service(&store).download_firmware("5").unwrap(),
            Download::UpToDate { .. }
        ));
    }

    #[test]
    fn test_download_without_matching_binary() {
        let store = MemoryReleaseStore::with_root();
        store.insert_raw(7, Some("5"), &[("fw.hex", b"x".as_slice())]);

        assert!(matches!(
            service(&store).download_firmware("4"),
            Err(RepositoryError::BinaryMissing(7))
        ));
        let hex = service(&store).with_binary_suffix(".hex");
        assert!(matches!(
            hex.download_firmware("4").unwrap(),
            Download::Firmware(_)
        ));
    }

    #[test]
    fn test_download_picks_first_sorted_binary() {
        let store = MemoryReleaseStore::with_root();
        store.insert_raw(
            1,
            Some("5"),
            &[("b.bin", b"b".as_slice()), ("a.bin", b"a".as_slice())],
        );

        let Download::Firmware(payload) = service(&store).download_firmware("4").unwrap() else {
            panic!("expected firmware");
        };
        assert_eq!(payload.file_name, "a.bin");
    }
}
