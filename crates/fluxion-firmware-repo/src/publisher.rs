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


//! Release publishing

use crate::error::{RepositoryError, Result};
use crate::key::KeyAllocator;
use crate::release::{
    CreationKey, MAX_VERSION_LEN, PublishedRelease, ReleaseDraft, sanitize_file_name,
};
use crate::resolver::ReleaseResolver;
use crate::store::ReleaseStore;
use crate::version::VersionComparator;
use sha2::{Digest, Sha256};
use std::io::{self, Read};
use std::sync::Arc;
use tracing::{info, warn};

/// Attempts to find an unused key before giving up on a staged release
const MAX_COMMIT_ATTEMPTS: u32 = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishPolicy {
    /// Refuse uploads whose version is older than the current latest release
    pub reject_older_versions: bool,
}

/// Creates new releases from uploaded binaries
#[derive(Debug)]
pub struct ReleasePublisher {
    store: Arc<dyn ReleaseStore>,
    resolver: ReleaseResolver,
    comparator: Arc<dyn VersionComparator>,
    keys: KeyAllocator,
    policy: PublishPolicy,
}

impl ReleasePublisher {
    /// Seeds key allocation from the highest key already in the store so new
    /// releases always sort after existing ones.
    pub fn new(
        store: Arc<dyn ReleaseStore>,
        comparator: Arc<dyn VersionComparator>,
        policy: PublishPolicy,
    ) -> Result<Self> {
        let floor = match store.list_release_keys() {
            Ok(keys) => keys.into_iter().max().unwrap_or(0),
            Err(RepositoryError::StoreUnavailable(_)) => 0,
            Err(e) => return Err(e),
        };

        Ok(Self {
            resolver: ReleaseResolver::new(Arc::clone(&store)),
            store,
            comparator,
            keys: KeyAllocator::new(floor),
            policy,
        })
    }

    pub fn publish(
        &self,
        binary: impl Read,
        original_filename: &str,
        version: &str,
    ) -> Result<PublishedRelease> {
        let file_name = sanitize_file_name(original_filename).ok_or_else(|| {
            RepositoryError::InvalidUpload(format!(
                "invalid firmware file name: {original_filename:?}"
            ))
        })?;
        validate_version(version)?;

        if self.policy.reject_older_versions {
            self.check_not_older(version)?;
        }

        let mut reader = DigestReader::new(binary);
        let mut staged = self.store.stage_release(ReleaseDraft {
            file_name: &file_name,
            version,
            binary: &mut reader,
        })?;
        let (sha256, size) = reader.finish();

        for _ in 0..MAX_COMMIT_ATTEMPTS {
            let key = self.keys.next();
            match staged.commit(key) {
                Ok(release) => {
                    info!(
                        key,
                        created_at = ?release.created_at(),
                        version = %release.version,
                        file = %file_name,
                        size,
                        %sha256,
                        "Published firmware release"
                    );
                    return Ok(PublishedRelease {
                        release,
                        sha256,
                        size,
                    });
                }
                Err(RepositoryError::KeyCollision(taken)) => {
                    self.skip_past_foreign_keys(taken);
                    warn!(
                        key = taken,
                        floor = self.keys.last(),
                        "Creation key already taken, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(RepositoryError::PublishFailed(io::Error::other(format!(
            "no free creation key after {MAX_COMMIT_ATTEMPTS} attempts"
        ))))
    }

    /// Another writer owns `taken`, and possibly a run of keys after it.
    /// Lifts the allocator floor to the highest key now in the store.
    fn skip_past_foreign_keys(&self, taken: CreationKey) {
        self.keys.observe(taken);
        match self.store.list_release_keys() {
            Ok(keys) => {
                if let Some(highest) = keys.into_iter().max() {
                    self.keys.observe(highest);
                }
            }
            Err(e) => warn!(error = %e, "Failed to re-read release keys after collision"),
        }
    }

    fn check_not_older(&self, version: &str) -> Result<()> {
        match self.resolver.latest() {
            Ok(latest) if self.comparator.is_older(version.trim(), &latest.version) => {
                Err(RepositoryError::VersionRegression {
                    latest: latest.version,
                    attempted: version.trim().to_owned(),
                })
            }
            Ok(_) | Err(RepositoryError::NoFirmwareAvailable | RepositoryError::StoreUnavailable(_)) => {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn validate_version(version: &str) -> Result<()> {
    let trimmed = version.trim();
    if trimmed.is_empty() {
        return Err(RepositoryError::InvalidUpload(
            "version must not be empty".to_owned(),
        ));
    }
    if trimmed.len() > MAX_VERSION_LEN {
        return Err(RepositoryError::InvalidUpload(format!(
            "version longer than {MAX_VERSION_LEN} bytes"
        )));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(RepositoryError::InvalidUpload(
            "version contains control characters".to_owned(),
        ));
    }
    Ok(())
}

/// Hashes and counts bytes as the store consumes them
struct DigestReader<R> {
    inner: R,
    hasher: Sha256,
    size: u64,
}

impl<R: Read> DigestReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            size: 0,
        }
    }

    fn finish(self) -> (String, u64) {
        (format!("{:x}", self.hasher.finalize()), self.size)
    }
}

impl<R: Read> Read for DigestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if let Some(chunk) = buf.get(..n) {
            self.hasher.update(chunk);
        }
        self.size += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::{BinaryReader, Release};
    use crate::store::{MemoryReleaseStore, StagedRelease};
    use crate::version::{LexicographicComparator, NumericComparator};
    use std::io::Cursor;

    fn publisher(store: &MemoryReleaseStore, policy: PublishPolicy) -> ReleasePublisher {
        ReleasePublisher::new(
            Arc::new(store.clone()),
            Arc::new(LexicographicComparator),
            policy,
        )
        .unwrap()
    }

    #[test]
    fn test_publish_creates_release() {
        let store = MemoryReleaseStore::new();
        let published = publisher(&store, PublishPolicy::default())
            .publish(Cursor::new(b"firmware".to_vec()), "fw.bin", "5")
            .unwrap();

        assert_eq!(published.release.version, "5");
        assert_eq!(published.release.files, vec!["fw.bin".to_owned()]);
        assert_eq!(published.size, 8);
        assert_eq!(store.list_release_keys().unwrap(), vec![published.release.key]);
    }

    #[test]
    fn test_publish_digest() {
        let store = MemoryReleaseStore::new();
        let published = publisher(&store, PublishPolicy::default())
            .publish(Cursor::new(b"test data".to_vec()), "fw.bin", "1")
            .unwrap();

        let mut hasher = Sha256::new();
        hasher.update(b"test data");
        assert_eq!(published.sha256, format!("{:x}", hasher.finalize()));
    }

    #[test]
    fn test_keys_strictly_increase() {
        let store = MemoryReleaseStore::new();
        let publisher = publisher(&store, PublishPolicy::default());

        let keys: Vec<_> = (0u8..20)
            .map(|i| {
                publisher
                    .publish(Cursor::new(vec![i]), "fw.bin", &i.to_string())
                    .unwrap()
                    .release
                    .key
            })
            .collect();

        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_new_keys_sort_after_existing() {
        let store = MemoryReleaseStore::with_root();
        let far_future = 9_999_999_999_999;
        store.insert_raw(far_future, Some("1"), &[("a.bin", b"a".as_slice())]);

        let published = publisher(&store, PublishPolicy::default())
            .publish(Cursor::new(vec![1]), "fw.bin", "2")
            .unwrap();
        assert!(published.release.key > far_future);
    }

    #[test]
    fn test_path_in_filename_is_stripped() {
        let store = MemoryReleaseStore::new();
        let published = publisher(&store, PublishPolicy::default())
            .publish(Cursor::new(vec![1]), "../../fw.bin", "1")
            .unwrap();
        assert_eq!(published.release.files, vec!["fw.bin".to_owned()]);
    }

    #[test]
    fn test_invalid_uploads_leave_store_untouched() {
        let store = MemoryReleaseStore::new();
        let publisher = publisher(&store, PublishPolicy::default());

        for (name, version) in [("version.txt", "1"), ("", "1"), ("fw.bin", "  "), ("fw.bin", "1\n2")] {
            let result = publisher.publish(Cursor::new(vec![1]), name, version);
            assert!(
                matches!(result, Err(RepositoryError::InvalidUpload(_))),
                "{name:?} / {version:?}"
            );
        }
        let too_long = "9".repeat(MAX_VERSION_LEN + 1);
        assert!(publisher.publish(Cursor::new(vec![1]), "fw.bin", &too_long).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_read_failure_is_publish_failed() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away"))
            }
        }

        let store = MemoryReleaseStore::new();
        let result = publisher(&store, PublishPolicy::default()).publish(Broken, "fw.bin", "1");
        assert!(matches!(result, Err(RepositoryError::PublishFailed(_))));
        assert!(store.is_empty());
    }

    const FOREIGN_FLOOR: CreationKey = 9_000_000_000_000;

    /// Store holding one release at `FOREIGN_FLOOR`, so the publisher's
    /// first key is `FOREIGN_FLOOR + 1`
    fn seeded_store() -> MemoryReleaseStore {
        let store = MemoryReleaseStore::with_root();
        store.insert_raw(FOREIGN_FLOOR, Some("1"), &[("a.bin", b"a".as_slice())]);
        store
    }

    #[test]
    fn test_single_collision_is_retried() {
        let store = seeded_store();
        let publisher = publisher(&store, PublishPolicy::default());
        store.insert_raw(FOREIGN_FLOOR + 1, Some("1"), &[("b.bin", b"b".as_slice())]);

        let published = publisher
            .publish(Cursor::new(vec![2]), "fw.bin", "2")
            .unwrap();
        assert_eq!(published.release.key, FOREIGN_FLOOR + 2);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_dense_foreign_range_is_skipped() {
        let store = seeded_store();
        let publisher = publisher(&store, PublishPolicy::default());
        for key in FOREIGN_FLOOR + 1..=FOREIGN_FLOOR + 3000 {
            store.insert_raw(key, Some("1"), &[("b.bin", b"b".as_slice())]);
        }

        let published = publisher
            .publish(Cursor::new(vec![2]), "fw.bin", "2")
            .unwrap();
        assert_eq!(published.release.key, FOREIGN_FLOOR + 3001);

        let resolver = ReleaseResolver::new(Arc::new(store.clone()));
        assert_eq!(resolver.latest().unwrap().version, "2");
    }

    /// Every commit collides, as if another writer always gets there first
    #[derive(Debug)]
    struct ContestedStore;

    #[derive(Debug)]
    struct ContestedStage;

    impl StagedRelease for ContestedStage {
        fn commit(&mut self, key: CreationKey) -> Result<Release> {
            Err(RepositoryError::KeyCollision(key))
        }
    }

    impl ReleaseStore for ContestedStore {
        fn list_release_keys(&self) -> Result<Vec<CreationKey>> {
            Ok(Vec::new())
        }

        fn open_release(&self, key: CreationKey) -> Result<Release> {
            Err(RepositoryError::ReleaseNotFound(key))
        }

        fn open_binary(&self, key: CreationKey, _: &str) -> Result<BinaryReader> {
            Err(RepositoryError::BinaryMissing(key))
        }

        fn stage_release(&self, draft: ReleaseDraft<'_>) -> Result<Box<dyn StagedRelease>> {
            io::copy(draft.binary, &mut io::sink()).map_err(RepositoryError::PublishFailed)?;
            Ok(Box::new(ContestedStage))
        }
    }

    #[test]
    fn test_collisions_exhaust_attempts() {
        let publisher = ReleasePublisher::new(
            Arc::new(ContestedStore),
            Arc::new(LexicographicComparator),
            PublishPolicy::default(),
        )
        .unwrap();

        let result = publisher.publish(Cursor::new(vec![1]), "fw.bin", "1");
        assert!(matches!(result, Err(RepositoryError::PublishFailed(_))));
    }

    #[test]
    fn test_older_versions_allowed_by_default() {
        let store = MemoryReleaseStore::new();
        let publisher = publisher(&store, PublishPolicy::default());
        publisher.publish(Cursor::new(vec![1]), "fw.bin", "5").unwrap();
        publisher.publish(Cursor::new(vec![1]), "fw.bin", "4").unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_reject_older_versions() {
        let store = MemoryReleaseStore::new();
        let policy = PublishPolicy {
            reject_older_versions: true,
        };
        let publisher = ReleasePublisher::new(
            Arc::new(store.clone()),
            Arc::new(NumericComparator),
            policy,
        )
        .unwrap();

        publisher.publish(Cursor::new(vec![1]), "fw.bin", "1.10.0").unwrap();
        let result = publisher.publish(Cursor::new(vec![1]), "fw.bin", "1.9.0");
        assert!(matches!(
            result,
            Err(RepositoryError::VersionRegression { ref latest, ref attempted })
                if latest == "1.10.0" && attempted == "1.9.0"
        ));
        // Same version may be re-published
        publisher.publish(Cursor::new(vec![2]), "fw.bin", "1.10.0").unwrap();
        assert_eq!(store.len(), 2);
    }
}
