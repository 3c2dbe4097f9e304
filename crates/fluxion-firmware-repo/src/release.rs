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


//! Release model shared by the store, publisher and resolver

use chrono::{DateTime, Utc};
use std::fmt;
use std::io::Read;
use std::path::Path;

/// Milliseconds since the Unix epoch at the moment a release became visible
pub type CreationKey = u64;

/// File holding the raw version string inside every release
pub const VERSION_MARKER: &str = "version.txt";

pub const DEFAULT_BINARY_SUFFIX: &str = ".bin";

pub const MAX_VERSION_LEN: usize = 128;

/// A fully formed release as found in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub key: CreationKey,
    /// Version marker contents, surrounding whitespace trimmed
    pub version: String,
    /// Payload file names, sorted, version marker excluded
    pub files: Vec<String>,
}

impl Release {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.key)
            .ok()
            .and_then(DateTime::from_timestamp_millis)
    }

    /// First payload file (in sorted order) ending with `suffix`
    pub fn binary(&self, suffix: &str) -> Option<&str> {
        self.files
            .iter()
            .map(String::as_str)
            .find(|name| name.ends_with(suffix))
    }
}

/// Result of a successful publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedRelease {
    pub release: Release,
    /// Lowercase hex SHA256 of the stored binary
    pub sha256: String,
    pub size: u64,
}

/// Contents of a release that has not been written yet
pub struct ReleaseDraft<'a> {
    pub file_name: &'a str,
    pub version: &'a str,
    pub binary: &'a mut dyn Read,
}

impl fmt::Debug for ReleaseDraft<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseDraft")
            .field("file_name", &self.file_name)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Blocking reader over a stored binary
pub struct BinaryReader {
    pub len: u64,
    pub reader: Box<dyn Read + Send>,
}

impl fmt::Debug for BinaryReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryReader")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

/// Parses a release directory name. Only canonical decimal names are keys, so
/// "0017" and ".staging" are both ignored.
pub fn parse_key(name: &str) -> Option<CreationKey> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let key = name.parse::<CreationKey>().ok()?;
    (key.to_string() == name).then_some(key)
}

/// Reduces an uploaded file name to a bare file name usable inside a release
pub fn sanitize_file_name(original: &str) -> Option<String> {
    // Browsers on Windows may send the full client path
    let last = original.rsplit(['/', '\\']).next()?;
    let name = Path::new(last).file_name()?.to_str()?.trim();

    if name.is_empty() || name == VERSION_MARKER || name.starts_with('.') {
        return None;
    }
    if name.chars().any(char::is_control) {
        return None;
    }
    Some(name.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(files: &[&str]) -> Release {
        Release {
            key: 1_700_000_000_000,
            version: "1".to_owned(),
            files: files.iter().map(|f| (*f).to_owned()).collect(),
        }
    }

    #[test]
    fn test_parse_key() {
        assert_eq!(parse_key("1700000000000"), Some(1_700_000_000_000));
        assert_eq!(parse_key("0"), Some(0));
        assert_eq!(parse_key("0017"), None);
        assert_eq!(parse_key(".staging"), None);
        assert_eq!(parse_key("12a"), None);
        assert_eq!(parse_key(""), None);
        assert_eq!(parse_key("-5"), None);
        assert_eq!(parse_key("99999999999999999999999"), None);
    }

    #[test]
    fn test_binary_first_sorted_match() {
        let r = release(&["a.hex", "b.bin", "c.bin"]);
        assert_eq!(r.binary(".bin"), Some("b.bin"));
        assert_eq!(r.binary(".hex"), Some("a.hex"));
        assert_eq!(r.binary(".elf"), None);
    }

    #[test]
    fn test_created_at() {
        let r = release(&[]);
        let created = r.created_at().unwrap();
        assert_eq!(created.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("fw.bin").as_deref(), Some("fw.bin"));
        assert_eq!(
            sanitize_file_name("../../etc/passwd").as_deref(),
            Some("passwd")
        );
        assert_eq!(
            sanitize_file_name("C:\\builds\\fw-1.2.bin").as_deref(),
            Some("fw-1.2.bin")
        );
        assert_eq!(sanitize_file_name("version.txt"), None);
        assert_eq!(sanitize_file_name(".."), None);
        assert_eq!(sanitize_file_name(""), None);
        assert_eq!(sanitize_file_name("dir/"), None);
        assert_eq!(sanitize_file_name("bad\nname.bin"), None);
    }
}
