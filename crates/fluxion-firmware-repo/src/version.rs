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


//! Version comparison policies
//!
//! Version markers are opaque strings. The default policy compares them as
//! plain strings, so `"10"` sorts before `"9"`. Deployments that tag firmware
//! with dotted numeric versions can switch to [`NumericComparator`].

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::Debug;
use std::sync::Arc;

/// Decides whether a client's version is older than a candidate release
pub trait VersionComparator: Debug + Send + Sync {
    /// Returns true if `client` is older than `candidate`
    fn is_older(&self, client: &str, candidate: &str) -> bool;
}

/// Byte-wise string ordering
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicographicComparator;

impl VersionComparator for LexicographicComparator {
    fn is_older(&self, client: &str, candidate: &str) -> bool {
        client < candidate
    }
}

/// Dotted numeric ordering (e.g. "v1.10.0" > "1.9")
///
/// Missing trailing segments count as zero. A segment that is not an unsigned
/// integer on either side is compared as a string.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericComparator;

impl NumericComparator {
    fn compare(a: &str, b: &str) -> Ordering {
        let a = strip_prefix(a);
        let b = strip_prefix(b);
        let mut left = a.split('.');
        let mut right = b.split('.');

        loop {
            let ordering = match (left.next(), right.next()) {
                (None, None) => return Ordering::Equal,
                (Some(l), None) => compare_segment(l, "0"),
                (None, Some(r)) => compare_segment("0", r),
                (Some(l), Some(r)) => compare_segment(l, r),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
    }
}

impl VersionComparator for NumericComparator {
    fn is_older(&self, client: &str, candidate: &str) -> bool {
        Self::compare(client, candidate) == Ordering::Less
    }
}

fn strip_prefix(s: &str) -> &str {
    s.trim().trim_start_matches('v').trim_start_matches('V')
}

fn compare_segment(l: &str, r: &str) -> Ordering {
    match (l.parse::<u64>(), r.parse::<u64>()) {
        (Ok(l), Ok(r)) => l.cmp(&r),
        _ => l.cmp(r),
    }
}

/// Comparator selection as it appears in configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ComparatorKind {
    #[default]
    Lexicographic,
    Numeric,
}

impl ComparatorKind {
    pub fn build(self) -> Arc<dyn VersionComparator> {
        match self {
            Self::Lexicographic => Arc::new(LexicographicComparator),
            Self::Numeric => Arc::new(NumericComparator),
        }
    }
}
