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


//! FluxION firmware repository
//!
//! Stores firmware releases keyed by creation time and answers whether a
//! device running a given version should update. A release is a directory
//! named after its creation key holding a `version.txt` marker and the
//! firmware binary. The release with the highest key is the latest one; the
//! version marker only decides whether a particular client is out of date.

pub mod decision;
pub mod error;
pub mod key;
pub mod publisher;
pub mod release;
pub mod resolver;
pub mod store;
pub mod version;

pub use decision::{Download, FirmwarePayload, UpdateDecision, UpdateDecisionService};
pub use error::RepositoryError;
pub use publisher::{PublishPolicy, ReleasePublisher};
pub use release::{CreationKey, PublishedRelease, Release};
pub use resolver::ReleaseResolver;
pub use store::{FsReleaseStore, MemoryReleaseStore, ReleaseStore};
pub use version::{ComparatorKind, LexicographicComparator, NumericComparator, VersionComparator};
