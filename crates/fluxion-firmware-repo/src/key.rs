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


//! Creation key allocation

use crate::release::CreationKey;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out strictly increasing creation keys.
///
/// Keys follow the wall clock in milliseconds but never repeat or go
/// backwards, even when two publishes land in the same millisecond or the
/// clock is stepped back.
#[derive(Debug, Default)]
pub struct KeyAllocator {
    last: AtomicU64,
}

impl KeyAllocator {
    /// Every key handed out will be greater than `floor`
    pub fn new(floor: CreationKey) -> Self {
        Self {
            last: AtomicU64::new(floor),
        }
    }

    pub fn next(&self) -> CreationKey {
        self.next_at(now_millis())
    }

    pub fn next_at(&self, now: CreationKey) -> CreationKey {
        let mut current = self.last.load(Ordering::Acquire);
        loop {
            let candidate = now.max(current.saturating_add(1));
            match self.last.compare_exchange_weak(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return candidate,
                Err(actual) => current = actual,
            }
        }
    }

    /// Records a key issued elsewhere so later keys sort after it
    pub fn observe(&self, key: CreationKey) {
        self.last.fetch_max(key, Ordering::AcqRel);
    }

    pub fn last(&self) -> CreationKey {
        self.last.load(Ordering::Acquire)
    }
}

fn now_millis() -> CreationKey {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}
