// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Sample loading and caching.
//!
//! Samples are decoded entirely into memory on a control thread. Every handle playing the
//! same file shares one decoded copy, which is freed when the last handle goes away.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::audio::sample_data::SampleData;
use crate::resource::{ResourceLoadError, ResourceRegistry, SharedResource};

/// A counted reference to a decoded sample.
pub type SharedSample = SharedResource<PathBuf, SampleData>;

/// Manages loading and caching of sample data.
pub struct SampleLoader {
    registry: ResourceRegistry<PathBuf, SampleData>,
}

impl SampleLoader {
    pub fn new() -> Self {
        Self {
            registry: ResourceRegistry::new("samples"),
        }
    }

    /// Loads a sample from a file into memory, or returns the already loaded copy.
    pub fn load(&self, path: &Path) -> Result<SharedSample, ResourceLoadError> {
        // Canonical paths let "./a.wav" and "a.wav" share one entry. Files that can't
        // be canonicalized fall through to the loader, which reports the real error.
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        debug!(path = ?key, "Acquiring sample");
        self.registry
            .acquire_or_create(key, |key| SampleData::load(key))
    }

    /// Returns the number of samples currently loaded.
    pub fn cached_count(&self) -> usize {
        self.registry.len()
    }

    /// Returns the number of live references to the sample at `path`.
    pub fn ref_count(&self, path: &Path) -> usize {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.registry.ref_count(&key)
    }

    /// Returns the total memory used by all loaded samples in bytes.
    pub fn total_memory_usage(&self) -> usize {
        let mut total = 0;
        self.registry.for_each(|_, sample| total += sample.memory_size());
        total
    }
}

impl Default for SampleLoader {
    fn default() -> Self {
        Self::new()
    }
}
