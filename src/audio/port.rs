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

//! Named accumulation targets for rendered audio.
//!
//! A port does no locking of its own. The mixer's render pass is the only writer, so
//! every port is written from a single thread.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{Frame, StereoVolume};

static NEXT_PORT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a port registered with the mixer (a track port).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortId(u64);

impl PortId {
    pub(crate) fn next() -> PortId {
        PortId(NEXT_PORT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port-{}", self.0)
    }
}

/// A named stereo buffer that play handles accumulate into.
pub struct AudioPort {
    name: String,
    buffer: Vec<Frame>,
}

impl AudioPort {
    pub fn new(name: &str) -> AudioPort {
        AudioPort {
            name: name.to_string(),
            buffer: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sizes the port for a period of `frames` frames and zeroes it.
    pub fn prepare(&mut self, frames: usize) {
        self.buffer.clear();
        self.buffer.resize(frames, [0.0; 2]);
    }

    /// Zeroes the port without changing its length.
    pub fn clear(&mut self) {
        self.buffer.fill([0.0; 2]);
    }

    pub fn buffer(&self) -> &[Frame] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Adds `frame_count` frames of `source` into the port starting at `frame_offset`,
    /// scaling each channel by `volume`. Writing is clipped to the port's length and to
    /// the source length. Returns the number of frames written.
    pub fn write(
        &mut self,
        source: &[Frame],
        frame_count: usize,
        frame_offset: usize,
        volume: StereoVolume,
    ) -> usize {
        if frame_offset >= self.buffer.len() {
            return 0;
        }
        let count = frame_count
            .min(source.len())
            .min(self.buffer.len() - frame_offset);
        for (dest, src) in self.buffer[frame_offset..frame_offset + count]
            .iter_mut()
            .zip(&source[..count])
        {
            dest[0] += src[0] * volume.left;
            dest[1] += src[1] * volume.right;
        }
        count
    }

    /// Adds this port's contents into `dest` at unity gain.
    pub fn mix_into(&self, dest: &mut [Frame]) {
        for (d, s) in dest.iter_mut().zip(&self.buffer) {
            d[0] += s[0];
            d[1] += s[1];
        }
    }
}

impl fmt::Debug for AudioPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioPort")
            .field("name", &self.name)
            .field("frames", &self.buffer.len())
            .finish()
    }
}

/// Where a play handle's audio goes.
pub enum PortRef<'a> {
    /// A port created and owned by the handle itself.
    Exclusive(&'a mut AudioPort),
    /// A track-level port registered with the mixer. The handle holds only the id.
    Track(PortId),
}
