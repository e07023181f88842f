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
use std::error::Error;

pub mod cpal;
pub mod format;
pub mod mixer;
pub mod port;
pub mod resampler;
pub mod sample_data;
pub mod thread_priority;
pub mod wav;

pub use format::{OutputFormat, SampleFormat};

/// One stereo frame: left and right samples.
pub type Frame = [f32; 2];

/// Number of channels every internal buffer carries.
pub const DEFAULT_CHANNELS: usize = 2;

/// Volume parameter value that maps to unity gain.
pub const DEFAULT_VOLUME: f32 = 100.0;
pub const MIN_VOLUME: f32 = 0.0;
pub const MAX_VOLUME: f32 = 200.0;

/// Per-channel linear gain applied when a handle's buffer is accumulated into a port.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoVolume {
    pub left: f32,
    pub right: f32,
}

impl StereoVolume {
    pub const UNITY: StereoVolume = StereoVolume {
        left: 1.0,
        right: 1.0,
    };

    /// The same gain on both channels.
    pub fn uniform(gain: f32) -> StereoVolume {
        StereoVolume {
            left: gain,
            right: gain,
        }
    }

    /// Converts a volume parameter (0..=200, 100 is unity) to a gain vector. Values that
    /// are not finite play at unity.
    pub fn from_volume(volume: f32) -> StereoVolume {
        let volume = if volume.is_finite() {
            volume
        } else {
            DEFAULT_VOLUME
        };
        StereoVolume::uniform(volume.clamp(MIN_VOLUME, MAX_VOLUME) / DEFAULT_VOLUME)
    }
}

impl Default for StereoVolume {
    fn default() -> Self {
        StereoVolume::UNITY
    }
}

/// Lists the names of output devices known to cpal.
pub fn list_devices() -> Result<Vec<String>, Box<dyn Error>> {
    cpal::list_output_devices()
}
