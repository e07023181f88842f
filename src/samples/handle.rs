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
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::loader::{SampleLoader, SharedSample};
use crate::audio::port::{AudioPort, PortId, PortRef};
use crate::audio::sample_data::SampleData;
use crate::audio::{Frame, StereoVolume};
use crate::playhandle::{self, HandleControl, HandleKind, PlayHandle, RenderContext, Rendered};
use crate::resource::ResourceLoadError;
use crate::track::Origin;

/// Name of the port a sample handle creates when it isn't routed to a track.
const EXCLUSIVE_PORT_NAME: &str = "samplePlayHandle";

enum SampleRef {
    /// Loaded through the shared cache; the reference is released when the handle drops.
    Shared(SharedSample),
    /// Rendered in memory, e.g. a frozen pattern.
    Owned(Arc<SampleData>),
}

impl SampleRef {
    fn data(&self) -> &SampleData {
        match self {
            SampleRef::Shared(shared) => shared.payload(),
            SampleRef::Owned(data) => data.as_ref(),
        }
    }
}

enum Target {
    Exclusive(AudioPort),
    Track(PortId),
}

/// Plays a decoded sample once from start to end.
pub struct SamplePlayHandle {
    sample: SampleRef,
    /// Read position in native frames.
    position: usize,
    total_frames: u64,
    /// Start within the first period, at the mixer rate.
    offset: usize,
    origin: Origin,
    target: Target,
    control: HandleControl,
}

impl SamplePlayHandle {
    /// Loads (or reuses) the sample at `path` and creates a handle for it.
    pub fn from_file(
        loader: &SampleLoader,
        path: &Path,
        processing_rate: u32,
    ) -> Result<SamplePlayHandle, ResourceLoadError> {
        Ok(SamplePlayHandle::from_shared(
            loader.load(path)?,
            processing_rate,
        ))
    }

    /// Plays an already loaded sample.
    pub fn from_shared(sample: SharedSample, processing_rate: u32) -> SamplePlayHandle {
        SamplePlayHandle::new(SampleRef::Shared(sample), processing_rate)
    }

    /// Plays sample data that lives outside the loader cache.
    pub fn from_data(data: Arc<SampleData>, processing_rate: u32) -> SamplePlayHandle {
        SamplePlayHandle::new(SampleRef::Owned(data), processing_rate)
    }

    fn new(sample: SampleRef, processing_rate: u32) -> SamplePlayHandle {
        let total_frames = scaled_length(sample.data(), processing_rate);
        debug!(
            native_rate = sample.data().sample_rate(),
            processing_rate,
            total_frames,
            "Created sample play handle"
        );
        SamplePlayHandle {
            sample,
            position: 0,
            total_frames,
            offset: 0,
            origin: Origin::NONE,
            target: Target::Exclusive(AudioPort::new(EXCLUSIVE_PORT_NAME)),
            control: HandleControl::new(),
        }
    }

    /// Marks the handle as belonging to a track (and optionally a group track) for mute
    /// checks and bulk cancellation.
    pub fn with_origin(mut self, origin: Origin) -> SamplePlayHandle {
        self.origin = origin;
        self
    }

    /// Starts playback `offset` frames into the first period.
    pub fn with_offset(mut self, offset: usize) -> SamplePlayHandle {
        self.offset = offset;
        self
    }

    /// Routes output into a track port registered with the mixer instead of a port of
    /// the handle's own.
    pub fn with_track_port(mut self, port: PortId) -> SamplePlayHandle {
        self.target = Target::Track(port);
        self
    }

    /// A control for this handle, to keep after the handle moves into the mixer.
    pub fn handle_control(&self) -> HandleControl {
        self.control.clone()
    }
}

/// Length of `sample` in frames at `processing_rate`.
fn scaled_length(sample: &SampleData, processing_rate: u32) -> u64 {
    let native_rate = sample.sample_rate();
    if native_rate == 0 {
        return 0;
    }
    sample.len() as u64 * processing_rate as u64 / native_rate as u64
}

impl PlayHandle for SamplePlayHandle {
    fn kind(&self) -> HandleKind {
        HandleKind::Sample
    }

    fn native_rate(&self) -> Option<u32> {
        Some(self.sample.data().sample_rate())
    }

    fn render(&mut self, ctx: &RenderContext<'_>, working: &mut [Frame]) -> Rendered {
        if self.control.frames_rendered() >= self.total_frames {
            working.fill([0.0; 2]);
            return Rendered::Silent;
        }

        let frames = self.sample.data().frames();
        let start = self.position.min(frames.len());
        let available = (frames.len() - start).min(working.len());
        self.position += working.len();
        self.control.advance(ctx.frames as u64);

        // Timing advances either way; muted handles just don't write.
        if self.origin.is_muted(ctx.tracks) {
            return Rendered::Silent;
        }

        working[..available].copy_from_slice(&frames[start..start + available]);
        working[available..].fill([0.0; 2]);
        Rendered::Audible(StereoVolume::from_volume(self.control.volume()))
    }

    fn done(&self) -> bool {
        playhandle::is_done(
            &self.control,
            self.control.frames_rendered() >= self.total_frames,
        )
    }

    fn total_frames(&self) -> Option<u64> {
        Some(self.total_frames)
    }

    fn offset(&self) -> usize {
        self.offset
    }

    fn origin(&self) -> Origin {
        self.origin
    }

    fn port(&mut self) -> PortRef<'_> {
        match &mut self.target {
            Target::Exclusive(port) => PortRef::Exclusive(port),
            Target::Track(id) => PortRef::Track(*id),
        }
    }

    fn control(&self) -> &HandleControl {
        &self.control
    }
}
