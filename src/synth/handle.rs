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
use std::sync::Arc;

use super::engine::SynthBackend;
use super::SynthAdapter;
use crate::audio::port::{AudioPort, PortId, PortRef};
use crate::audio::{Frame, StereoVolume};
use crate::playhandle::{HandleControl, HandleKind, PlayHandle, RenderContext, Rendered};
use crate::track::Origin;

const EXCLUSIVE_PORT_NAME: &str = "synthPlayHandle";

enum Target {
    Exclusive(AudioPort),
    Track(PortId),
}

/// Renders a synthesizer engine every period for as long as its instrument lives.
///
/// The handle has no natural end. After [`HandleControl::stop`] it keeps rendering for
/// `release_tail` frames so that released voices can ring out, then reports done unless
/// it is held open.
pub struct SynthPlayHandle<B: SynthBackend> {
    adapter: Arc<SynthAdapter<B>>,
    origin: Origin,
    target: Target,
    /// Frames (at the mixer rate) to keep rendering after a stop.
    release_tail: u64,
    tail_rendered: u64,
    offset: usize,
    control: HandleControl,
}

impl<B: SynthBackend> SynthPlayHandle<B> {
    pub fn new(adapter: Arc<SynthAdapter<B>>, release_tail: u64) -> SynthPlayHandle<B> {
        SynthPlayHandle {
            adapter,
            origin: Origin::NONE,
            target: Target::Exclusive(AudioPort::new(EXCLUSIVE_PORT_NAME)),
            release_tail,
            tail_rendered: 0,
            offset: 0,
            control: HandleControl::new(),
        }
    }

    pub fn with_origin(mut self, origin: Origin) -> SynthPlayHandle<B> {
        self.origin = origin;
        self
    }

    /// Starts rendering `offset` frames into the first period.
    pub fn with_offset(mut self, offset: usize) -> SynthPlayHandle<B> {
        self.offset = offset;
        self
    }

    pub fn with_track_port(mut self, port: PortId) -> SynthPlayHandle<B> {
        self.target = Target::Track(port);
        self
    }

    pub fn handle_control(&self) -> HandleControl {
        self.control.clone()
    }
}

impl<B: SynthBackend> PlayHandle for SynthPlayHandle<B> {
    fn kind(&self) -> HandleKind {
        HandleKind::Synth
    }

    fn native_rate(&self) -> Option<u32> {
        self.adapter.native_rate()
    }

    fn render(&mut self, ctx: &RenderContext<'_>, working: &mut [Frame]) -> Rendered {
        // The engine runs even when muted so voices keep their timing.
        let has_engine = self.adapter.render(working);
        self.control.advance(ctx.frames as u64);
        if self.control.is_stopped() {
            self.tail_rendered += ctx.frames as u64;
        }

        if !has_engine || self.origin.is_muted(ctx.tracks) {
            return Rendered::Silent;
        }
        Rendered::Audible(StereoVolume::from_volume(self.control.volume()))
    }

    fn done(&self) -> bool {
        self.control.is_stopped()
            && self.tail_rendered >= self.release_tail
            && !self.control.is_held_open()
    }

    fn total_frames(&self) -> Option<u64> {
        None
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::mock::{MockBackend, MOCK_LEVEL};
    use crate::synth::BankRegistry;
    use crate::track::TrackRegistry;

    fn adapter() -> Arc<SynthAdapter<MockBackend>> {
        Arc::new(SynthAdapter::new(
            Arc::new(MockBackend::new()),
            Arc::new(BankRegistry::<MockBackend>::new("banks")),
            44100,
        ))
    }

    #[test]
    fn test_release_tail() {
        let tracks = TrackRegistry::new();
        let ctx = RenderContext {
            sample_rate: 44100,
            frames_per_period: 100,
            frames: 100,
            tracks: &tracks,
        };
        let mut handle = SynthPlayHandle::new(adapter(), 250);
        let control = handle.handle_control();
        let mut working = vec![[0.0; 2]; 100];

        for _ in 0..10 {
            assert_eq!(
                handle.render(&ctx, &mut working),
                Rendered::Audible(StereoVolume::UNITY)
            );
            assert!(!handle.done());
        }
        assert_eq!(working[0], [MOCK_LEVEL; 2]);
        assert_eq!(handle.total_frames(), None);

        control.stop();
        assert!(!handle.done());
        handle.render(&ctx, &mut working);
        handle.render(&ctx, &mut working);
        assert!(!handle.done());
        handle.render(&ctx, &mut working);
        assert!(handle.done());
        assert_eq!(handle.frames_rendered(), 1300);

        control.set_hold_open(true);
        assert!(!handle.done());
    }

    #[test]
    fn test_muted_keeps_rendering() {
        let tracks = TrackRegistry::new();
        let track = tracks.add_track("synth");
        tracks.set_muted(track, true);
        let ctx = RenderContext {
            sample_rate: 44100,
            frames_per_period: 64,
            frames: 64,
            tracks: &tracks,
        };

        let mut handle = SynthPlayHandle::new(adapter(), 0).with_origin(Origin::track(track));
        let mut working = vec![[0.0; 2]; 64];
        assert_eq!(handle.render(&ctx, &mut working), Rendered::Silent);
        assert_eq!(handle.frames_rendered(), 64);
        assert_eq!(handle.native_rate(), Some(44100));
    }
}
