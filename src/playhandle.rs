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

//! Schedulable units of audio work.
//!
//! A play handle is created on a control thread, moved into the mixer, rendered once per
//! period on the render thread and retired when [`PlayHandle::done`] returns true. The
//! mixer never looks at frame counts to decide retirement.

use std::fmt;

use crate::audio::port::PortRef;
use crate::audio::{Frame, StereoVolume};
use crate::track::{Origin, TrackId, TrackRegistry};

mod control;

pub use control::{HandleControl, HandleState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Sample,
    Synth,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HandleKind::Sample => "sample",
            HandleKind::Synth => "synth",
        })
    }
}

/// Per-period information handed to every handle.
pub struct RenderContext<'a> {
    /// The mixer's output rate.
    pub sample_rate: u32,
    /// Frames in one period at the mixer's output rate.
    pub frames_per_period: usize,
    /// Frames this handle covers this period at the mixer rate. Less than a period only
    /// on the first period of a handle that starts at an offset.
    pub frames: usize,
    pub tracks: &'a TrackRegistry,
}

/// What a handle produced for the period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rendered {
    /// The working buffer holds audio to be accumulated with this volume.
    Audible(StereoVolume),
    /// Nothing should be written this period (muted, or no engine).
    Silent,
}

pub trait PlayHandle: Send {
    fn kind(&self) -> HandleKind;

    /// The rate the handle renders at. `None` means the mixer's output rate.
    fn native_rate(&self) -> Option<u32>;

    /// Renders one period into `working`, which holds exactly as many frames as the
    /// handle must produce at its native rate for this period. The handle advances its
    /// frame counter by `ctx.frames` whether or not it is audible.
    fn render(&mut self, ctx: &RenderContext<'_>, working: &mut [Frame]) -> Rendered;

    /// True once the handle may be retired.
    fn done(&self) -> bool;

    /// Total length at the mixer rate that was current at creation. `None` for handles of
    /// indefinite duration.
    fn total_frames(&self) -> Option<u64>;

    fn origin(&self) -> Origin;

    /// Where the rendered audio is accumulated.
    fn port(&mut self) -> PortRef<'_>;

    fn control(&self) -> &HandleControl;

    /// Where in its first period the handle starts, in frames at the mixer rate.
    fn offset(&self) -> usize {
        0
    }

    fn frames_rendered(&self) -> u64 {
        self.control().frames_rendered()
    }

    fn is_from_track(&self, track: TrackId) -> bool {
        self.origin().is_from(track)
    }

    fn state(&self) -> HandleState {
        self.control().state()
    }
}

/// Shared completion rule: past the end (or stopped) and not held open.
pub(crate) fn is_done(control: &HandleControl, finished_naturally: bool) -> bool {
    (finished_naturally || control.is_stopped()) && !control.is_held_open()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_done_rules() {
        let control = HandleControl::new();
        assert!(!is_done(&control, false));
        assert!(is_done(&control, true));

        control.set_hold_open(true);
        assert!(!is_done(&control, true));

        control.set_hold_open(false);
        control.stop();
        assert!(is_done(&control, false));
    }
}
