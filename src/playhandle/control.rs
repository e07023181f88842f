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
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::audio::DEFAULT_VOLUME;

/// Lifecycle of a play handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Registered but not yet rendered.
    Created,
    /// Rendered at least once.
    Active,
    /// Retired by the mixer.
    Done,
}

struct Shared {
    frames_rendered: AtomicU64,
    started: AtomicBool,
    stopped: AtomicBool,
    hold_open: AtomicBool,
    /// f32 bits of the volume parameter.
    volume: AtomicU32,
    finished: Mutex<bool>,
    condvar: Condvar,
}

/// The control-thread view of a play handle.
///
/// The handle itself moves into the mixer; whoever created it keeps a clone of its
/// control to stop it, adjust its volume, or wait for it to finish.
#[derive(Clone)]
pub struct HandleControl {
    shared: Arc<Shared>,
}

impl HandleControl {
    pub fn new() -> HandleControl {
        HandleControl {
            shared: Arc::new(Shared {
                frames_rendered: AtomicU64::new(0),
                started: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                hold_open: AtomicBool::new(false),
                volume: AtomicU32::new(DEFAULT_VOLUME.to_bits()),
                finished: Mutex::new(false),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Frames rendered so far, at the mixer rate. Never decreases.
    pub fn frames_rendered(&self) -> u64 {
        self.shared.frames_rendered.load(Ordering::Acquire)
    }

    /// Records one rendered period.
    pub(crate) fn advance(&self, frames: u64) {
        self.shared.started.store(true, Ordering::Release);
        self.shared
            .frames_rendered
            .fetch_add(frames, Ordering::AcqRel);
    }

    /// Asks the handle to stop. Sample handles end immediately; synth handles play
    /// their release tail first.
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }

    /// While set, the handle reports not-done even past its natural end.
    pub fn set_hold_open(&self, hold_open: bool) {
        self.shared.hold_open.store(hold_open, Ordering::Release);
    }

    pub fn is_held_open(&self) -> bool {
        self.shared.hold_open.load(Ordering::Acquire)
    }

    /// Volume parameter, 0..=200 with 100 as unity gain.
    pub fn set_volume(&self, volume: f32) {
        self.shared.volume.store(volume.to_bits(), Ordering::Release);
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.shared.volume.load(Ordering::Acquire))
    }

    pub fn is_finished(&self) -> bool {
        *self.shared.finished.lock()
    }

    pub(crate) fn mark_finished(&self) {
        let mut finished = self.shared.finished.lock();
        *finished = true;
        self.shared.condvar.notify_all();
    }

    /// Blocks until the mixer retires the handle or `timeout` passes. Returns whether the
    /// handle finished.
    pub fn wait_finished(&self, timeout: Duration) -> bool {
        let mut finished = self.shared.finished.lock();
        if !*finished {
            self.shared
                .condvar
                .wait_while_for(&mut finished, |finished| !*finished, timeout);
        }
        *finished
    }

    pub fn state(&self) -> HandleState {
        if self.is_finished() {
            HandleState::Done
        } else if self.shared.started.load(Ordering::Acquire) {
            HandleState::Active
        } else {
            HandleState::Created
        }
    }
}

impl Default for HandleControl {
    fn default() -> Self {
        HandleControl::new()
    }
}
