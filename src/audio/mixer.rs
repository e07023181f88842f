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

//! Period-based mixing of play handles.
//!
//! The mixer owns the output sample rate, the period size and the set of active play
//! handles. Control threads add and remove handles at any time; the render thread calls
//! [`Mixer::render_period`] once per period. Three locks are involved and none is held
//! for the whole period:
//! - `membership` guards only the active set and is held for a swap at each period
//!   boundary, never while a handle renders.
//! - `render` serializes periods with each other and with sample rate changes.
//! - `ports` guards track ports.

use std::collections::HashMap;
use std::mem;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::port::{AudioPort, PortId, PortRef};
use super::resampler::{Resampler, ResamplerQuality};
use super::Frame;
use crate::playhandle::{HandleControl, PlayHandle, RenderContext, Rendered};
use crate::track::{TrackId, TrackRegistry};

const MAX_SAMPLE_RATE: u32 = 768_000;

/// Something holding state that depends on the output sample rate.
///
/// Listeners are called synchronously from [`Mixer::set_sample_rate`] while rendering is
/// paused, so they must not call back into the mixer's render path.
pub trait RateListener: Send + Sync {
    fn sample_rate_changed(&self, sample_rate: u32);
}

#[derive(Debug, thiserror::Error)]
pub enum MixerError {
    #[error("invalid sample rate {0}")]
    InvalidSampleRate(u32),

    #[error("invalid period size {0}")]
    InvalidPeriod(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixerSettings {
    pub sample_rate: u32,
    pub frames_per_period: usize,
    pub resampler: ResamplerQuality,
}

impl Default for MixerSettings {
    fn default() -> Self {
        MixerSettings {
            sample_rate: 44100,
            frames_per_period: 1024,
            resampler: ResamplerQuality::default(),
        }
    }
}

/// A play handle plus the converter from its native rate to the mixer rate.
struct Slot {
    handle: Box<dyn PlayHandle>,
    converter: Option<Resampler>,
    /// Converted frames not yet written. A handle that started at an offset writes one
    /// period of converter output over two periods.
    carry: Vec<Frame>,
}

type RemovalPredicate = Box<dyn Fn(&dyn PlayHandle) -> bool + Send>;

struct Membership {
    active: Vec<Slot>,
    /// Removals requested while a period was being rendered.
    pending_removals: Vec<RemovalPredicate>,
    rendering: bool,
}

struct RenderState {
    snapshot: Vec<Slot>,
    working: Vec<Frame>,
    resampled: Vec<Frame>,
}

pub struct Mixer {
    sample_rate: AtomicU32,
    frames_per_period: usize,
    quality: ResamplerQuality,
    tracks: Arc<TrackRegistry>,
    membership: Mutex<Membership>,
    render: Mutex<RenderState>,
    ports: Mutex<HashMap<PortId, AudioPort>>,
    listeners: Mutex<Vec<Weak<dyn RateListener>>>,
    /// Retired handles wait here to be dropped off the render thread.
    graveyard: (Sender<Box<dyn PlayHandle>>, Receiver<Box<dyn PlayHandle>>),
    handle_count: AtomicUsize,
    periods: AtomicU64,
}

impl Mixer {
    pub fn new(settings: MixerSettings, tracks: Arc<TrackRegistry>) -> Result<Mixer, MixerError> {
        validate_rate(settings.sample_rate)?;
        if settings.frames_per_period == 0 {
            return Err(MixerError::InvalidPeriod(settings.frames_per_period));
        }

        let fpp = settings.frames_per_period;
        info!(
            sample_rate = settings.sample_rate,
            frames_per_period = fpp,
            resampler = %settings.resampler,
            "Created mixer"
        );
        Ok(Mixer {
            sample_rate: AtomicU32::new(settings.sample_rate),
            frames_per_period: fpp,
            quality: settings.resampler,
            tracks,
            membership: Mutex::new(Membership {
                active: Vec::new(),
                pending_removals: Vec::new(),
                rendering: false,
            }),
            render: Mutex::new(RenderState {
                snapshot: Vec::new(),
                working: Vec::with_capacity(fpp * 4),
                resampled: Vec::with_capacity(fpp * 2),
            }),
            ports: Mutex::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
            graveyard: unbounded(),
            handle_count: AtomicUsize::new(0),
            periods: AtomicU64::new(0),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Acquire)
    }

    pub fn frames_per_period(&self) -> usize {
        self.frames_per_period
    }

    pub fn tracks(&self) -> &Arc<TrackRegistry> {
        &self.tracks
    }

    /// Number of handles registered and not yet retired.
    pub fn active_handles(&self) -> usize {
        self.handle_count.load(Ordering::Acquire)
    }

    /// Number of periods rendered so far.
    pub fn periods_rendered(&self) -> u64 {
        self.periods.load(Ordering::Acquire)
    }

    /// Registers a handle. If a period is being rendered the handle joins at the next
    /// one. Returns the handle's control.
    pub fn add_play_handle(&self, handle: Box<dyn PlayHandle>) -> HandleControl {
        let control = handle.control().clone();
        let rate = self.sample_rate();

        // Build the converter here so the render thread doesn't have to.
        let converter = match handle.native_rate() {
            Some(native) if native != rate => {
                match Resampler::new(native, rate, self.frames_per_period, self.quality) {
                    Ok(converter) => Some(converter),
                    Err(e) => {
                        warn!(err = %e, "Unable to build resampler, will retry at render");
                        None
                    }
                }
            }
            _ => None,
        };

        debug!(
            kind = %handle.kind(),
            native_rate = ?handle.native_rate(),
            total_frames = ?handle.total_frames(),
            "Adding play handle"
        );
        let carry = Vec::with_capacity(self.frames_per_period);
        self.membership.lock().active.push(Slot {
            handle,
            converter,
            carry,
        });
        self.handle_count.fetch_add(1, Ordering::AcqRel);
        control
    }

    /// Removes every handle matching `predicate`. When called mid-period the removal is
    /// applied at the period boundary; handles already being rendered finish the period.
    pub fn remove_play_handles<F>(&self, predicate: F)
    where
        F: Fn(&dyn PlayHandle) -> bool + Send + 'static,
    {
        let removed = {
            let mut membership = self.membership.lock();
            if membership.rendering {
                membership.pending_removals.push(Box::new(predicate));
                debug!("Queued play handle removal until period boundary");
                return;
            }

            let mut removed = Vec::new();
            let mut i = 0;
            while i < membership.active.len() {
                if predicate(membership.active[i].handle.as_ref()) {
                    removed.push(membership.active.remove(i));
                } else {
                    i += 1;
                }
            }
            removed
        };

        // Dropped outside the lock; this may release shared resources.
        for slot in removed {
            self.handle_count.fetch_sub(1, Ordering::AcqRel);
            slot.handle.control().mark_finished();
        }
    }

    /// Cancels every handle originating from `track` (directly or through a group).
    pub fn remove_track_handles(&self, track: TrackId) {
        self.remove_play_handles(move |handle| handle.is_from_track(track));
    }

    /// Registers a track port that handles can target by id.
    pub fn add_port(&self, name: &str) -> PortId {
        let id = PortId::next();
        let mut port = AudioPort::new(name);
        port.prepare(self.frames_per_period);
        self.ports.lock().insert(id, port);
        debug!(port = %id, name, "Added track port");
        id
    }

    pub fn remove_port(&self, id: PortId) -> bool {
        self.ports.lock().remove(&id).is_some()
    }

    /// Registers `listener` for sample rate changes. The mixer only keeps a weak
    /// reference.
    pub fn subscribe_sample_rate<L: RateListener + 'static>(&self, listener: &Arc<L>) {
        let weak: Weak<dyn RateListener> = Arc::downgrade(listener) as Weak<dyn RateListener>;
        self.listeners.lock().push(weak);
    }

    /// Changes the output rate. Rendering is paused until every listener has
    /// reconfigured; per-handle converters are rebuilt at the start of the next period.
    pub fn set_sample_rate(&self, sample_rate: u32) -> Result<(), MixerError> {
        validate_rate(sample_rate)?;

        let _paused = self.render.lock();
        let previous = self.sample_rate.swap(sample_rate, Ordering::AcqRel);
        if previous == sample_rate {
            return Ok(());
        }
        info!(from = previous, to = sample_rate, "Changing sample rate");

        let listeners: Vec<Arc<dyn RateListener>> = {
            let mut listeners = self.listeners.lock();
            listeners.retain(|l| l.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in listeners {
            listener.sample_rate_changed(sample_rate);
        }
        Ok(())
    }

    /// Starts a thread that drops handles as soon as the render thread retires them.
    /// The thread exits when the mixer is dropped.
    pub fn spawn_collector(&self) -> std::io::Result<()> {
        let retired = self.graveyard.1.clone();
        thread::Builder::new()
            .name("soundcore-gc".to_string())
            .spawn(move || {
                debug!("Collector thread started");
                for handle in retired.iter() {
                    drop(handle);
                }
                debug!("Collector thread stopped");
            })?;
        Ok(())
    }

    /// Drops handles retired by the render thread. Call from a control thread, or use
    /// [`Mixer::spawn_collector`] instead.
    pub fn collect_garbage(&self) -> usize {
        let mut collected = 0;
        for handle in self.graveyard.1.try_iter() {
            drop(handle);
            collected += 1;
        }
        if collected > 0 {
            debug!(collected, "Dropped retired play handles");
        }
        collected
    }

    /// Renders one period into the first `frames_per_period` frames of `out`.
    pub fn render_period(&self, out: &mut [Frame]) {
        let fpp = self.frames_per_period;
        if out.len() < fpp {
            error!(
                len = out.len(),
                frames_per_period = fpp,
                "Output buffer shorter than a period"
            );
            out.fill([0.0; 2]);
            return;
        }
        let out = &mut out[..fpp];
        out.fill([0.0; 2]);

        let mut render = self.render.lock();
        let RenderState {
            snapshot,
            working,
            resampled,
        } = &mut *render;

        {
            let mut membership = self.membership.lock();
            mem::swap(&mut membership.active, snapshot);
            membership.rendering = true;
        }

        let rate = self.sample_rate();
        let period_ctx = RenderContext {
            sample_rate: rate,
            frames_per_period: fpp,
            frames: fpp,
            tracks: &self.tracks,
        };

        let mut ports = self.ports.lock();
        for port in ports.values_mut() {
            port.prepare(fpp);
        }

        for slot in snapshot.iter_mut() {
            let native = slot.handle.native_rate().unwrap_or(rate);
            if !self.prepare_converter(slot, native, rate) {
                continue;
            }

            // A handle starting partway into its first period leaves the frames before
            // its offset untouched.
            let offset = if slot.handle.frames_rendered() == 0 {
                slot.handle.offset().min(fpp - 1)
            } else {
                0
            };
            let frames = fpp - offset;
            let ctx = RenderContext {
                frames,
                ..period_ctx
            };

            let needed = slot
                .converter
                .as_ref()
                .map(|c| c.input_frames_next())
                .unwrap_or(frames);
            working.resize(needed, [0.0; 2]);

            let volume = match slot.handle.render(&ctx, &mut working[..needed]) {
                Rendered::Audible(volume) => volume,
                Rendered::Silent => {
                    slot.carry.clear();
                    continue;
                }
            };

            let (source, count): (&[Frame], usize) = match slot.converter.as_mut() {
                Some(converter) => {
                    let lead = slot.carry.len();
                    resampled.resize(lead + fpp, [0.0; 2]);
                    resampled[..lead].copy_from_slice(&slot.carry);
                    match converter.process(
                        &working[..needed],
                        needed,
                        &mut resampled[lead..],
                        fpp,
                    ) {
                        Ok(generated) => {
                            let available = lead + generated;
                            let count = available.min(frames);
                            slot.carry.clear();
                            slot.carry.extend_from_slice(&resampled[count..available]);
                            (resampled.as_slice(), count)
                        }
                        Err(e) => {
                            warn!(err = %e, "Resampling failed, skipping handle for this period");
                            continue;
                        }
                    }
                }
                None => (working.as_slice(), needed),
            };

            match slot.handle.port() {
                PortRef::Exclusive(port) => {
                    port.prepare(fpp);
                    port.write(source, count, offset, volume);
                    port.mix_into(out);
                }
                PortRef::Track(id) => match ports.get_mut(&id) {
                    Some(port) => {
                        port.write(source, count, offset, volume);
                    }
                    None => warn!(port = %id, "Play handle targets a missing port"),
                },
            }
        }

        for port in ports.values() {
            port.mix_into(out);
        }
        drop(ports);

        let mut membership = self.membership.lock();
        let removals = mem::take(&mut membership.pending_removals);
        let should_retire = |slot: &Slot| {
            slot.handle.done() || removals.iter().any(|p| p(slot.handle.as_ref()))
        };

        let mut i = 0;
        while i < snapshot.len() {
            if should_retire(&snapshot[i]) {
                self.retire(snapshot.remove(i));
            } else {
                i += 1;
            }
        }
        // Handles added during this period only see removals requested alongside them.
        let mut i = 0;
        while i < membership.active.len() {
            if removals.iter().any(|p| p(membership.active[i].handle.as_ref())) {
                let slot = membership.active.remove(i);
                self.retire(slot);
            } else {
                i += 1;
            }
        }

        // Survivors first, then handles added during the period.
        snapshot.append(&mut membership.active);
        mem::swap(&mut membership.active, snapshot);
        membership.rendering = false;
        drop(membership);

        self.periods.fetch_add(1, Ordering::AcqRel);
    }

    /// Makes sure the slot's converter matches `native` -> `rate`. Returns false if the
    /// handle has to be skipped this period.
    fn prepare_converter(&self, slot: &mut Slot, native: u32, rate: u32) -> bool {
        if native == rate {
            slot.converter = None;
            slot.carry.clear();
            return true;
        }

        let result = match slot.converter.as_mut() {
            Some(converter)
                if converter.input_rate() == native && converter.output_rate() == rate =>
            {
                return true
            }
            Some(converter) => {
                slot.carry.clear();
                converter.configure(native, rate)
            }
            None => Resampler::new(native, rate, self.frames_per_period, self.quality)
                .map(|converter| slot.converter = Some(converter)),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(native, rate, err = %e, "Unable to configure resampler");
                slot.converter = None;
                false
            }
        }
    }

    fn retire(&self, slot: Slot) {
        slot.handle.control().mark_finished();
        self.handle_count.fetch_sub(1, Ordering::AcqRel);
        // The receiver lives as long as the mixer, so this only fails during teardown,
        // in which case the handle is dropped here.
        let _ = self.graveyard.0.send(slot.handle);
    }
}

fn validate_rate(sample_rate: u32) -> Result<(), MixerError> {
    if sample_rate == 0 || sample_rate > MAX_SAMPLE_RATE {
        return Err(MixerError::InvalidSampleRate(sample_rate));
    }
    Ok(())
}
