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

//! Thread-safe access to one synthesizer engine instance.
//!
//! Every call into the engine (note events, program changes, rendering, and the engine
//! swap on a sample rate change) happens under one per-instance lock. Voice banks are
//! shared across adapters through a [`BankRegistry`], so two instruments opening the same
//! file load it once but each attach it to their own engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::engine::{BankId, SynthBackend, SynthEngine};
use super::{BankRegistry, SharedBank, SynthError};
use crate::audio::mixer::RateListener;
use crate::audio::Frame;

/// A bank/patch pair selected on the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Program {
    pub bank: u32,
    pub patch: u32,
}

struct LoadedBank<B: SynthBackend> {
    shared: SharedBank<B>,
    id: BankId,
}

struct AdapterState<B: SynthBackend> {
    engine: Option<B::Engine>,
    bank: Option<LoadedBank<B>>,
    program: Option<Program>,
}

/// Channel used for all note and program events.
pub const CHANNEL: u8 = 1;

pub struct SynthAdapter<B: SynthBackend> {
    backend: Arc<B>,
    banks: Arc<BankRegistry<B>>,
    state: Mutex<AdapterState<B>>,
}

impl<B: SynthBackend> SynthAdapter<B> {
    /// Creates an adapter with a fresh engine at `sample_rate`. If the engine can't be
    /// created the adapter still works, but renders silence and ignores note events.
    pub fn new(backend: Arc<B>, banks: Arc<BankRegistry<B>>, sample_rate: u32) -> Self {
        let engine = match backend.create_engine(sample_rate) {
            Ok(engine) => {
                info!(
                    backend = backend.name(),
                    sample_rate = engine.sample_rate(),
                    "Created synthesis engine"
                );
                Some(engine)
            }
            Err(e) => {
                warn!(backend = backend.name(), err = %e, "Unable to create synthesis engine");
                None
            }
        };
        SynthAdapter {
            backend,
            banks,
            state: Mutex::new(AdapterState {
                engine,
                bank: None,
                program: None,
            }),
        }
    }

    /// Runs `f` with exclusive access to the engine. The lock is released on every exit
    /// path, including panics in `f`.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut B::Engine) -> R) -> Result<R, SynthError> {
        let mut state = self.state.lock();
        let engine = state.engine.as_mut().ok_or(SynthError::EngineUnavailable)?;
        Ok(f(engine))
    }

    /// Loads (or shares) the bank at `path` and attaches it to this engine, replacing the
    /// current bank. On failure the current bank stays attached.
    pub fn load_bank(&self, path: &Path) -> Result<(), SynthError> {
        // Loading can be slow, so it happens outside the engine lock.
        let shared = self
            .banks
            .acquire_or_create(path.to_path_buf(), |key| self.backend.load_bank(key))?;

        // Bank references leaving this engine are released after the engine lock, so
        // rendering never waits on the bank registry. `shared` is declared before the
        // guard and outlives it on the error paths too.
        let detached = {
            let mut state = self.state.lock();
            let state = &mut *state;
            let engine = state.engine.as_mut().ok_or(SynthError::EngineUnavailable)?;
            let id = engine.add_bank(shared.payload().clone())?;

            let old = state.bank.take();
            if let Some(old) = &old {
                engine.remove_bank(old.id);
            }
            state.bank = Some(LoadedBank { shared, id });
            state.program = None;
            info!(path = ?path, bank_id = id, "Attached voice bank");
            old
        };

        if let Some(old) = detached {
            debug!(path = ?old.shared.key(), "Detached previous voice bank");
        }
        Ok(())
    }

    /// Detaches the bank from this engine and gives back the shared reference. Other
    /// adapters using the same file keep it. Returns false if nothing was loaded.
    pub fn unload(&self) -> bool {
        let bank = {
            let mut state = self.state.lock();
            let state = &mut *state;
            let Some(bank) = state.bank.take() else {
                return false;
            };
            if let Some(engine) = state.engine.as_mut() {
                engine.remove_bank(bank.id);
            }
            state.program = None;
            bank
        };
        info!(path = ?bank.shared.key(), "Unloaded voice bank");
        true
    }

    pub fn select_program(&self, bank: u32, patch: u32) -> Result<(), SynthError> {
        let mut state = self.state.lock();
        let state = &mut *state;
        let engine = state.engine.as_mut().ok_or(SynthError::EngineUnavailable)?;
        let loaded = state.bank.as_ref().ok_or(SynthError::NoBankLoaded)?;
        engine.select_program(CHANNEL, loaded.id, bank, patch)?;
        state.program = Some(Program { bank, patch });
        debug!(bank, patch, "Selected program");
        Ok(())
    }

    /// No-op without an engine.
    pub fn note_on(&self, channel: u8, note: u8, velocity: u8) {
        let mut state = self.state.lock();
        match state.engine.as_mut() {
            Some(engine) => engine.note_on(channel, note, velocity),
            None => debug!(note, "Dropping note on, no engine"),
        }
    }

    /// No-op without an engine.
    pub fn note_off(&self, channel: u8, note: u8) {
        let mut state = self.state.lock();
        match state.engine.as_mut() {
            Some(engine) => engine.note_off(channel, note),
            None => debug!(note, "Dropping note off, no engine"),
        }
    }

    /// Renders `out.len()` frames at the engine's rate. Without an engine `out` is
    /// zeroed and false is returned.
    pub fn render(&self, out: &mut [Frame]) -> bool {
        let mut state = self.state.lock();
        match state.engine.as_mut() {
            Some(engine) => {
                engine.write(out);
                true
            }
            None => {
                out.fill([0.0; 2]);
                false
            }
        }
    }

    /// The rate the engine renders at, if there is one.
    pub fn native_rate(&self) -> Option<u32> {
        self.state.lock().engine.as_ref().map(|e| e.sample_rate())
    }

    /// Replaces the engine with one created at `sample_rate`, re-attaching the current
    /// bank and re-selecting the current program before anything else can render.
    pub fn set_sample_rate(&self, sample_rate: u32) -> Result<(), SynthError> {
        let mut state = self.state.lock();
        let state = &mut *state;

        // Drop the old engine first; an engine that fails to come back leaves the
        // adapter silent rather than rendering at a stale rate.
        state.engine = None;
        let mut engine = self.backend.create_engine(sample_rate)?;

        if let Some(bank) = state.bank.as_mut() {
            bank.id = engine.add_bank(bank.shared.payload().clone())?;
            if let Some(program) = state.program {
                if let Err(e) =
                    engine.select_program(CHANNEL, bank.id, program.bank, program.patch)
                {
                    warn!(
                        bank = program.bank,
                        patch = program.patch,
                        err = %e,
                        "Unable to reapply program"
                    );
                    state.program = None;
                }
            }
        }

        info!(
            backend = self.backend.name(),
            requested = sample_rate,
            sample_rate = engine.sample_rate(),
            "Recreated synthesis engine"
        );
        state.engine = Some(engine);
        Ok(())
    }

    pub fn bank_path(&self) -> Option<PathBuf> {
        self.state
            .lock()
            .bank
            .as_ref()
            .map(|bank| bank.shared.key().clone())
    }

    pub fn program(&self) -> Option<Program> {
        self.state.lock().program
    }

    pub fn has_engine(&self) -> bool {
        self.state.lock().engine.is_some()
    }

    pub fn banks(&self) -> &Arc<BankRegistry<B>> {
        &self.banks
    }
}

impl<B: SynthBackend> RateListener for SynthAdapter<B> {
    fn sample_rate_changed(&self, sample_rate: u32) {
        if let Err(e) = self.set_sample_rate(sample_rate) {
            warn!(sample_rate, err = %e, "Unable to recreate synthesis engine");
        }
    }
}
