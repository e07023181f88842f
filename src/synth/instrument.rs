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

//! A voice-bank instrument: one engine, one bank file, a bank/patch selection and the
//! note bookkeeping that keeps retriggered pitches from being cut off.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info};

use super::adapter::{SynthAdapter, CHANNEL};
use super::engine::SynthBackend;
use super::handle::SynthPlayHandle;
use super::notes::{frequency_to_note, NoteCounter};
use super::{BankRegistry, SynthError};
use crate::config::{InstrumentSettings, UNSET_INDEX};
use crate::playhandle::HandleControl;
use crate::track::Origin;

const MAX_BANK: i32 = 999;
const MAX_PATCH: i32 = 127;

/// Notifications for observers of an instrument (e.g. an editor showing its state).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstrumentEvent {
    /// A (re)load of the bank file is about to start.
    Loading(PathBuf),
    /// The bank file was loaded and is now in use.
    Changed(PathBuf),
}

struct Params {
    filename: Option<PathBuf>,
    bank: i32,
    patch: i32,
}

pub struct SynthInstrument<B: SynthBackend> {
    adapter: Arc<SynthAdapter<B>>,
    notes: Arc<NoteCounter>,
    params: Mutex<Params>,
    subscribers: Mutex<Vec<Sender<InstrumentEvent>>>,
    /// Control of the play handle currently rendering this instrument.
    handle: Mutex<Option<HandleControl>>,
}

impl<B: SynthBackend> SynthInstrument<B> {
    pub fn new(backend: Arc<B>, banks: Arc<BankRegistry<B>>, sample_rate: u32) -> Self {
        SynthInstrument {
            adapter: Arc::new(SynthAdapter::new(backend, banks, sample_rate)),
            notes: Arc::new(NoteCounter::new()),
            params: Mutex::new(Params {
                filename: None,
                bank: UNSET_INDEX,
                patch: UNSET_INDEX,
            }),
            subscribers: Mutex::new(Vec::new()),
            handle: Mutex::new(None),
        }
    }

    /// The adapter, e.g. to subscribe it to mixer rate changes.
    pub fn adapter(&self) -> &Arc<SynthAdapter<B>> {
        &self.adapter
    }

    /// Returns a channel that receives every future [`InstrumentEvent`].
    pub fn subscribe(&self) -> Receiver<InstrumentEvent> {
        let (sender, receiver) = unbounded();
        self.subscribers.lock().push(sender);
        receiver
    }

    fn emit(&self, event: InstrumentEvent) {
        // Subscribers that hung up are dropped.
        self.subscribers
            .lock()
            .retain(|sender| sender.send(event.clone()).is_ok());
    }

    /// Loads `path` as this instrument's bank. On success bank and patch reset to 0 and
    /// that program is selected. On failure the previous bank stays in use.
    pub fn open_file(&self, path: &Path) -> Result<(), SynthError> {
        self.emit(InstrumentEvent::Loading(path.to_path_buf()));
        self.adapter.load_bank(path)?;

        {
            let mut params = self.params.lock();
            params.filename = Some(path.to_path_buf());
            params.bank = 0;
            params.patch = 0;
        }
        self.update_patch()?;

        info!(path = ?path, "Opened voice bank");
        self.emit(InstrumentEvent::Changed(path.to_path_buf()));
        Ok(())
    }

    pub fn filename(&self) -> Option<PathBuf> {
        self.params.lock().filename.clone()
    }

    pub fn bank(&self) -> i32 {
        self.params.lock().bank
    }

    pub fn patch(&self) -> i32 {
        self.params.lock().patch
    }

    /// Sets the bank (-1 unsets it) and re-selects the program if both indices are set.
    pub fn set_bank(&self, bank: i32) -> Result<(), SynthError> {
        self.params.lock().bank = bank.clamp(UNSET_INDEX, MAX_BANK);
        self.update_patch()
    }

    /// Sets the patch (-1 unsets it) and re-selects the program if both indices are set.
    pub fn set_patch(&self, patch: i32) -> Result<(), SynthError> {
        self.params.lock().patch = patch.clamp(UNSET_INDEX, MAX_PATCH);
        self.update_patch()
    }

    fn update_patch(&self) -> Result<(), SynthError> {
        let (bank, patch) = {
            let params = self.params.lock();
            (params.bank, params.patch)
        };
        if bank < 0 || patch < 0 {
            debug!(bank, patch, "Program not fully set, skipping selection");
            return Ok(());
        }
        self.adapter.select_program(bank as u32, patch as u32)
    }

    /// Starts a note at `frequency`. Returns `None` (and plays nothing) when the pitch
    /// maps outside the playable range. The engine's note-off is sent when the last
    /// [`HeldNote`] for the same note number is released.
    pub fn note_on(&self, frequency: f32, velocity: u8) -> Option<HeldNote<B>> {
        let Some(note) = frequency_to_note(frequency) else {
            debug!(frequency, "Dropping note outside of playable range");
            return None;
        };
        self.adapter.note_on(CHANNEL, note, velocity.min(127));
        self.notes.press(note);
        Some(HeldNote {
            note,
            adapter: self.adapter.clone(),
            notes: self.notes.clone(),
        })
    }

    /// Creates the play handle that renders this instrument. Any previous handle of this
    /// instrument is stopped.
    pub fn play_handle(&self, release_tail: u64, origin: Origin) -> SynthPlayHandle<B> {
        let handle = SynthPlayHandle::new(self.adapter.clone(), release_tail).with_origin(origin);
        if let Some(previous) = self.handle.lock().replace(handle.handle_control()) {
            previous.stop();
        }
        handle
    }

    pub fn save_settings(&self) -> InstrumentSettings {
        let params = self.params.lock();
        InstrumentSettings {
            src: params
                .filename
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            bank: params.bank,
            patch: params.patch,
        }
    }

    /// Opens the settings' file (if any), then applies its bank and patch.
    pub fn load_settings(&self, settings: &InstrumentSettings) -> Result<(), SynthError> {
        if !settings.src.is_empty() {
            self.open_file(Path::new(&settings.src))?;
        }
        {
            let mut params = self.params.lock();
            params.bank = settings.bank.clamp(UNSET_INDEX, MAX_BANK);
            params.patch = settings.patch.clamp(UNSET_INDEX, MAX_PATCH);
        }
        self.update_patch()
    }

    /// Stops this instrument's play handle and gives back its bank.
    pub fn shutdown(&self) {
        if let Some(control) = self.handle.lock().take() {
            control.stop();
        }
        self.adapter.unload();
    }
}

impl<B: SynthBackend> Drop for SynthInstrument<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// One held instance of a note. Dropping it (or calling [`HeldNote::release`]) releases
/// the instance.
pub struct HeldNote<B: SynthBackend> {
    note: u8,
    adapter: Arc<SynthAdapter<B>>,
    notes: Arc<NoteCounter>,
}

impl<B: SynthBackend> HeldNote<B> {
    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn release(self) {
        drop(self)
    }
}

impl<B: SynthBackend> Drop for HeldNote<B> {
    fn drop(&mut self) {
        if self.notes.release(self.note) {
            self.adapter.note_off(CHANNEL, self.note);
        }
    }
}
