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

//! The capability a polyphonic synthesizer has to provide.
//!
//! Engines are not reentrant. Every call into one goes through the owning
//! [`SynthAdapter`](super::SynthAdapter), which serializes them.

use std::path::Path;
use std::sync::Arc;

use super::SynthError;
use crate::audio::Frame;
use crate::resource::ResourceLoadError;

/// Identifies a bank within one engine instance.
pub type BankId = u32;

/// A family of synthesizer engines and the voice banks they play.
pub trait SynthBackend: Send + Sync + 'static {
    /// Loaded voice bank data, shared between engine instances.
    type Bank: Send + Sync + 'static;
    type Engine: SynthEngine<Bank = Self::Bank>;

    fn name(&self) -> &str;

    /// Reads a voice bank from disk. Runs on a control thread.
    fn load_bank(&self, path: &Path) -> Result<Self::Bank, ResourceLoadError>;

    /// Creates an engine rendering at (about) `sample_rate`. The engine reports the rate
    /// it actually renders at through [`SynthEngine::sample_rate`].
    fn create_engine(&self, sample_rate: u32) -> Result<Self::Engine, SynthError>;
}

/// One synthesizer instance.
pub trait SynthEngine: Send + 'static {
    type Bank;

    fn sample_rate(&self) -> u32;

    /// Attaches a bank to this instance.
    fn add_bank(&mut self, bank: Arc<Self::Bank>) -> Result<BankId, SynthError>;

    /// Detaches a bank from this instance only.
    fn remove_bank(&mut self, id: BankId);

    fn select_program(
        &mut self,
        channel: u8,
        bank_id: BankId,
        bank: u32,
        patch: u32,
    ) -> Result<(), SynthError>;

    fn note_on(&mut self, channel: u8, note: u8, velocity: u8);

    fn note_off(&mut self, channel: u8, note: u8);

    /// Renders `out.len()` frames, overwriting `out`.
    fn write(&mut self, out: &mut [Frame]);
}
