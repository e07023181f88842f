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

//! Synthesized instruments.
//!
//! This module provides:
//! - The engine capability traits ([`SynthBackend`], [`SynthEngine`])
//! - [`SynthAdapter`], which serializes access to one engine and survives rate changes
//! - [`SynthInstrument`], the voice-bank instrument with bank/patch parameters
//! - [`SynthPlayHandle`], which renders an instrument through the mixer
//! - A built-in sample-based backend

use std::path::PathBuf;

use crate::resource::{ResourceRegistry, SharedResource};

mod adapter;
mod engine;
mod error;
mod handle;
mod instrument;
mod notes;
pub mod sampler;

#[cfg(test)]
pub(crate) mod mock;

pub use adapter::{Program, SynthAdapter, CHANNEL};
pub use engine::{BankId, SynthBackend, SynthEngine};
pub use error::SynthError;
pub use handle::SynthPlayHandle;
pub use instrument::{HeldNote, InstrumentEvent, SynthInstrument};
pub use notes::{frequency_to_note, note_to_frequency, NoteCounter};

/// Voice banks shared by path across every instrument of one backend.
pub type BankRegistry<B> = ResourceRegistry<PathBuf, <B as SynthBackend>::Bank>;

/// One counted reference to a shared voice bank.
pub type SharedBank<B> = SharedResource<PathBuf, <B as SynthBackend>::Bank>;
