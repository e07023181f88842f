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

//! A minimal sample-based synthesizer.
//!
//! A bank is a single decoded audio file. Notes play it back pitched relative to
//! [`ROOT_NOTE`] with linear interpolation and fade out over a short linear release.
//! Polyphony is capped; when the cap is hit the oldest voice is stolen.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use super::engine::{BankId, SynthBackend, SynthEngine};
use super::SynthError;
use crate::audio::sample_data::SampleData;
use crate::audio::Frame;
use crate::resource::ResourceLoadError;

/// Note at which a bank plays back at its recorded pitch (440Hz).
pub const ROOT_NOTE: u8 = 57;

/// Highest rate an engine renders at; higher mixer rates are resampled.
pub const MAX_ENGINE_RATE: u32 = 96000;

const DEFAULT_MAX_VOICES: usize = 32;
const RELEASE_SECONDS: f64 = 0.01;
const MAX_PATCH: u32 = 127;

/// Creates [`SamplerEngine`]s and loads banks with symphonia.
pub struct SamplerBackend {
    max_voices: usize,
}

impl SamplerBackend {
    pub fn new() -> SamplerBackend {
        SamplerBackend {
            max_voices: DEFAULT_MAX_VOICES,
        }
    }

    pub fn with_max_voices(max_voices: usize) -> SamplerBackend {
        SamplerBackend {
            max_voices: max_voices.max(1),
        }
    }
}

impl Default for SamplerBackend {
    fn default() -> Self {
        SamplerBackend::new()
    }
}

impl SynthBackend for SamplerBackend {
    type Bank = SampleData;
    type Engine = SamplerEngine;

    fn name(&self) -> &str {
        "sampler"
    }

    fn load_bank(&self, path: &Path) -> Result<SampleData, ResourceLoadError> {
        let data = SampleData::load(path)?;
        if data.is_empty() {
            return Err(ResourceLoadError::Unsupported {
                path: path.to_path_buf(),
                reason: "bank contains no audio".to_string(),
            });
        }
        Ok(data)
    }

    fn create_engine(&self, sample_rate: u32) -> Result<SamplerEngine, SynthError> {
        if sample_rate == 0 {
            return Err(SynthError::Engine("sample rate must be non-zero".to_string()));
        }
        let rate = sample_rate.min(MAX_ENGINE_RATE);
        if rate != sample_rate {
            debug!(
                requested = sample_rate,
                rate, "Clamping sampler engine rate"
            );
        }
        Ok(SamplerEngine {
            sample_rate: rate,
            banks: HashMap::new(),
            next_bank_id: 1,
            programs: HashMap::new(),
            voices: Vec::with_capacity(self.max_voices),
            max_voices: self.max_voices,
            next_voice_id: 0,
        })
    }
}

struct Voice {
    /// Monotonic start order; the lowest id is the oldest voice.
    id: u64,
    channel: u8,
    note: u8,
    bank: BankId,
    data: Arc<SampleData>,
    position: f64,
    step: f64,
    gain: f32,
    /// Remaining and total release frames once released.
    release: Option<(u32, u32)>,
}

impl Voice {
    /// Adds this voice into `out`. Returns false once the voice has finished.
    fn mix(&mut self, out: &mut [Frame]) -> bool {
        let frames = self.data.frames();
        for frame in out.iter_mut() {
            let index = self.position as usize;
            if index >= frames.len() {
                return false;
            }
            let frac = (self.position - index as f64) as f32;
            let current = frames[index];
            let next = frames.get(index + 1).copied().unwrap_or([0.0; 2]);

            let mut gain = self.gain;
            if let Some((remaining, total)) = self.release.as_mut() {
                if *remaining == 0 {
                    return false;
                }
                gain *= *remaining as f32 / *total as f32;
                *remaining -= 1;
            }

            frame[0] += (current[0] + (next[0] - current[0]) * frac) * gain;
            frame[1] += (current[1] + (next[1] - current[1]) * frac) * gain;
            self.position += self.step;
        }
        true
    }
}

/// One sampler instance.
pub struct SamplerEngine {
    sample_rate: u32,
    banks: HashMap<BankId, Arc<SampleData>>,
    next_bank_id: BankId,
    /// Selected bank per channel.
    programs: HashMap<u8, BankId>,
    voices: Vec<Voice>,
    max_voices: usize,
    next_voice_id: u64,
}

impl SamplerEngine {
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }
}

impl SynthEngine for SamplerEngine {
    type Bank = SampleData;

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn add_bank(&mut self, bank: Arc<SampleData>) -> Result<BankId, SynthError> {
        let id = self.next_bank_id;
        self.next_bank_id += 1;
        self.banks.insert(id, bank);
        Ok(id)
    }

    fn remove_bank(&mut self, id: BankId) {
        self.banks.remove(&id);
        self.voices.retain(|v| v.bank != id);
        self.programs.retain(|_, bank| *bank != id);
    }

    fn select_program(
        &mut self,
        channel: u8,
        bank_id: BankId,
        bank: u32,
        patch: u32,
    ) -> Result<(), SynthError> {
        // Every bank file holds a single program.
        if bank != 0 || patch > MAX_PATCH || !self.banks.contains_key(&bank_id) {
            return Err(SynthError::ProgramUnavailable { bank, patch });
        }
        self.programs.insert(channel, bank_id);
        Ok(())
    }

    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        let Some(bank) = self.programs.get(&channel).copied() else {
            debug!(channel, note, "No program selected, ignoring note");
            return;
        };
        let Some(data) = self.banks.get(&bank).cloned() else {
            return;
        };
        if velocity == 0 {
            self.note_off(channel, note);
            return;
        }

        if self.voices.len() >= self.max_voices {
            if let Some(oldest) = self.voices.iter().map(|v| v.id).min() {
                self.voices.retain(|v| v.id != oldest);
                warn!(
                    max_voices = self.max_voices,
                    "Voice limit reached, stealing oldest"
                );
            }
        }

        let pitch = 2f64.powf((note as f64 - ROOT_NOTE as f64) / 12.0);
        let step = pitch * data.sample_rate() as f64 / self.sample_rate as f64;
        self.voices.push(Voice {
            id: self.next_voice_id,
            channel,
            note,
            bank,
            data,
            position: 0.0,
            step,
            gain: velocity.min(127) as f32 / 127.0,
            release: None,
        });
        self.next_voice_id += 1;
    }

    fn note_off(&mut self, channel: u8, note: u8) {
        let total = ((self.sample_rate as f64 * RELEASE_SECONDS) as u32).max(1);
        for voice in self
            .voices
            .iter_mut()
            .filter(|v| v.channel == channel && v.note == note && v.release.is_none())
        {
            voice.release = Some((total, total));
        }
    }

    fn write(&mut self, out: &mut [Frame]) {
        out.fill([0.0; 2]);
        self.voices.retain_mut(|voice| voice.mix(out));
    }
}
