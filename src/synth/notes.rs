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
use parking_lot::Mutex;

/// Note number of the 440Hz reference pitch.
const A440_NOTE: f64 = 57.0;

const LOWEST_NOTE: f64 = 1.0;
const HIGHEST_NOTE: f64 = 127.0;

/// Maps a frequency to a note number, `floor(12 * log2(f / 440) + 57)`.
///
/// Frequencies within a hair of an exact semitone snap to it, so that float round-off
/// doesn't push e.g. middle C one note down. Returns `None` for notes outside 1..=127.
pub fn frequency_to_note(frequency: f32) -> Option<u8> {
    if !frequency.is_finite() || frequency <= 0.0 {
        return None;
    }
    let exact = 12.0 * (frequency as f64 / 440.0).log2() + A440_NOTE;
    let nearest = exact.round();
    let note = if (exact - nearest).abs() < 1e-4 {
        nearest
    } else {
        exact.floor()
    };
    if !(LOWEST_NOTE..=HIGHEST_NOTE).contains(&note) {
        return None;
    }
    Some(note as u8)
}

/// Inverse of [`frequency_to_note`].
pub fn note_to_frequency(note: u8) -> f32 {
    (440.0 * 2f64.powf((note as f64 - A440_NOTE) / 12.0)) as f32
}

/// Per-note count of concurrently held instances.
pub struct NoteCounter {
    counts: Mutex<[u32; 128]>,
}

impl NoteCounter {
    pub fn new() -> NoteCounter {
        NoteCounter {
            counts: Mutex::new([0; 128]),
        }
    }

    /// Records another held instance of `note`, returning the new count.
    pub fn press(&self, note: u8) -> u32 {
        let mut counts = self.counts.lock();
        let count = &mut counts[(note & 0x7f) as usize];
        *count += 1;
        *count
    }

    /// Releases one instance of `note`. Returns true if it was the last one, i.e. the
    /// engine should now receive a note-off.
    pub fn release(&self, note: u8) -> bool {
        let mut counts = self.counts.lock();
        let count = &mut counts[(note & 0x7f) as usize];
        if *count == 0 {
            return false;
        }
        *count -= 1;
        *count == 0
    }

    pub fn active(&self, note: u8) -> u32 {
        self.counts.lock()[(note & 0x7f) as usize]
    }
}

impl Default for NoteCounter {
    fn default() -> Self {
        NoteCounter::new()
    }
}
