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

//! A period-based audio rendering core.
//!
//! Play handles (sample playback and synthesized instruments) are scheduled on a
//! [`audio::mixer::Mixer`], which renders one period at a time, converts each handle
//! from its native rate and sums everything into a stereo master buffer. Decoded
//! samples and voice banks are shared through reference-counted registries.

pub mod audio;
pub mod config;
pub mod playhandle;
pub mod resource;
pub mod samples;
pub mod session;
pub mod synth;
pub mod track;

#[cfg(test)]
mod testutil;
