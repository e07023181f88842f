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
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use hound::{WavSpec, WavWriter};

use super::{Frame, OutputFormat, SampleFormat, DEFAULT_CHANNELS};

/// Writes rendered periods to a stereo WAV file for offline rendering.
pub struct WavOutput {
    writer: WavWriter<BufWriter<File>>,
    format: OutputFormat,
    frames: u64,
}

impl WavOutput {
    pub fn create(
        path: &Path,
        sample_rate: u32,
        format: OutputFormat,
    ) -> Result<WavOutput, hound::Error> {
        let spec = WavSpec {
            channels: DEFAULT_CHANNELS as u16,
            sample_rate,
            bits_per_sample: format.bits_per_sample,
            sample_format: match format.sample_format {
                SampleFormat::Float => hound::SampleFormat::Float,
                SampleFormat::Int => hound::SampleFormat::Int,
            },
        };
        Ok(WavOutput {
            writer: WavWriter::create(path, spec)?,
            format,
            frames: 0,
        })
    }

    pub fn write(&mut self, frames: &[Frame]) -> Result<(), hound::Error> {
        for frame in frames {
            for &sample in frame {
                match (self.format.sample_format, self.format.bits_per_sample) {
                    (SampleFormat::Float, _) => self.writer.write_sample(sample)?,
                    (SampleFormat::Int, 16) => {
                        self.writer.write_sample(OutputFormat::to_i16(sample))?
                    }
                    (SampleFormat::Int, _) => {
                        self.writer.write_sample(OutputFormat::to_i32(sample))?
                    }
                }
            }
        }
        self.frames += frames.len() as u64;
        Ok(())
    }

    /// Frames written so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn finalize(self) -> Result<(), hound::Error> {
        self.writer.finalize()
    }
}
