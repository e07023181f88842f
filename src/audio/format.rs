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

use std::{error::Error, fmt, str::FromStr};

/// Sample format of the device (or file) the master buffer is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Int,
    Float,
}

impl FromStr for SampleFormat {
    type Err = Box<dyn Error>;

    fn from_str(s: &str) -> Result<Self, Box<dyn Error>> {
        match s {
            "float" | "Float" => Ok(SampleFormat::Float),
            "int" | "Int" => Ok(SampleFormat::Int),
            _ => Err(format!("Unsupported sample format: {}", s).into()),
        }
    }
}

impl SampleFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            SampleFormat::Float => "float",
            SampleFormat::Int => "int",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Format the mixed output is converted to on its way out of the core.
///
/// The mixer always works in stereo f32; this only describes the last conversion step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputFormat {
    pub sample_format: SampleFormat,
    pub bits_per_sample: u16,
}

impl OutputFormat {
    pub fn new(sample_format: SampleFormat, bits_per_sample: u16) -> Result<Self, Box<dyn Error>> {
        match (sample_format, bits_per_sample) {
            (SampleFormat::Float, 32) | (SampleFormat::Int, 16) | (SampleFormat::Int, 32) => {
                Ok(OutputFormat {
                    sample_format,
                    bits_per_sample,
                })
            }
            _ => Err(format!(
                "Unsupported output format: {} bits {}",
                bits_per_sample, sample_format
            )
            .into()),
        }
    }

    /// Converts one normalized sample to a 16-bit integer.
    pub fn to_i16(sample: f32) -> i16 {
        (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
    }

    /// Converts one normalized sample to a 32-bit integer.
    pub fn to_i32(sample: f32) -> i32 {
        (sample.clamp(-1.0, 1.0) as f64 * i32::MAX as f64) as i32
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat {
            sample_format: SampleFormat::Float,
            bits_per_sample: 32,
        }
    }
}
