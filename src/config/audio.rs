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
use std::{str::FromStr, time::Duration};

use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;
use crate::audio::mixer::MixerSettings;
use crate::audio::resampler::ResamplerQuality;
use crate::audio::{OutputFormat, SampleFormat};

const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_FRAMES_PER_PERIOD: usize = 1024;
const DEFAULT_BITS_PER_SAMPLE: u16 = 32;
const DEFAULT_RELEASE_TAIL: Duration = Duration::from_millis(250);

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Audio {
    /// The output device. The host default when unset.
    device: Option<String>,

    /// Output sample rate in Hz (default: 44100)
    sample_rate: Option<u32>,

    /// Frames rendered per period (default: 1024)
    frames_per_period: Option<usize>,

    /// Output sample format (default: "float")
    sample_format: Option<String>,

    /// Output bits per sample (default: 32)
    bits_per_sample: Option<u16>,

    /// Resampler quality: "fast", "medium" or "best" (default: "medium")
    resampler: Option<String>,

    /// How long synth play handles keep rendering after being stopped (default: 250ms)
    release_tail: Option<String>,
}

impl Audio {
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Audio {
        self.sample_rate = Some(sample_rate);
        self
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    /// Returns the output sample rate (default: 44100)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the period size in frames (default: 1024)
    pub fn frames_per_period(&self) -> usize {
        self.frames_per_period.unwrap_or(DEFAULT_FRAMES_PER_PERIOD)
    }

    /// Returns the output sample format (default: Float)
    pub fn sample_format(&self) -> Result<SampleFormat, ConfigError> {
        match self.sample_format.as_deref() {
            Some(format) => {
                SampleFormat::from_str(format).map_err(|e| ConfigError::invalid("sample_format", e))
            }
            None => Ok(SampleFormat::Float),
        }
    }

    /// Returns the output bits per sample (default: 32)
    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample.unwrap_or(DEFAULT_BITS_PER_SAMPLE)
    }

    /// Returns the combined, validated output format.
    pub fn output_format(&self) -> Result<OutputFormat, ConfigError> {
        OutputFormat::new(self.sample_format()?, self.bits_per_sample())
            .map_err(|e| ConfigError::invalid("bits_per_sample", e))
    }

    /// Returns the resampler quality (default: Medium)
    pub fn resampler(&self) -> Result<ResamplerQuality, ConfigError> {
        match self.resampler.as_deref() {
            Some(quality) => {
                ResamplerQuality::from_str(quality).map_err(|e| ConfigError::invalid("resampler", e))
            }
            None => Ok(ResamplerQuality::default()),
        }
    }

    /// Returns the synth release tail (default: 250ms)
    pub fn release_tail(&self) -> Result<Duration, ConfigError> {
        match &self.release_tail {
            Some(release_tail) => Ok(DurationString::from_string(release_tail.clone())
                .map_err(|e| ConfigError::invalid("release_tail", e))?
                .into()),
            None => Ok(DEFAULT_RELEASE_TAIL),
        }
    }

    /// Returns the release tail as a frame count at the configured sample rate.
    pub fn release_tail_frames(&self) -> Result<u64, ConfigError> {
        let tail = self.release_tail()?;
        Ok((tail.as_secs_f64() * self.sample_rate() as f64).round() as u64)
    }

    /// Returns the settings the mixer is created with.
    pub fn mixer_settings(&self) -> Result<MixerSettings, ConfigError> {
        if self.sample_rate() == 0 {
            return Err(ConfigError::invalid("sample_rate", "must be non-zero"));
        }
        if self.frames_per_period() == 0 {
            return Err(ConfigError::invalid("frames_per_period", "must be non-zero"));
        }
        Ok(MixerSettings {
            sample_rate: self.sample_rate(),
            frames_per_period: self.frames_per_period(),
            resampler: self.resampler()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use config::{Config, File, FileFormat};

    use super::*;

    fn parse(yaml: &str) -> Audio {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let audio = parse("device: default");
        assert_eq!(audio.device(), Some("default"));
        assert_eq!(audio.sample_rate(), 44100);
        assert_eq!(audio.frames_per_period(), 1024);
        assert_eq!(audio.sample_format().unwrap(), SampleFormat::Float);
        assert_eq!(audio.bits_per_sample(), 32);
        assert_eq!(audio.resampler().unwrap(), ResamplerQuality::Medium);
        assert_eq!(audio.release_tail().unwrap(), Duration::from_millis(250));
        assert_eq!(audio.release_tail_frames().unwrap(), 11025);
        assert_eq!(audio.output_format().unwrap(), OutputFormat::default());
    }

    #[test]
    fn test_explicit_values() {
        let audio = parse(
            r#"
            sample_rate: 48000
            frames_per_period: 256
            sample_format: int
            bits_per_sample: 16
            resampler: best
            release_tail: 1s
            "#,
        );
        assert_eq!(audio.device(), None);
        assert_eq!(audio.release_tail_frames().unwrap(), 48000);

        let settings = audio.mixer_settings().unwrap();
        assert_eq!(settings.sample_rate, 48000);
        assert_eq!(settings.frames_per_period, 256);
        assert_eq!(settings.resampler, ResamplerQuality::Best);

        let format = audio.output_format().unwrap();
        assert_eq!(format.sample_format, SampleFormat::Int);
        assert_eq!(format.bits_per_sample, 16);
    }

    #[test]
    fn test_invalid_values() {
        assert!(parse("sample_format: double").sample_format().is_err());
        assert!(parse("resampler: perfect").resampler().is_err());
        assert!(parse("release_tail: soon").release_tail().is_err());
        assert!(parse("bits_per_sample: 24").output_format().is_err());
        assert!(matches!(
            parse("frames_per_period: 0").mixer_settings(),
            Err(ConfigError::Invalid {
                field: "frames_per_period",
                ..
            })
        ));
    }
}
