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

//! Per-source sample rate conversion.
//!
//! Each resampler produces a fixed number of output frames per call (one mixer period)
//! and tells its caller how many input frames it needs for the next call. Filter state
//! persists between calls so consecutive periods of one source stay phase-continuous.

use std::{error::Error, fmt, str::FromStr};

use rubato::{
    FastFixedOut, PolynomialDegree, SincFixedOut, SincInterpolationParameters,
    SincInterpolationType, VecResampler, WindowFunction,
};
use tracing::debug;

use super::{Frame, DEFAULT_CHANNELS};

#[derive(Debug, thiserror::Error)]
pub enum ResampleError {
    #[error("resampler needs {needed} output frames but only {capacity} are available")]
    InsufficientOutputCapacity { needed: usize, capacity: usize },

    #[error("resampler needs {needed} input frames but only {available} were given")]
    InsufficientInput { needed: usize, available: usize },

    #[error("unable to build resampler from {input_rate}Hz to {output_rate}Hz: {reason}")]
    Construction {
        input_rate: u32,
        output_rate: u32,
        reason: String,
    },

    #[error("resampling failed: {0}")]
    Processing(String),
}

/// Interpolation quality presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResamplerQuality {
    /// Cubic polynomial interpolation.
    Fast,
    /// Short windowed sinc.
    #[default]
    Medium,
    /// Long windowed sinc.
    Best,
}

impl FromStr for ResamplerQuality {
    type Err = Box<dyn Error>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fast" => Ok(ResamplerQuality::Fast),
            "medium" => Ok(ResamplerQuality::Medium),
            "best" => Ok(ResamplerQuality::Best),
            _ => Err(format!("Unsupported resampler quality: {}", s).into()),
        }
    }
}

impl fmt::Display for ResamplerQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResamplerQuality::Fast => "fast",
            ResamplerQuality::Medium => "medium",
            ResamplerQuality::Best => "best",
        })
    }
}

type Inner = Box<dyn VecResampler<f32> + Send>;

/// Converts a stream rendered at `input_rate` to `output_rate`, one fixed-size chunk of
/// output at a time.
pub struct Resampler {
    input_rate: u32,
    output_rate: u32,
    chunk: usize,
    quality: ResamplerQuality,
    /// None when the rates are equal.
    inner: Option<Inner>,
    input: Vec<Vec<f32>>,
    output: Vec<Vec<f32>>,
}

impl Resampler {
    /// Creates a resampler that produces `chunk` output frames per call.
    pub fn new(
        input_rate: u32,
        output_rate: u32,
        chunk: usize,
        quality: ResamplerQuality,
    ) -> Result<Resampler, ResampleError> {
        let mut resampler = Resampler {
            input_rate,
            output_rate,
            chunk,
            quality,
            inner: None,
            input: Vec::new(),
            output: Vec::new(),
        };
        resampler.rebuild()?;
        Ok(resampler)
    }

    /// Re-derives the conversion ratio. Internal filter state is discarded, so the next
    /// chunk may be discontinuous with the previous one.
    pub fn configure(&mut self, input_rate: u32, output_rate: u32) -> Result<(), ResampleError> {
        debug!(
            from = self.input_rate,
            to = self.output_rate,
            new_from = input_rate,
            new_to = output_rate,
            "Reconfiguring resampler"
        );
        self.input_rate = input_rate;
        self.output_rate = output_rate;
        self.rebuild()
    }

    fn rebuild(&mut self) -> Result<(), ResampleError> {
        if self.input_rate == 0 || self.output_rate == 0 || self.chunk == 0 {
            return Err(ResampleError::Construction {
                input_rate: self.input_rate,
                output_rate: self.output_rate,
                reason: "rates and chunk size must be non-zero".to_string(),
            });
        }

        if self.input_rate == self.output_rate {
            self.inner = None;
            self.input.clear();
            self.output.clear();
            return Ok(());
        }

        let ratio = self.ratio();
        let construction_error = |e: rubato::ResamplerConstructionError| {
            ResampleError::Construction {
                input_rate: self.input_rate,
                output_rate: self.output_rate,
                reason: e.to_string(),
            }
        };

        let inner: Inner = match self.quality {
            ResamplerQuality::Fast => Box::new(
                FastFixedOut::<f32>::new(
                    ratio,
                    1.0,
                    PolynomialDegree::Cubic,
                    self.chunk,
                    DEFAULT_CHANNELS,
                )
                .map_err(construction_error)?,
            ),
            ResamplerQuality::Medium => Box::new(
                SincFixedOut::<f32>::new(
                    ratio,
                    1.0,
                    SincInterpolationParameters {
                        sinc_len: 128,
                        f_cutoff: 0.925,
                        oversampling_factor: 128,
                        interpolation: SincInterpolationType::Linear,
                        window: WindowFunction::Blackman2,
                    },
                    self.chunk,
                    DEFAULT_CHANNELS,
                )
                .map_err(construction_error)?,
            ),
            ResamplerQuality::Best => Box::new(
                SincFixedOut::<f32>::new(
                    ratio,
                    1.0,
                    SincInterpolationParameters {
                        sinc_len: 256,
                        f_cutoff: 0.95,
                        oversampling_factor: 128,
                        interpolation: SincInterpolationType::Cubic,
                        window: WindowFunction::BlackmanHarris2,
                    },
                    self.chunk,
                    DEFAULT_CHANNELS,
                )
                .map_err(construction_error)?,
            ),
        };

        // Pre-size the planar scratch so process() doesn't allocate.
        self.input = (0..DEFAULT_CHANNELS)
            .map(|_| Vec::with_capacity(inner.input_frames_max()))
            .collect();
        self.output = vec![vec![0.0; inner.output_frames_max()]; DEFAULT_CHANNELS];
        self.inner = Some(inner);
        Ok(())
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Output frames per input frame.
    pub fn ratio(&self) -> f64 {
        self.output_rate as f64 / self.input_rate as f64
    }

    pub fn is_passthrough(&self) -> bool {
        self.inner.is_none()
    }

    /// Number of input frames the next call to [`Resampler::process`] consumes.
    pub fn input_frames_next(&self) -> usize {
        match &self.inner {
            Some(inner) => inner.input_frames_next(),
            None => self.chunk,
        }
    }

    /// Upper bound of [`Resampler::input_frames_next`] for the current configuration.
    pub fn input_frames_max(&self) -> usize {
        match &self.inner {
            Some(inner) => inner.input_frames_max(),
            None => self.chunk,
        }
    }

    /// Number of frames the next call to [`Resampler::process`] generates.
    pub fn output_frames_next(&self) -> usize {
        match &self.inner {
            Some(inner) => inner.output_frames_next(),
            None => self.chunk,
        }
    }

    /// Converts `in_frames` frames of `input` into `output`, returning the number of frames
    /// generated. `in_frames` must be at least [`Resampler::input_frames_next`].
    pub fn process(
        &mut self,
        input: &[Frame],
        in_frames: usize,
        output: &mut [Frame],
        out_capacity: usize,
    ) -> Result<usize, ResampleError> {
        let capacity = out_capacity.min(output.len());
        let in_frames = in_frames.min(input.len());

        let inner = match self.inner.as_mut() {
            Some(inner) => inner,
            None => {
                if in_frames > capacity {
                    return Err(ResampleError::InsufficientOutputCapacity {
                        needed: in_frames,
                        capacity,
                    });
                }
                output[..in_frames].copy_from_slice(&input[..in_frames]);
                return Ok(in_frames);
            }
        };

        let needed_out = inner.output_frames_next();
        if needed_out > capacity {
            return Err(ResampleError::InsufficientOutputCapacity {
                needed: needed_out,
                capacity,
            });
        }

        let needed_in = inner.input_frames_next();
        if in_frames < needed_in {
            return Err(ResampleError::InsufficientInput {
                needed: needed_in,
                available: in_frames,
            });
        }

        for (channel, planar) in self.input.iter_mut().enumerate() {
            planar.clear();
            planar.extend(input[..needed_in].iter().map(|frame| frame[channel]));
        }

        let (_, generated) = inner
            .process_into_buffer(&self.input, &mut self.output, None)
            .map_err(|e| ResampleError::Processing(e.to_string()))?;

        for (i, frame) in output[..generated].iter_mut().enumerate() {
            frame[0] = self.output[0][i];
            frame[1] = self.output[1][i];
        }

        Ok(generated)
    }
}

impl fmt::Debug for Resampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resampler")
            .field("input_rate", &self.input_rate)
            .field("output_rate", &self.output_rate)
            .field("chunk", &self.chunk)
            .field("quality", &self.quality)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough() {
        let mut resampler = Resampler::new(44100, 44100, 4, ResamplerQuality::Best).unwrap();
        assert!(resampler.is_passthrough());
        assert_eq!(resampler.input_frames_next(), 4);

        let input = vec![[0.1, 0.2], [0.3, 0.4], [0.5, 0.6], [0.7, 0.8]];
        let mut output = vec![[0.0; 2]; 4];
        assert_eq!(resampler.process(&input, 4, &mut output, 4).unwrap(), 4);
        assert_eq!(input, output);
    }

    #[test]
    fn test_insufficient_output_capacity() {
        let mut resampler = Resampler::new(44100, 48000, 256, ResamplerQuality::Medium).unwrap();
        let input = vec![[0.0; 2]; resampler.input_frames_next()];
        let mut output = vec![[0.0; 2]; 256];

        match resampler.process(&input, input.len(), &mut output, 100) {
            Err(ResampleError::InsufficientOutputCapacity { needed, capacity }) => {
                assert_eq!(needed, 256);
                assert_eq!(capacity, 100);
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }

        let mut passthrough = Resampler::new(48000, 48000, 8, ResamplerQuality::Fast).unwrap();
        let input = vec![[0.0; 2]; 8];
        let mut output = vec![[0.0; 2]; 8];
        assert!(matches!(
            passthrough.process(&input, 8, &mut output, 4),
            Err(ResampleError::InsufficientOutputCapacity { .. })
        ));
    }

    #[test]
    fn test_insufficient_input() {
        let mut resampler = Resampler::new(48000, 44100, 256, ResamplerQuality::Fast).unwrap();
        let input = vec![[0.0; 2]; 10];
        let mut output = vec![[0.0; 2]; 256];
        assert!(matches!(
            resampler.process(&input, 10, &mut output, 256),
            Err(ResampleError::InsufficientInput { .. })
        ));
    }

    #[test]
    fn test_duration_preserved() {
        let qualities = [
            ResamplerQuality::Fast,
            ResamplerQuality::Medium,
            ResamplerQuality::Best,
        ];
        for (from, to) in [(44100, 48000), (22050, 44100), (48000, 44100)] {
            for quality in qualities {
                let chunk = 1024;
                let mut resampler = Resampler::new(from, to, chunk, quality).unwrap();
                let mut input = vec![[0.0; 2]; resampler.input_frames_max()];
                let mut output = vec![[0.0; 2]; chunk];

                // The first call primes the filter delay line.
                let first = resampler.input_frames_next();
                input.resize(first.max(input.len()), [0.0; 2]);
                resampler.process(&input, first, &mut output, chunk).unwrap();

                let mut total_in = 0usize;
                let mut total_out = 0usize;
                for _ in 0..200 {
                    let needed = resampler.input_frames_next();
                    total_in += needed;
                    total_out += resampler
                        .process(&input, needed, &mut output, chunk)
                        .unwrap();
                }

                let expected = (total_in as f64 * resampler.ratio()).round();
                assert!(
                    (total_out as f64 - expected).abs() <= 1.0,
                    "{} {}->{}: {} input frames produced {} output frames, expected {}",
                    quality,
                    from,
                    to,
                    total_in,
                    total_out,
                    expected
                );
            }
        }
    }

    #[test]
    fn test_dc_is_preserved() {
        let chunk = 512;
        let mut resampler = Resampler::new(22050, 44100, chunk, ResamplerQuality::Medium).unwrap();
        let input = vec![[0.5, -0.25]; resampler.input_frames_max()];
        let mut output = vec![[0.0; 2]; chunk];

        for _ in 0..4 {
            let needed = resampler.input_frames_next();
            resampler.process(&input, needed, &mut output, chunk).unwrap();
        }

        for frame in &output {
            assert!((frame[0] - 0.5).abs() < 0.02, "left sample {}", frame[0]);
            assert!((frame[1] + 0.25).abs() < 0.02, "right sample {}", frame[1]);
        }
    }

    #[test]
    fn test_configure_resets() {
        let mut resampler = Resampler::new(44100, 48000, 256, ResamplerQuality::Medium).unwrap();
        let initial = resampler.input_frames_next();

        let input = vec![[0.0; 2]; resampler.input_frames_max()];
        let mut output = vec![[0.0; 2]; 256];
        resampler.process(&input, initial, &mut output, 256).unwrap();

        resampler.configure(44100, 48000).unwrap();
        assert_eq!(resampler.input_frames_next(), initial);

        resampler.configure(48000, 48000).unwrap();
        assert!(resampler.is_passthrough());
        assert_eq!(resampler.input_frames_next(), 256);

        assert!(resampler.configure(0, 48000).is_err());
    }

    #[test]
    fn test_quality_from_str() {
        assert_eq!(
            ResamplerQuality::from_str("best").unwrap(),
            ResamplerQuality::Best
        );
        assert_eq!(
            ResamplerQuality::from_str("FAST").unwrap(),
            ResamplerQuality::Fast
        );
        assert!(ResamplerQuality::from_str("ultra").is_err());
    }
}
