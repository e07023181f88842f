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

//! Fully decoded stereo sample data, the payload shared by sample play handles and the
//! built-in sampler bank.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::info;

use super::Frame;
use crate::resource::ResourceLoadError;

/// Decoded audio, always stereo, at the file's native sample rate.
pub struct SampleData {
    frames: Vec<Frame>,
    sample_rate: u32,
    path: Option<PathBuf>,
}

impl SampleData {
    /// Wraps frames that were rendered or generated in memory (e.g. a frozen pattern).
    pub fn from_frames(frames: Vec<Frame>, sample_rate: u32) -> SampleData {
        SampleData {
            frames,
            sample_rate,
            path: None,
        }
    }

    /// Decodes the whole file at `path` into memory.
    pub fn load(path: &Path) -> Result<SampleData, ResourceLoadError> {
        let file = File::open(path).map_err(|e| ResourceLoadError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let decode_error = |reason: String| ResourceLoadError::Decode {
            path: path.to_path_buf(),
            reason,
        };

        let probed = get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| decode_error(e.to_string()))?;
        let mut format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| ResourceLoadError::Unsupported {
                path: path.to_path_buf(),
                reason: "no audio track found".to_string(),
            })?;
        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| ResourceLoadError::Unsupported {
                path: path.to_path_buf(),
                reason: "sample rate not specified".to_string(),
            })?;

        let mut decoder = get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| decode_error(e.to_string()))?;

        let mut frames: Vec<Frame> = Vec::new();

        loop {
            let packet = match format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break
                }
                // Some readers report the end of the stream as a decode error.
                Err(SymphoniaError::DecodeError(_)) => break,
                Err(e) => return Err(decode_error(e.to_string())),
            };
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    decoder
                        .decode(&packet)
                        .map_err(|e| decode_error(e.to_string()))?
                }
                Err(SymphoniaError::DecodeError(_)) => continue,
                Err(e) => return Err(decode_error(e.to_string())),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count();
            if channels == 0 || decoded.frames() == 0 {
                continue;
            }

            let mut sample_buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            sample_buffer.copy_interleaved_ref(decoded);

            // Mono is duplicated; anything beyond two channels is dropped.
            frames.extend(sample_buffer.samples().chunks_exact(channels).map(|s| {
                if channels == 1 {
                    [s[0], s[0]]
                } else {
                    [s[0], s[1]]
                }
            }));
        }

        let data = SampleData {
            frames,
            sample_rate,
            path: Some(path.to_path_buf()),
        };

        info!(
            path = ?path,
            sample_rate,
            duration_ms = data.duration().as_millis(),
            memory_kb = data.memory_size() / 1024,
            "Sample loaded"
        );

        Ok(data)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames.len() as f64 / self.sample_rate as f64)
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        std::mem::size_of_val(self.frames.as_slice())
    }
}
