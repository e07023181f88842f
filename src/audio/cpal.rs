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

//! Real-time output through cpal. The device callback is the render thread: it pulls
//! whole periods from the mixer and hands them out in whatever chunk size the device
//! asks for.

use std::error::Error;
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thread_priority::ThreadPriority;
use tracing::{error, info};

use super::mixer::Mixer;
use super::thread_priority::{
    callback_thread_priority, configure_audio_thread_priority, rt_audio_enabled,
};
use super::{Frame, OutputFormat, SampleFormat};
use crate::config::Audio;

/// Lists the names of every output device on every available host.
pub fn list_output_devices() -> Result<Vec<String>, Box<dyn Error>> {
    // Suppress noisy output here.
    let _shh_stdout = shh::stdout()?;
    let _shh_stderr = shh::stderr()?;

    let mut names = Vec::new();
    for host_id in cpal::available_hosts() {
        let devices = match cpal::host_from_id(host_id)?.output_devices() {
            Ok(devices) => devices,
            Err(e) => {
                error!(
                    err = e.to_string(),
                    host = host_id.name(),
                    "Unable to list devices for host"
                );
                continue;
            }
        };
        for device in devices {
            if let Ok(name) = device.name() {
                names.push(name);
            }
        }
    }

    names.sort();
    names.dedup();
    Ok(names)
}

/// Finds the output device called `name`, or the default output device.
fn find_device(name: Option<&str>) -> Result<cpal::Device, Box<dyn Error>> {
    let _shh_stderr = shh::stderr()?;

    let Some(name) = name.filter(|name| *name != "default") else {
        return cpal::default_host()
            .default_output_device()
            .ok_or_else(|| "no default output device".into());
    };

    for host_id in cpal::available_hosts() {
        let Ok(devices) = cpal::host_from_id(host_id)?.output_devices() else {
            continue;
        };
        for device in devices {
            if device.name().is_ok_and(|n| n.trim() == name) {
                return Ok(device);
            }
        }
    }
    Err(format!("no device found with name {}", name).into())
}

/// Cuts the mixer's periods into device callback buffers.
struct PeriodFeeder {
    mixer: Arc<Mixer>,
    period: Vec<Frame>,
    position: usize,
    channels: usize,
    priority: ThreadPriority,
    rt_audio: bool,
    priority_set: bool,
}

impl PeriodFeeder {
    fn new(mixer: Arc<Mixer>, channels: usize) -> PeriodFeeder {
        let frames = mixer.frames_per_period();
        PeriodFeeder {
            mixer,
            period: vec![[0.0; 2]; frames],
            // Empty, so the first callback renders.
            position: frames,
            channels: channels.max(1),
            priority: callback_thread_priority(),
            rt_audio: rt_audio_enabled(),
            priority_set: false,
        }
    }

    fn fill<T>(&mut self, data: &mut [T], convert: impl Fn(f32) -> T) {
        configure_audio_thread_priority(self.priority, self.rt_audio, &mut self.priority_set);

        for out in data.chunks_mut(self.channels) {
            if self.position >= self.period.len() {
                self.mixer.render_period(&mut self.period);
                self.position = 0;
            }
            let [left, right] = self.period[self.position];
            self.position += 1;

            if out.len() == 1 {
                out[0] = convert((left + right) * 0.5);
                continue;
            }
            for (channel, sample) in out.iter_mut().enumerate() {
                *sample = convert(match channel {
                    0 => left,
                    1 => right,
                    _ => 0.0,
                });
            }
        }
    }
}

/// A running output stream. Dropping it stops playback.
pub struct OutputStream {
    _stream: cpal::Stream,
    device: String,
    channels: u16,
}

impl OutputStream {
    /// Opens the configured device at the mixer's rate and starts pulling periods.
    pub fn open(mixer: Arc<Mixer>, config: &Audio) -> Result<OutputStream, Box<dyn Error>> {
        let device = find_device(config.device())?;
        let device_name = device.name()?;
        let format = config.output_format()?;
        let channels = device.default_output_config()?.channels();

        let stream_config = cpal::StreamConfig {
            channels,
            sample_rate: mixer.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };
        let mut feeder = PeriodFeeder::new(mixer.clone(), channels as usize);
        let on_error = |err: cpal::StreamError| error!(err = %err, "Output stream error");

        let stream = match format {
            OutputFormat {
                sample_format: SampleFormat::Float,
                ..
            } => device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    feeder.fill(data, |sample| sample)
                },
                on_error,
                None,
            )?,
            OutputFormat {
                bits_per_sample: 16,
                ..
            } => device.build_output_stream(
                &stream_config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    feeder.fill(data, OutputFormat::to_i16)
                },
                on_error,
                None,
            )?,
            _ => device.build_output_stream(
                &stream_config,
                move |data: &mut [i32], _: &cpal::OutputCallbackInfo| {
                    feeder.fill(data, OutputFormat::to_i32)
                },
                on_error,
                None,
            )?,
        };
        stream.play()?;

        info!(
            device = device_name.as_str(),
            channels,
            sample_rate = mixer.sample_rate(),
            frames_per_period = mixer.frames_per_period(),
            format = %format.sample_format,
            bits = format.bits_per_sample,
            "Output stream started"
        );
        Ok(OutputStream {
            _stream: stream,
            device: device_name,
            channels,
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}
