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
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use duration_string::DurationString;
use tracing::{debug, info, warn};

use soundcore::audio::cpal::OutputStream;
use soundcore::audio::wav::WavOutput;
use soundcore::audio::{self, Frame};
use soundcore::config::Config;
use soundcore::playhandle::HandleControl;
use soundcore::session::Session;
use soundcore::track::Origin;

/// Upper bound on offline renders, in case a handle never finishes.
const MAX_RENDER_SECONDS: u64 = 600;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A period-based audio rendering core."
)]
struct Cli {
    /// The path to a YAML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Overrides the configured output sample rate.
    #[arg(short = 'r', long, global = true)]
    sample_rate: Option<u32>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Renders a sample through the mixer into a WAV file.
    Render {
        /// The sample to render.
        sample: PathBuf,
        /// The WAV file to write.
        output: PathBuf,
        /// Playback volume, 0-200.
        #[arg(short, long, default_value_t = 100.0)]
        volume: f32,
    },
    /// Plays notes on the built-in sampler instrument and writes the result to a WAV file.
    Synth {
        /// The audio file used as the voice bank.
        bank: PathBuf,
        /// The WAV file to write.
        output: PathBuf,
        /// Note frequencies in Hz, played one after another. For example, 440,523.25,659.25.
        #[arg(short, long, value_delimiter = ',', default_value = "440")]
        notes: Vec<f32>,
        /// How long each note is held.
        #[arg(short = 'l', long, default_value = "500ms")]
        note_length: String,
        /// The patch to select.
        #[arg(short, long, default_value_t = 0)]
        patch: i32,
    },
    /// Plays a sample through the configured audio device.
    Play {
        /// The sample to play.
        sample: PathBuf,
    },
}

fn load_config(path: Option<&Path>, sample_rate: Option<u32>) -> Result<Config, Box<dyn Error>> {
    let config = match path {
        Some(path) => Config::deserialize(path)?,
        None => Config::default(),
    };
    Ok(match sample_rate {
        Some(sample_rate) => {
            let audio = config.audio().clone().with_sample_rate(sample_rate);
            config.with_audio(audio)
        }
        None => config,
    })
}

/// Renders periods into `output` until `control` is finished.
fn render_until_finished(
    session: &Session,
    control: &HandleControl,
    output: &mut WavOutput,
    period: &mut [Frame],
) -> Result<(), Box<dyn Error>> {
    let mixer = session.mixer();
    let limit = MAX_RENDER_SECONDS * mixer.sample_rate() as u64;
    while !control.is_finished() {
        if output.frames() >= limit {
            warn!(limit_seconds = MAX_RENDER_SECONDS, "Render limit reached");
            break;
        }
        mixer.render_period(period);
        output.write(period)?;
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Render {
            sample,
            output,
            volume,
        } => {
            let config = load_config(cli.config.as_deref(), cli.sample_rate)?;
            let session = Session::new(&config)?;
            let mixer = session.mixer();

            let mut wav =
                WavOutput::create(&output, mixer.sample_rate(), config.audio().output_format()?)?;
            let mut period = vec![[0.0; 2]; mixer.frames_per_period()];

            let control = session.play_sample(&sample, Origin::NONE)?;
            control.set_volume(volume);
            render_until_finished(&session, &control, &mut wav, &mut period)?;

            info!(
                output = ?output,
                frames = wav.frames(),
                periods = mixer.periods_rendered(),
                "Rendered sample"
            );
            session.shutdown();
            wav.finalize()?;
        }
        Commands::Synth {
            bank,
            output,
            notes,
            note_length,
            patch,
        } => {
            let config = load_config(cli.config.as_deref(), cli.sample_rate)?;
            let note_length: Duration = DurationString::from_string(note_length)?.into();
            let session = Session::new(&config)?;
            let mixer = session.mixer();

            let instrument = session.create_instrument();
            instrument.open_file(&bank)?;
            instrument.set_patch(patch)?;
            let control = session.start_instrument(&instrument, Origin::NONE);

            let mut wav =
                WavOutput::create(&output, mixer.sample_rate(), config.audio().output_format()?)?;
            let mut period = vec![[0.0; 2]; mixer.frames_per_period()];
            let note_frames = (note_length.as_secs_f64() * mixer.sample_rate() as f64) as u64;

            for frequency in notes {
                let Some(held) = instrument.note_on(frequency, 100) else {
                    warn!(frequency, "Skipping note outside of playable range");
                    continue;
                };
                let end = wav.frames() + note_frames;
                while wav.frames() < end {
                    mixer.render_period(&mut period);
                    wav.write(&period)?;
                }
                held.release();
            }

            // Let the release tail ring out.
            control.stop();
            render_until_finished(&session, &control, &mut wav, &mut period)?;

            info!(output = ?output, frames = wav.frames(), "Rendered notes");
            session.shutdown();
            wav.finalize()?;
        }
        Commands::Play { sample } => {
            let config = load_config(cli.config.as_deref(), cli.sample_rate)?;
            let session = Session::new(&config)?;
            let stream = OutputStream::open(session.mixer().clone(), config.audio())?;

            let control = session.play_sample(&sample, Origin::NONE)?;
            while !control.wait_finished(Duration::from_secs(1)) {
                debug!(frames = control.frames_rendered(), "Playing");
            }

            info!(device = stream.device(), "Finished playing");
            drop(stream);
            session.shutdown();
        }
    }

    Ok(())
}
