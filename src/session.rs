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

//! Process-scoped state: one mixer, the track registry and the shared resource caches
//! that every sample and instrument draws from.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::audio::mixer::{Mixer, MixerError};
use crate::config::{Config, ConfigError};
use crate::playhandle::HandleControl;
use crate::resource::ResourceLoadError;
use crate::samples::{SampleLoader, SamplePlayHandle};
use crate::synth::sampler::SamplerBackend;
use crate::synth::{BankRegistry, SynthError, SynthInstrument};
use crate::track::{Origin, TrackRegistry};

pub type SamplerInstrument = SynthInstrument<SamplerBackend>;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Mixer(#[from] MixerError),

    #[error(transparent)]
    Load(#[from] ResourceLoadError),

    #[error(transparent)]
    Synth(#[from] SynthError),

    #[error("unable to start collector thread: {0}")]
    Collector(#[from] std::io::Error),
}

pub struct Session {
    tracks: Arc<TrackRegistry>,
    mixer: Arc<Mixer>,
    samples: SampleLoader,
    sampler: Arc<SamplerBackend>,
    banks: Arc<BankRegistry<SamplerBackend>>,
    release_tail: Duration,
    instruments: Mutex<Vec<Arc<SamplerInstrument>>>,
}

impl Session {
    pub fn new(config: &Config) -> Result<Session, SessionError> {
        let audio = config.audio();
        let tracks = Arc::new(TrackRegistry::new());
        let mixer = Arc::new(Mixer::new(audio.mixer_settings()?, tracks.clone())?);
        mixer.spawn_collector()?;

        Ok(Session {
            tracks,
            mixer,
            samples: SampleLoader::new(),
            sampler: Arc::new(SamplerBackend::new()),
            banks: Arc::new(BankRegistry::<SamplerBackend>::new("voice banks")),
            release_tail: audio.release_tail()?,
            instruments: Mutex::new(Vec::new()),
        })
    }

    pub fn mixer(&self) -> &Arc<Mixer> {
        &self.mixer
    }

    pub fn tracks(&self) -> &Arc<TrackRegistry> {
        &self.tracks
    }

    pub fn samples(&self) -> &SampleLoader {
        &self.samples
    }

    pub fn banks(&self) -> &Arc<BankRegistry<SamplerBackend>> {
        &self.banks
    }

    /// Loads (or reuses) the sample at `path` and starts playing it.
    pub fn play_sample(&self, path: &Path, origin: Origin) -> Result<HandleControl, SessionError> {
        let handle = SamplePlayHandle::from_file(&self.samples, path, self.mixer.sample_rate())?
            .with_origin(origin);
        Ok(self.mixer.add_play_handle(Box::new(handle)))
    }

    /// Creates a sampler instrument that follows mixer rate changes.
    pub fn create_instrument(&self) -> Arc<SamplerInstrument> {
        let instrument = Arc::new(SynthInstrument::new(
            self.sampler.clone(),
            self.banks.clone(),
            self.mixer.sample_rate(),
        ));
        self.mixer.subscribe_sample_rate(instrument.adapter());
        self.instruments.lock().push(instrument.clone());
        instrument
    }

    /// Starts rendering `instrument` through the mixer. Any previous handle of the
    /// instrument is stopped.
    pub fn start_instrument(&self, instrument: &SamplerInstrument, origin: Origin) -> HandleControl {
        let tail = (self.release_tail.as_secs_f64() * self.mixer.sample_rate() as f64).round();
        self.mixer
            .add_play_handle(Box::new(instrument.play_handle(tail as u64, origin)))
    }

    /// Creates an instrument for each of `config`'s saved instrument settings and starts
    /// it. Instruments whose bank fails to load are skipped.
    pub fn restore_instruments(&self, config: &Config) -> Vec<Arc<SamplerInstrument>> {
        let mut restored = Vec::new();
        for settings in config.instruments() {
            let instrument = self.create_instrument();
            if let Err(e) = instrument.load_settings(settings) {
                warn!(src = %settings.src, err = %e, "Unable to restore instrument");
                self.remove_instrument(&instrument);
                continue;
            }
            self.start_instrument(&instrument, Origin::NONE);
            restored.push(instrument);
        }
        restored
    }

    /// Forgets `instrument`. It shuts down once the last reference to it is dropped.
    pub fn remove_instrument(&self, instrument: &Arc<SamplerInstrument>) {
        self.instruments
            .lock()
            .retain(|existing| !Arc::ptr_eq(existing, instrument));
    }

    /// Stops every handle and instrument and drops what the mixer has retired.
    pub fn shutdown(&self) {
        for instrument in self.instruments.lock().drain(..) {
            instrument.shutdown();
        }
        self.mixer.remove_play_handles(|_| true);
        let collected = self.mixer.collect_garbage();
        info!(
            collected,
            cached_samples = self.samples.cached_count(),
            cached_banks = self.banks.len(),
            "Session shut down"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Instant;

    use super::*;

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        true
    }

    fn session() -> Session {
        Session::new(&Config::from_yaml("audio:\n  frames_per_period: 256\n").unwrap()).unwrap()
    }

    #[test]
    fn test_invalid_config() {
        let config = Config::from_yaml("audio:\n  frames_per_period: 0\n").unwrap();
        assert!(matches!(
            Session::new(&config),
            Err(SessionError::Config(_))
        ));
    }

    #[test]
    fn test_play_sample_shares_cache() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("snare.wav");
        crate::testutil::write_wav(path.clone(), vec![vec![0.5f32; 1000]], 44100).unwrap();

        let session = session();
        let first = session.play_sample(&path, Origin::NONE).unwrap();
        session.play_sample(&path, Origin::NONE).unwrap();
        assert_eq!(session.samples().cached_count(), 1);
        assert_eq!(session.samples().ref_count(&path), 2);

        let mut out = vec![[0.0; 2]; 256];
        session.mixer().render_period(&mut out);
        assert_eq!(out[0], [1.0; 2]);
        assert_eq!(first.frames_rendered(), 256);

        assert!(session
            .play_sample(&tempdir.path().join("missing.wav"), Origin::NONE)
            .is_err());
    }

    #[test]
    fn test_restore_instruments() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("organ.wav");
        crate::testutil::write_wav(path.clone(), vec![vec![0.5f32; 4410]], 44100).unwrap();

        let config = Config::from_yaml(&format!(
            "instruments:\n  - src: {}\n    bank: 0\n    patch: 4\n  - src: {}\n",
            path.display(),
            tempdir.path().join("missing.wav").display()
        ))
        .unwrap();

        let session = session();
        let restored = session.restore_instruments(&config);
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].patch(), 4);
        assert_eq!(session.banks().len(), 1);
        assert_eq!(session.mixer().active_handles(), 1);

        session.mixer().set_sample_rate(48000).unwrap();
        assert_eq!(restored[0].adapter().native_rate(), Some(48000));
        assert_eq!(restored[0].adapter().program().map(|p| p.patch), Some(4));

        drop(restored);
        session.shutdown();
        assert_eq!(session.mixer().active_handles(), 0);
        assert!(wait_until(|| session.banks().is_empty()));
    }

    #[test]
    fn test_retired_handles_collected_in_background() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("kick.wav");
        crate::testutil::write_wav(path.clone(), vec![vec![0.5f32; 300]], 44100).unwrap();

        let session = session();
        let control = session.play_sample(&path, Origin::NONE).unwrap();
        assert_eq!(session.samples().cached_count(), 1);

        let mut out = vec![[0.0; 2]; 256];
        while !control.is_finished() {
            session.mixer().render_period(&mut out);
        }
        assert_eq!(session.mixer().active_handles(), 0);
        assert!(wait_until(|| session.samples().cached_count() == 0));
        assert_eq!(session.samples().ref_count(&path), 0);
    }
}
