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
use std::path::Path;

use config::{File, FileFormat};
use serde::Deserialize;

mod audio;
mod error;
mod instrument;

pub use audio::Audio;
pub use error::ConfigError;
pub use instrument::{display_index, InstrumentSettings, UNSET_INDEX};

/// The top level configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Config {
    #[serde(default)]
    audio: Audio,

    /// Synth instruments to restore at startup.
    #[serde(default)]
    instruments: Vec<InstrumentSettings>,
}

impl Config {
    /// Replaces the audio section, keeping everything else.
    pub fn with_audio(mut self, audio: Audio) -> Config {
        self.audio = audio;
        self
    }

    /// Parse the configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Config, ConfigError> {
        Ok(config::Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Config>()?)
    }

    /// Parse the configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Config, ConfigError> {
        Ok(config::Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<Config>()?)
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    pub fn instruments(&self) -> &[InstrumentSettings] {
        &self.instruments
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_full_config() {
        let config = Config::from_yaml(
            r#"
            audio:
              device: mock-device
              sample_rate: 48000
            instruments:
              - src: piano.wav
                bank: 0
                patch: 3
              - src: ""
            "#,
        )
        .unwrap();

        assert_eq!(config.audio().device(), Some("mock-device"));
        assert_eq!(config.audio().sample_rate(), 48000);
        assert_eq!(config.instruments().len(), 2);
        assert_eq!(config.instruments()[0].patch, 3);
        assert_eq!(config.instruments()[1], InstrumentSettings::default());
    }

    #[test]
    fn test_with_audio_keeps_instruments() {
        let config = Config::from_yaml(
            r#"
            audio:
              frames_per_period: 256
            instruments:
              - src: organ.wav
                patch: 7
            "#,
        )
        .unwrap();

        let audio = config.audio().clone().with_sample_rate(96000);
        let config = config.with_audio(audio);
        assert_eq!(config.audio().sample_rate(), 96000);
        assert_eq!(config.audio().frames_per_period(), 256);
        assert_eq!(config.instruments().len(), 1);
        assert_eq!(config.instruments()[0].src, "organ.wav");
        assert_eq!(config.instruments()[0].patch, 7);
    }

    #[test]
    fn test_empty_sections() {
        let config = Config::from_yaml("audio: {}").unwrap();
        assert_eq!(config.audio().frames_per_period(), 1024);
        assert!(config.instruments().is_empty());
    }

    #[test]
    fn test_deserialize_file() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("soundcore.yaml");
        fs::write(&path, "audio:\n  frames_per_period: 512\n").unwrap();

        let config = Config::deserialize(&path).unwrap();
        assert_eq!(config.audio().frames_per_period(), 512);

        assert!(matches!(
            Config::deserialize(&tempdir.path().join("missing.yaml")),
            Err(ConfigError::Load(_))
        ));
    }
}
