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
//! Session configuration. Settings are layered from an optional YAML file, `AUTOSAMPLER_`
//! environment variables and command line overrides, then resolved once into an immutable
//! [SessionConfig] that is passed to every component.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat, Value};
use serde::Deserialize;

use crate::audio::StreamParams;
use crate::util::DeviceSelector;

mod audio;
mod error;
mod midi;
mod sampling;

pub use error::ConfigError;

const ENV_PREFIX: &str = "AUTOSAMPLER";

/// The raw layered settings.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Settings {
    /// Where samples and metadata are written.
    output_folder: Option<PathBuf>,

    #[serde(default)]
    audio: audio::Audio,

    #[serde(default)]
    midi: midi::Midi,

    #[serde(default)]
    sampling: sampling::Sampling,
}

/// Values set on the command line. These take precedence over every other source.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    values: Vec<(String, Value)>,
}

impl Overrides {
    pub fn new() -> Overrides {
        Overrides::default()
    }

    /// Overrides the given dotted key if a value is present.
    pub fn set<T: Into<Value>>(mut self, key: &str, value: Option<T>) -> Overrides {
        if let Some(value) = value {
            self.values.push((key.to_string(), value.into()));
        }
        self
    }
}

/// Audio input settings for a session.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSettings {
    pub device: DeviceSelector,
    pub params: StreamParams,
}

/// Trigger settings for a session.
#[derive(Debug, Clone, PartialEq)]
pub struct MidiSettings {
    pub device: DeviceSelector,
    /// 1-based channel.
    pub channel: u8,
    pub program: Option<u8>,
    pub settle_delay: Duration,
}

/// Settings for the sweep itself.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingSettings {
    pub low_key: u8,
    pub high_key: u8,
    pub velocity_levels: Vec<u8>,
    pub key_range: u8,
    pub max_attempts: usize,
    pub limit: Duration,
    pub silence_timeout: Duration,
    pub portamento: bool,
    pub ascending: bool,
    pub looping: bool,
    pub flac: bool,
    pub print_progress: bool,
    pub abort_on_clipping: bool,
    pub clipping_ceiling: f64,
    pub clipping_check_note: u8,
}

/// The resolved, validated configuration of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub output_folder: PathBuf,
    pub audio: AudioSettings,
    pub midi: MidiSettings,
    pub sampling: SamplingSettings,
}

impl SessionConfig {
    /// Loads the configuration from the file (if any), the process environment and the
    /// overrides.
    pub fn load(path: Option<&Path>, overrides: Overrides) -> Result<SessionConfig, ConfigError> {
        SessionConfig::load_with_env(path, None, overrides)
    }

    /// Loads the configuration, reading the environment from the given map instead of the
    /// process environment when one is supplied.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
        overrides: Overrides,
    ) -> Result<SessionConfig, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("sampling.velocity_levels")
                .source(env),
        );
        for (key, value) in overrides.values {
            builder = builder.set_override(key, value)?;
        }

        let settings: Settings = builder.build()?.try_deserialize()?;
        SessionConfig::resolve(settings)
    }

    /// Parses a YAML document with nothing else layered on top.
    pub fn from_yaml(yaml: &str) -> Result<SessionConfig, ConfigError> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        SessionConfig::resolve(settings)
    }

    /// Validates raw settings and fills in defaults.
    pub fn resolve(settings: Settings) -> Result<SessionConfig, ConfigError> {
        let output_folder = settings
            .output_folder
            .ok_or_else(|| ConfigError::invalid("output_folder", "no output folder given"))?;

        let sampling = &settings.sampling;
        let low_key = sampling.low_key()?;
        let high_key = sampling.high_key()?;
        if low_key > high_key {
            return Err(ConfigError::invalid(
                "sampling.low_key",
                format!("{} is above the high key {}", low_key, high_key),
            ));
        }

        Ok(SessionConfig {
            output_folder,
            audio: AudioSettings {
                device: settings.audio.device(),
                params: settings.audio.stream_params()?,
            },
            midi: MidiSettings {
                device: settings.midi.device(),
                channel: settings.midi.channel()?,
                program: settings.midi.program()?,
                settle_delay: settings.midi.settle_delay()?,
            },
            sampling: SamplingSettings {
                low_key,
                high_key,
                velocity_levels: sampling.velocity_levels()?,
                key_range: sampling.key_range()?,
                max_attempts: sampling.max_attempts()?,
                limit: sampling.limit()?,
                silence_timeout: sampling.silence_timeout()?,
                portamento: sampling.portamento(),
                ascending: sampling.ascending(),
                looping: sampling.looping(),
                flac: sampling.flac(),
                print_progress: sampling.print_progress(),
                abort_on_clipping: sampling.abort_on_clipping(),
                clipping_ceiling: sampling.clipping_ceiling()?,
                clipping_check_note: sampling.clipping_check_note()?,
            },
        })
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;
    use std::io::Write;
    use std::path::PathBuf;
    use std::time::Duration;

    use super::{ConfigError, Overrides, SessionConfig};
    use crate::audio::BitDepth;
    use crate::util::DeviceSelector;

    #[test]
    fn defaults() {
        let config = SessionConfig::from_yaml("output_folder: out").unwrap();
        assert_eq!(config.output_folder, PathBuf::from("out"));
        assert_eq!(config.audio.device, DeviceSelector::Default);
        assert_eq!(config.audio.params.sample_rate, 48000);
        assert_eq!(config.audio.params.bit_depth, BitDepth::Sixteen);
        assert_eq!(config.audio.params.chunk_size, 1024);
        assert_eq!(config.audio.params.channels, 2);
        assert_eq!(config.midi.channel, 1);
        assert_eq!(config.midi.program, None);
        assert_eq!(config.midi.settle_delay, Duration::from_secs(1));

        let sampling = &config.sampling;
        assert_eq!(sampling.low_key, 21);
        assert_eq!(sampling.high_key, 109);
        assert_eq!(sampling.velocity_levels, vec![15, 44, 63, 79, 95, 111, 127]);
        assert_eq!(sampling.key_range, 1);
        assert_eq!(sampling.max_attempts, 8);
        assert_eq!(sampling.limit, Duration::from_secs(45));
        assert_eq!(sampling.silence_timeout, Duration::from_secs(2));
        assert!(!sampling.portamento);
        assert!(!sampling.ascending);
        assert!(!sampling.looping);
        assert!(!sampling.flac);
        assert!(sampling.abort_on_clipping);
        assert_eq!(sampling.clipping_ceiling, 0.85);
        assert_eq!(sampling.clipping_check_note, 48);
    }

    #[test]
    fn full_file() {
        let yaml = r#"
            output_folder: /tmp/piano
            audio:
              device: scarlett
              sample_rate: 96000
              bit_depth: 24
              chunk_size: 512
            midi:
              device_index: 2
              channel: 10
              program: 5
              settle_delay: 250ms
            sampling:
              low_key: C4
              high_key: 72
              velocity_levels: [64, 127]
              key_range: 3
              max_attempts: 2
              limit: 10s
              looping: true
              ascending: true
              abort_on_clipping: false
              clipping_check_note: Db3
        "#;

        let config = SessionConfig::from_yaml(yaml).unwrap();
        assert_eq!(
            config.audio.device,
            DeviceSelector::Name("scarlett".to_string())
        );
        assert_eq!(config.audio.params.sample_rate, 96000);
        assert_eq!(config.audio.params.bit_depth, BitDepth::TwentyFour);
        assert_eq!(config.audio.params.chunk_size, 512);
        assert_eq!(config.midi.device, DeviceSelector::Index(2));
        assert_eq!(config.midi.channel, 10);
        assert_eq!(config.midi.program, Some(5));
        assert_eq!(config.midi.settle_delay, Duration::from_millis(250));
        assert_eq!(config.sampling.low_key, 60);
        assert_eq!(config.sampling.high_key, 72);
        assert_eq!(config.sampling.velocity_levels, vec![64, 127]);
        assert_eq!(config.sampling.key_range, 3);
        assert_eq!(config.sampling.max_attempts, 2);
        assert_eq!(config.sampling.limit, Duration::from_secs(10));
        assert!(config.sampling.looping);
        assert!(config.sampling.ascending);
        assert!(!config.sampling.abort_on_clipping);
        assert_eq!(config.sampling.clipping_check_note, 49);
    }

    fn invalid_field(yaml: &str) -> &'static str {
        match SessionConfig::from_yaml(yaml) {
            Err(ConfigError::Invalid { field, .. }) => field,
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn validation() {
        assert_eq!(invalid_field("audio:\n  bit_depth: 16"), "output_folder");
        assert_eq!(
            invalid_field("output_folder: o\nsampling:\n  velocity_levels: [44, 15]"),
            "sampling.velocity_levels"
        );
        assert_eq!(
            invalid_field("output_folder: o\nsampling:\n  velocity_levels: [15, 15]"),
            "sampling.velocity_levels"
        );
        assert_eq!(
            invalid_field("output_folder: o\nsampling:\n  velocity_levels: [0, 15]"),
            "sampling.velocity_levels"
        );
        assert_eq!(
            invalid_field("output_folder: o\nsampling:\n  velocity_levels: [15, 128]"),
            "sampling.velocity_levels"
        );
        assert_eq!(
            invalid_field("output_folder: o\nsampling:\n  velocity_levels: [15, 64]"),
            "sampling.velocity_levels"
        );
        assert_eq!(
            invalid_field("output_folder: o\nsampling:\n  low_key: 70\n  high_key: 60"),
            "sampling.low_key"
        );
        assert_eq!(
            invalid_field("output_folder: o\nsampling:\n  high_key: 128"),
            "sampling.high_key"
        );
        assert_eq!(
            invalid_field("output_folder: o\nsampling:\n  low_key: H2"),
            "sampling.low_key"
        );
        assert_eq!(
            invalid_field("output_folder: o\nsampling:\n  key_range: 0"),
            "sampling.key_range"
        );
        assert_eq!(
            invalid_field("output_folder: o\nsampling:\n  max_attempts: 0"),
            "sampling.max_attempts"
        );
        assert_eq!(
            invalid_field("output_folder: o\nsampling:\n  limit: forever"),
            "sampling.limit"
        );
        assert_eq!(
            invalid_field("output_folder: o\naudio:\n  bit_depth: 32"),
            "audio.bit_depth"
        );
        assert_eq!(
            invalid_field("output_folder: o\nmidi:\n  channel: 17"),
            "midi.channel"
        );
        assert_eq!(
            invalid_field("output_folder: o\nmidi:\n  channel: 0"),
            "midi.channel"
        );
    }

    #[test]
    fn layering() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "output_folder: from-file\naudio:\n  sample_rate: 44100\nmidi:\n  channel: 2"
        )
        .unwrap();

        let env = HashMap::from([
            ("AUTOSAMPLER_MIDI__CHANNEL".to_string(), "3".to_string()),
            (
                "AUTOSAMPLER_SAMPLING__VELOCITY_LEVELS".to_string(),
                "32,127".to_string(),
            ),
        ]);
        let overrides = Overrides::new()
            .set("output_folder", Some("from-cli"))
            .set("sampling.looping", Some(true))
            .set::<i64>("sampling.max_attempts", None);

        let config = SessionConfig::load_with_env(
            Some(file.path()),
            Some(env),
            overrides,
        )
        .unwrap();
        assert_eq!(config.output_folder, PathBuf::from("from-cli"));
        assert_eq!(config.audio.params.sample_rate, 44100);
        assert_eq!(config.midi.channel, 3);
        assert_eq!(config.sampling.velocity_levels, vec![32, 127]);
        assert!(config.sampling.looping);
        assert_eq!(config.sampling.max_attempts, 8);
    }
}
