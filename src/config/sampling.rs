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
use std::time::Duration;

use serde::Deserialize;

use super::error::ConfigError;
use super::midi::parse_duration;
use crate::zones::note_number;

const DEFAULT_LOW_KEY: u8 = 21;
const DEFAULT_HIGH_KEY: u8 = 109;
const DEFAULT_VELOCITY_LEVELS: [u8; 7] = [15, 44, 63, 79, 95, 111, 127];
const DEFAULT_KEY_RANGE: u8 = 1;
const DEFAULT_MAX_ATTEMPTS: usize = 8;
const DEFAULT_LIMIT: Duration = Duration::from_secs(45);
const DEFAULT_SILENCE_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_CLIPPING_CEILING: f64 = 0.85;
const DEFAULT_CLIPPING_CHECK_NOTE: u8 = 48;

/// A key given either as a MIDI note number or a note name such as "C4".
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum Key {
    Number(u8),
    Name(String),
}

impl Key {
    fn resolve(&self, field: &'static str) -> Result<u8, ConfigError> {
        let note = match self {
            Key::Number(note) => Some(*note),
            Key::Name(name) => name
                .parse::<u8>()
                .ok()
                .or_else(|| note_number(name.trim())),
        };
        note.filter(|note| *note <= 127)
            .ok_or_else(|| ConfigError::invalid(field, format!("{:?} is not a key", self)))
    }
}

/// A YAML representation of the sweep configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Sampling {
    /// Lowest key to sample (default: 21).
    low_key: Option<Key>,

    /// Highest key to sample (default: 109).
    high_key: Option<Key>,

    /// Strictly increasing velocity levels in [1, 127].
    velocity_levels: Option<Vec<u8>>,

    /// Number of keys covered by each sample (default: 1).
    key_range: Option<u8>,

    /// Attempts per note before giving up on I/O errors (default: 8).
    max_attempts: Option<usize>,

    /// Longest a note is held before it is released (default: 45s).
    limit: Option<String>,

    /// Play each note once before sampling it to avoid portamento sweeps.
    portamento: Option<bool>,

    /// Sample from low to high instead of high to low.
    ascending: Option<bool>,

    /// Search for sustain loops.
    looping: Option<bool>,

    /// Request a FLAC pass over the finished samples.
    flac: Option<bool>,

    /// Draw a level meter while recording.
    print_progress: Option<bool>,

    /// Fail instead of warning when the clipping check clips (default: true).
    abort_on_clipping: Option<bool>,

    /// Peak level, as a fraction of full scale, that counts as clipping (default: 0.85).
    clipping_ceiling: Option<f64>,

    /// The note played for the clipping check (default: 48).
    clipping_check_note: Option<Key>,

    /// Continuous silence that ends a capture (default: 2s).
    silence_timeout: Option<String>,
}

impl Sampling {
    pub fn low_key(&self) -> Result<u8, ConfigError> {
        self.low_key
            .as_ref()
            .map_or(Ok(DEFAULT_LOW_KEY), |key| key.resolve("sampling.low_key"))
    }

    pub fn high_key(&self) -> Result<u8, ConfigError> {
        self.high_key
            .as_ref()
            .map_or(Ok(DEFAULT_HIGH_KEY), |key| key.resolve("sampling.high_key"))
    }

    /// Returns the velocity levels, checked to be strictly increasing within [1, 127] and to end
    /// at 127 so that the layers cover every velocity.
    pub fn velocity_levels(&self) -> Result<Vec<u8>, ConfigError> {
        let levels = self
            .velocity_levels
            .clone()
            .unwrap_or_else(|| DEFAULT_VELOCITY_LEVELS.to_vec());

        if levels.is_empty() {
            return Err(ConfigError::invalid("sampling.velocity_levels", "no levels given"));
        }
        if let Some(level) = levels.iter().find(|level| !(1..=127).contains(*level)) {
            return Err(ConfigError::invalid(
                "sampling.velocity_levels",
                format!("{} is not between 1 and 127", level),
            ));
        }
        if levels.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(ConfigError::invalid(
                "sampling.velocity_levels",
                format!("{:?} is not strictly increasing", levels),
            ));
        }
        if levels.last() != Some(&127) {
            return Err(ConfigError::invalid(
                "sampling.velocity_levels",
                format!("{:?} does not end at 127", levels),
            ));
        }
        Ok(levels)
    }

    pub fn key_range(&self) -> Result<u8, ConfigError> {
        match self.key_range.unwrap_or(DEFAULT_KEY_RANGE) {
            0 => Err(ConfigError::invalid("sampling.key_range", "must be at least 1")),
            key_range => Ok(key_range),
        }
    }

    pub fn max_attempts(&self) -> Result<usize, ConfigError> {
        match self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS) {
            0 => Err(ConfigError::invalid("sampling.max_attempts", "must be at least 1")),
            attempts => Ok(attempts),
        }
    }

    pub fn limit(&self) -> Result<Duration, ConfigError> {
        match &self.limit {
            Some(limit) => parse_duration("sampling.limit", limit),
            None => Ok(DEFAULT_LIMIT),
        }
    }

    pub fn silence_timeout(&self) -> Result<Duration, ConfigError> {
        match &self.silence_timeout {
            Some(timeout) => parse_duration("sampling.silence_timeout", timeout),
            None => Ok(DEFAULT_SILENCE_TIMEOUT),
        }
    }

    pub fn portamento(&self) -> bool {
        self.portamento.unwrap_or(false)
    }

    pub fn ascending(&self) -> bool {
        self.ascending.unwrap_or(false)
    }

    pub fn looping(&self) -> bool {
        self.looping.unwrap_or(false)
    }

    pub fn flac(&self) -> bool {
        self.flac.unwrap_or(false)
    }

    pub fn print_progress(&self) -> bool {
        self.print_progress.unwrap_or(false)
    }

    pub fn abort_on_clipping(&self) -> bool {
        self.abort_on_clipping.unwrap_or(true)
    }

    pub fn clipping_ceiling(&self) -> Result<f64, ConfigError> {
        let ceiling = self.clipping_ceiling.unwrap_or(DEFAULT_CLIPPING_CEILING);
        if !(ceiling > 0.0 && ceiling <= 1.0) {
            return Err(ConfigError::invalid(
                "sampling.clipping_ceiling",
                format!("{} is not in (0, 1]", ceiling),
            ));
        }
        Ok(ceiling)
    }

    pub fn clipping_check_note(&self) -> Result<u8, ConfigError> {
        self.clipping_check_note
            .as_ref()
            .map_or(Ok(DEFAULT_CLIPPING_CHECK_NOTE), |key| {
                key.resolve("sampling.clipping_check_note")
            })
    }
}
