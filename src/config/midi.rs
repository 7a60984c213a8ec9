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

use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;
use crate::util::DeviceSelector;

const DEFAULT_CHANNEL: u8 = 1;
const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// A YAML representation of the MIDI output configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Midi {
    /// A case-insensitive substring of the output device name.
    device: Option<String>,

    /// The position of the output device in the device listing.
    device_index: Option<usize>,

    /// The channel to send on, 1-16 (default: 1).
    channel: Option<u8>,

    /// Program to switch to before sampling.
    program: Option<u8>,

    /// How long to wait after resets and program changes (default: 1s).
    settle_delay: Option<String>,
}

impl Midi {
    /// Returns the device selector from the configuration.
    pub fn device(&self) -> DeviceSelector {
        DeviceSelector::from_parts(self.device.as_deref(), self.device_index)
    }

    /// Returns the channel (default: 1).
    pub fn channel(&self) -> Result<u8, ConfigError> {
        let channel = self.channel.unwrap_or(DEFAULT_CHANNEL);
        if !(1..=16).contains(&channel) {
            return Err(ConfigError::invalid(
                "midi.channel",
                format!("{} is not between 1 and 16", channel),
            ));
        }
        Ok(channel)
    }

    /// Returns the program to switch to, if any.
    pub fn program(&self) -> Result<Option<u8>, ConfigError> {
        match self.program {
            Some(program) if program > 127 => Err(ConfigError::invalid(
                "midi.program",
                format!("{} is above 127", program),
            )),
            program => Ok(program),
        }
    }

    /// Returns the settle delay (default: 1s).
    pub fn settle_delay(&self) -> Result<Duration, ConfigError> {
        match &self.settle_delay {
            Some(delay) => parse_duration("midi.settle_delay", delay),
            None => Ok(DEFAULT_SETTLE_DELAY),
        }
    }
}

/// Parses a human duration string such as "45s" or "500ms".
pub(super) fn parse_duration(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    DurationString::from_string(value.to_string())
        .map(Duration::from)
        .map_err(|e| ConfigError::invalid(field, e.to_string()))
}
