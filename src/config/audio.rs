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
use serde::Deserialize;

use super::error::ConfigError;
use crate::audio::{BitDepth, StreamParams, format::NUM_CHANNELS};
use crate::util::DeviceSelector;

const DEFAULT_SAMPLE_RATE: u32 = 48000;
const DEFAULT_BIT_DEPTH: u16 = 16;
const DEFAULT_CHUNK_SIZE: usize = 1024;

/// A YAML representation of the audio input configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Audio {
    /// A case-insensitive substring of the input device name.
    device: Option<String>,

    /// The position of the input device in the device listing.
    device_index: Option<usize>,

    /// Sample rate in Hz (default: 48000).
    sample_rate: Option<u32>,

    /// Bits per sample, 16 or 24 (default: 16).
    bit_depth: Option<u16>,

    /// Frames per chunk read from the input (default: 1024).
    chunk_size: Option<usize>,
}

impl Audio {
    /// Returns the device selector from the configuration.
    pub fn device(&self) -> DeviceSelector {
        DeviceSelector::from_parts(self.device.as_deref(), self.device_index)
    }

    /// Returns the sample rate (default: 48000).
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the bit depth (default: 16).
    pub fn bit_depth(&self) -> Result<BitDepth, ConfigError> {
        let bits = self.bit_depth.unwrap_or(DEFAULT_BIT_DEPTH);
        BitDepth::from_bits(bits)
            .ok_or_else(|| ConfigError::invalid("audio.bit_depth", format!("{} is not 16 or 24", bits)))
    }

    /// Returns the chunk size (default: 1024).
    pub fn chunk_size(&self) -> usize {
        self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE)
    }

    /// Returns the validated stream parameters.
    pub fn stream_params(&self) -> Result<StreamParams, ConfigError> {
        if self.sample_rate() == 0 {
            return Err(ConfigError::invalid("audio.sample_rate", "must be positive"));
        }
        if self.chunk_size() == 0 {
            return Err(ConfigError::invalid("audio.chunk_size", "must be positive"));
        }

        Ok(StreamParams {
            channels: NUM_CHANNELS,
            sample_rate: self.sample_rate(),
            bit_depth: self.bit_depth()?,
            chunk_size: self.chunk_size(),
        })
    }
}
