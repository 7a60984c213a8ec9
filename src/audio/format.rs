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
use std::{fmt, str::FromStr};

/// The number of channels captured and persisted for every take.
pub const NUM_CHANNELS: u16 = 2;

/// Integer bit depth used for capture and persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitDepth {
    Sixteen,
    TwentyFour,
}

impl BitDepth {
    /// Creates a bit depth from a raw bits-per-sample value.
    pub fn from_bits(bits: u16) -> Option<BitDepth> {
        match bits {
            16 => Some(BitDepth::Sixteen),
            24 => Some(BitDepth::TwentyFour),
            _ => None,
        }
    }

    /// Bits per sample.
    pub fn bits(self) -> u16 {
        match self {
            BitDepth::Sixteen => 16,
            BitDepth::TwentyFour => 24,
        }
    }

    /// Sample width in bytes.
    pub fn sample_width(self) -> u16 {
        self.bits() / 8
    }

    /// The magnitude of a full scale sample, i.e. 2^(bits - 1).
    pub fn full_scale(self) -> f64 {
        f64::from(1u32 << (self.bits() - 1))
    }

    /// The largest representable positive sample.
    pub fn max_sample(self) -> i32 {
        (1i32 << (self.bits() - 1)) - 1
    }
}

impl FromStr for BitDepth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u16>()
            .ok()
            .and_then(BitDepth::from_bits)
            .ok_or_else(|| format!("unsupported bit depth: {}", s))
    }
}

impl fmt::Display for BitDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}

/// The parameters an input stream is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    /// Number of interleaved channels.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Integer bit depth of the delivered samples.
    pub bit_depth: BitDepth,
    /// Frames per chunk.
    pub chunk_size: usize,
}

impl StreamParams {
    /// Number of interleaved samples in a single chunk.
    pub fn chunk_samples(&self) -> usize {
        self.chunk_size * usize::from(self.channels)
    }
}
