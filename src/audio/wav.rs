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

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use super::format::BitDepth;

/// Decoded PCM audio, one vector per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct WavData {
    pub channels: Vec<Vec<i32>>,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl WavData {
    /// Full scale magnitude for the file's bit depth.
    pub fn full_scale(&self) -> f64 {
        f64::from(1u32 << (self.bits_per_sample.clamp(1, 32) - 1))
    }
}

/// Writes the channels to an uncompressed integer PCM file.
pub fn write_wav(
    path: &Path,
    channels: &[Vec<i32>],
    sample_rate: u32,
    bit_depth: BitDepth,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels: u16::try_from(channels.len()).map_err(|_| hound::Error::Unsupported)?,
        sample_rate,
        bits_per_sample: bit_depth.bits(),
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;

    let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
    for frame in 0..frames {
        for channel in channels {
            writer.write_sample(channel[frame])?;
        }
    }

    writer.finalize()
}

/// Reads an integer PCM file into per-channel vectors.
pub fn read_wav(path: &Path) -> Result<WavData, hound::Error> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    if spec.sample_format != SampleFormat::Int {
        return Err(hound::Error::Unsupported);
    }

    let num_channels = usize::from(spec.channels.max(1));
    let mut channels: Vec<Vec<i32>> = vec![Vec::new(); num_channels];
    for (index, sample) in reader.samples::<i32>().enumerate() {
        channels[index % num_channels].push(sample?);
    }

    Ok(WavData {
        channels,
        sample_rate: spec.sample_rate,
        bits_per_sample: spec.bits_per_sample,
    })
}
