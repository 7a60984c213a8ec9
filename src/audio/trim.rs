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
use super::{format::BitDepth, level::threshold_to_raw};

/// Returns the index one sample before the first sample louder than the threshold,
/// or 0 if no sample is louder.
pub fn start_of(samples: &[i32], threshold: f64, bit_depth: BitDepth) -> usize {
    let raw = threshold_to_raw(threshold, bit_depth);
    samples
        .iter()
        .position(|sample| f64::from(sample.unsigned_abs()) > raw)
        .map_or(0, |index| index.saturating_sub(1))
}

/// Returns the exclusive end index one sample after the last sample louder than
/// the threshold, or the buffer length if no sample is louder.
pub fn end_of(samples: &[i32], threshold: f64, bit_depth: BitDepth) -> usize {
    let raw = threshold_to_raw(threshold, bit_depth);
    samples
        .iter()
        .rposition(|sample| f64::from(sample.unsigned_abs()) > raw)
        .map_or(samples.len(), |index| (index + 2).min(samples.len()))
}

/// Trims leading and trailing silence from every channel by the same amount.
/// The leading edge is the earliest start across channels and the trailing edge
/// is the latest end, so no channel loses audible material.
pub fn trim(
    channels: &[Vec<i32>],
    start_threshold: f64,
    end_threshold: f64,
    bit_depth: BitDepth,
) -> Vec<Vec<i32>> {
    let start = channels
        .iter()
        .map(|channel| start_of(channel, start_threshold, bit_depth))
        .min()
        .unwrap_or(0);
    let end = channels
        .iter()
        .map(|channel| end_of(channel, end_threshold, bit_depth))
        .max()
        .unwrap_or(0);
    let start = start.min(end);

    channels
        .iter()
        .map(|channel| channel[start.min(channel.len())..end.min(channel.len())].to_vec())
        .collect()
}
