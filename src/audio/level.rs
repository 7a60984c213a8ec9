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
//! Loudness measurement on raw integer samples.
//!
//! Thresholds are passed around as plain `f64` values. Anything under 1.0 is
//! a fraction of full scale; anything at or above 1.0 is already a raw sample
//! magnitude. Callers must be consistent about which form they pass.

use super::format::BitDepth;

/// -80.8 dBFS expressed as a fraction of full scale. Used as the lowest
/// silence threshold a calibration can produce.
pub const SILENCE_FLOOR: f64 = 0.000_091_201_083_935_590_96;

/// Converts a fraction of full scale to dBFS. Zero maps to negative infinity.
pub fn amplitude_to_db(fraction: f64) -> f64 {
    if fraction == 0.0 {
        return f64::NEG_INFINITY;
    }
    20.0 * fraction.abs().log10()
}

/// Converts a raw sample value to dBFS at the given bit depth.
pub fn sample_to_db(sample: f64, bit_depth: BitDepth) -> f64 {
    amplitude_to_db(sample / bit_depth.full_scale())
}

/// Maps dBFS onto [0, 1] for meter rendering, where 0 is the quietest value a
/// single LSB can represent. This is not the inverse of [amplitude_to_db].
pub fn dbfs_as_percent(dbfs: f64, bit_depth: BitDepth) -> f64 {
    let minimum = sample_to_db(1.0, bit_depth);
    ((dbfs / -minimum) + 1.0).clamp(0.0, 1.0)
}

/// The largest absolute sample value in the buffer.
pub fn peak(samples: &[i32]) -> u32 {
    samples
        .iter()
        .map(|sample| sample.unsigned_abs())
        .max()
        .unwrap_or(0)
}

/// The index of the largest absolute sample value, or None for an empty buffer.
pub fn peak_index(samples: &[i32]) -> Option<usize> {
    samples
        .iter()
        .enumerate()
        .max_by_key(|(_, sample)| sample.unsigned_abs())
        .map(|(index, _)| index)
}

/// The peak of the buffer as a fraction of full scale.
pub fn peak_fraction(samples: &[i32], bit_depth: BitDepth) -> f64 {
    f64::from(peak(samples)) / bit_depth.full_scale()
}

/// Converts a threshold in either form to raw sample units.
pub fn threshold_to_raw(threshold: f64, bit_depth: BitDepth) -> f64 {
    if threshold < 1.0 {
        threshold * bit_depth.full_scale()
    } else {
        threshold
    }
}

/// True if the peak of the buffer is under the threshold.
pub fn is_silent(samples: &[i32], threshold: f64, bit_depth: BitDepth) -> bool {
    if threshold < 1.0 {
        peak_fraction(samples, bit_depth) < threshold
    } else {
        f64::from(peak(samples)) < threshold
    }
}
