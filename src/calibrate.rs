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
//! Session calibration: measures the noise floor to derive the silence threshold and
//! checks that the loudest note the source can play does not clip the input.

use std::time::Duration;

use tracing::{info, span, warn, Level};

use crate::audio::{self, level, StreamParams};
use crate::capture::{CaptureError, NoteTrigger, Recorder};
use crate::midi::{MidiError, Trigger};

/// How long the ambient input is recorded for.
pub const NOISE_FLOOR_DURATION: Duration = Duration::from_secs(2);

/// Margin applied on top of the measured noise floor.
pub const NOISE_FLOOR_MARGIN: f64 = 1.1;

/// How long the clipping check note is recorded for.
pub const CLIPPING_CHECK_DURATION: Duration = Duration::from_secs(2);

/// Threshold the ambient capture runs with. It only needs the audio, so anything works.
const NOISE_FLOOR_CAPTURE_THRESHOLD: f64 = 0.1;

#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    #[error("No audio was recorded while checking for clipping, check the audio and MIDI connections")]
    Silent,

    #[error("Input clipped: peak of {peak_dbfs:.2} dBFS is above the ceiling of {ceiling_dbfs:.2} dBFS, lower the input gain")]
    Clipping { peak_dbfs: f64, ceiling_dbfs: f64 },

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Midi(#[from] MidiError),
}

/// The outcome of measuring the noise floor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseFloor {
    /// Peak ambient level as a fraction of full scale.
    pub floor: f64,
    /// The silence threshold to use for the rest of the session.
    pub threshold: f64,
}

impl NoiseFloor {
    /// Derives the threshold from a measured floor. The threshold never drops below
    /// [level::SILENCE_FLOOR].
    pub fn from_floor(floor: f64) -> NoiseFloor {
        NoiseFloor {
            floor,
            threshold: (floor * NOISE_FLOOR_MARGIN).max(level::SILENCE_FLOOR),
        }
    }
}

/// Records the ambient input and derives the silence threshold from it.
pub fn noise_floor(
    device: &dyn audio::Device,
    params: StreamParams,
    show_progress: bool,
) -> Result<NoiseFloor, CalibrationError> {
    let span = span!(Level::INFO, "noise floor");
    let _enter = span.enter();

    info!("Sampling noise floor.");
    let result = Recorder::new(params, NOISE_FLOOR_CAPTURE_THRESHOLD)
        .limit(NOISE_FLOOR_DURATION)
        .allow_empty(true)
        .show_progress(show_progress)
        .record(device, &mut ())?;

    let floor = result
        .channels
        .iter()
        .flatten()
        .map(|channel| level::peak_fraction(channel, params.bit_depth))
        .fold(0.0, f64::max);
    let noise_floor = NoiseFloor::from_floor(floor);

    info!(
        floor_dbfs = format!("{:.2}", level::amplitude_to_db(noise_floor.floor)),
        threshold_dbfs = format!("{:.2}", level::amplitude_to_db(noise_floor.threshold)),
        "Noise floor measured."
    );
    Ok(noise_floor)
}

/// Settings for the clipping check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClippingCheck {
    pub channel: u8,
    pub note: u8,
    /// Peak level, as a fraction of full scale, at or above which the input counts as clipping.
    pub ceiling: f64,
    /// Fail instead of warning when the ceiling is reached.
    pub abort: bool,
}

/// Plays the check note at full velocity and returns its peak as a fraction of full scale.
pub fn check_clipping(
    device: &dyn audio::Device,
    trigger: &mut Trigger,
    params: StreamParams,
    threshold: f64,
    check: ClippingCheck,
    show_progress: bool,
) -> Result<f64, CalibrationError> {
    let span = span!(Level::INFO, "clipping check", note = check.note);
    let _enter = span.enter();

    info!("Checking for clipping.");
    let result = {
        let mut observer = NoteTrigger::new(trigger, check.channel, check.note, 127, false);
        Recorder::new(params, threshold)
            .limit(CLIPPING_CHECK_DURATION)
            .show_progress(show_progress)
            .record(device, &mut observer)?
    };

    let channels = result.channels.ok_or(CalibrationError::Silent)?;
    let peak = channels
        .iter()
        .map(|channel| level::peak_fraction(channel, params.bit_depth))
        .fold(0.0, f64::max);
    let peak_dbfs = level::amplitude_to_db(peak);
    let ceiling_dbfs = level::amplitude_to_db(check.ceiling);

    if peak >= check.ceiling {
        if check.abort {
            return Err(CalibrationError::Clipping {
                peak_dbfs,
                ceiling_dbfs,
            });
        }
        warn!(
            peak_dbfs = format!("{:.2}", peak_dbfs),
            ceiling_dbfs = format!("{:.2}", ceiling_dbfs),
            "Input is clipping, continuing anyway."
        );
    } else {
        info!(peak_dbfs = format!("{:.2}", peak_dbfs), "No clipping detected.");
    }

    Ok(peak)
}
