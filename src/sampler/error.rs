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
use std::io;
use std::path::PathBuf;

use crate::calibrate::CalibrationError;
use crate::capture::CaptureError;
use crate::config::ConfigError;
use crate::leveler::LevelingError;
use crate::midi::MidiError;
use crate::sfz::SfzError;

#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Unable to open {kind} device: {message}")]
    Device { kind: &'static str, message: String },

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Midi(#[from] MidiError),

    #[error(transparent)]
    Leveling(#[from] LevelingError),

    #[error(transparent)]
    Sfz(#[from] SfzError),

    #[error("Unable to write sample {}: {source}", path.display())]
    Wav { path: PathBuf, source: hound::Error },

    #[error("Unable to access {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl SamplerError {
    /// Transient errors are I/O failures that another attempt at the same capture may not hit.
    pub fn is_transient(&self) -> bool {
        match self {
            SamplerError::Capture(e) => e.is_transient(),
            SamplerError::Wav {
                source: hound::Error::IoError(_),
                ..
            } => true,
            _ => false,
        }
    }
}
