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
use crate::midi::MidiError;

/// Errors raised while capturing a take.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Unable to open audio input {device}: {message}")]
    Open { device: String, message: String },

    #[error("Audio input {device} failed: {message}")]
    Stream { device: String, message: String },

    #[error("Unable to trigger the sound source: {0}")]
    Trigger(#[from] MidiError),
}

impl CaptureError {
    /// Transient failures are device I/O hiccups that a fresh attempt may not hit again.
    pub fn is_transient(&self) -> bool {
        matches!(self, CaptureError::Open { .. } | CaptureError::Stream { .. })
    }
}
