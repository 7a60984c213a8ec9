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
//! The silence gated recorder. Streams chunks from an audio input, waits for sound
//! above the session threshold and stops once the input has been silent for long
//! enough, optionally carrying on past a time limit to record the release tail.

use std::time::Duration;

use tracing::{debug, info, span, Level};

use crate::audio::{self, StreamParams};

mod error;
pub mod gate;
mod meter;
mod trigger;

pub use error::CaptureError;
pub use gate::{Progress, State};
pub use trigger::NoteTrigger;

/// The default amount of continuous silence that ends a capture.
pub const DEFAULT_SILENCE_TIMEOUT: Duration = Duration::from_secs(2);

/// The audio produced by one capture.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureResult {
    /// Bytes per sample.
    pub sample_width: u16,
    /// One vector of samples per channel, all of equal length. None means only silence
    /// was heard.
    pub channels: Option<Vec<Vec<i32>>>,
    /// Set when the capture was extended past its time limit.
    pub release_time: Option<Duration>,
}

/// Hooks the recorder calls while a capture is running.
pub trait CaptureObserver {
    /// Called once, after the first chunk has been read and the stream is known to be running.
    fn on_first_chunk(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    /// Called when the time limit is reached. Returning true continues the capture to
    /// record the release.
    fn on_time_limit_reached(&mut self) -> Result<bool, CaptureError> {
        Ok(false)
    }

    /// Called when the silence timeout ends the capture.
    fn on_silence_timeout(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    /// Called after every chunk.
    fn on_progress(&mut self, _progress: &Progress) {}
}

impl CaptureObserver for () {}

/// Records a single take.
#[derive(Debug, Clone)]
pub struct Recorder {
    params: StreamParams,
    threshold: f64,
    limit: Option<Duration>,
    silence_timeout: Duration,
    allow_empty: bool,
    show_progress: bool,
}

impl Recorder {
    /// Creates a recorder. The threshold is either a fraction of full scale or a raw sample
    /// magnitude.
    pub fn new(params: StreamParams, threshold: f64) -> Recorder {
        Recorder {
            params,
            threshold,
            limit: None,
            silence_timeout: DEFAULT_SILENCE_TIMEOUT,
            allow_empty: false,
            show_progress: false,
        }
    }

    /// Sets the time limit after which the observer is asked whether to continue.
    pub fn limit(mut self, limit: Duration) -> Recorder {
        self.limit = Some(limit);
        self
    }

    pub fn silence_timeout(mut self, silence_timeout: Duration) -> Recorder {
        self.silence_timeout = silence_timeout;
        self
    }

    /// Returns the captured audio even if it never rose above the threshold.
    pub fn allow_empty(mut self, allow_empty: bool) -> Recorder {
        self.allow_empty = allow_empty;
        self
    }

    /// Draws a meter on stderr while recording.
    pub fn show_progress(mut self, show_progress: bool) -> Recorder {
        self.show_progress = show_progress;
        self
    }

    /// Records from the device until silence, the time limit or the end of the stream.
    pub fn record(
        &self,
        device: &dyn audio::Device,
        observer: &mut dyn CaptureObserver,
    ) -> Result<CaptureResult, CaptureError> {
        let span = span!(Level::INFO, "record", device = device.name());
        let _enter = span.enter();

        let mut stream = device
            .open(&self.params)
            .map_err(|e| CaptureError::Open {
                device: device.name(),
                message: e.to_string(),
            })?;

        let mut gate = gate::Gate::new(
            self.params.channels,
            self.params.sample_rate,
            self.params.bit_depth,
            self.threshold,
            self.silence_timeout,
            self.limit,
        );
        let meter = self
            .show_progress
            .then(|| meter::Meter::new(self.params.bit_depth));

        let mut samples: Vec<i32> = Vec::new();
        let mut first = true;
        loop {
            let chunk = match stream.next_chunk() {
                Ok(Some(chunk)) => chunk,
                Ok(None) => {
                    debug!("Input stream ended.");
                    break;
                }
                Err(e) => {
                    if let Some(meter) = &meter {
                        meter.clear();
                    }
                    return Err(CaptureError::Stream {
                        device: device.name(),
                        message: e.to_string(),
                    });
                }
            };

            if first {
                first = false;
                observer.on_first_chunk()?;
            }

            let step = gate.process(&chunk);
            let progress = gate.progress(&chunk);
            observer.on_progress(&progress);
            if let Some(meter) = &meter {
                meter.draw(&progress);
            }
            samples.extend_from_slice(&chunk);

            match step {
                gate::Step::Continue => {}
                gate::Step::SilenceTimeout => {
                    debug!(elapsed = ?gate.elapsed(), "Silence timeout reached.");
                    observer.on_silence_timeout()?;
                    break;
                }
                gate::Step::TimeLimit => {
                    if observer.on_time_limit_reached()? {
                        debug!(elapsed = ?gate.elapsed(), "Time limit reached, recording release.");
                        gate.extend();
                    } else {
                        debug!(elapsed = ?gate.elapsed(), "Time limit reached.");
                        break;
                    }
                }
            }
        }
        gate.finish();
        drop(stream);

        if let Some(meter) = &meter {
            meter.clear();
        }

        let (peak, peak_frame) = gate.peak();
        info!(
            elapsed = ?gate.elapsed(),
            peak_dbfs = audio::level::sample_to_db(f64::from(peak), self.params.bit_depth),
            peak_frame,
            sound = gate.sound_detected(),
            "Capture finished."
        );

        let channels = if gate.sound_detected() || self.allow_empty {
            Some(deinterleave(&samples, usize::from(self.params.channels)))
        } else {
            None
        };

        Ok(CaptureResult {
            sample_width: self.params.bit_depth.sample_width(),
            channels,
            release_time: gate.release_time(),
        })
    }
}

/// Splits interleaved samples into one vector per channel. Trailing partial frames are dropped.
pub fn deinterleave(samples: &[i32], channels: usize) -> Vec<Vec<i32>> {
    let channels = channels.max(1);
    let frames = samples.len() / channels;
    (0..channels)
        .map(|channel| {
            samples
                .iter()
                .skip(channel)
                .step_by(channels)
                .take(frames)
                .copied()
                .collect()
        })
        .collect()
}
