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

use crate::audio::{level, BitDepth};

/// Where the capture is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No sound above the threshold yet.
    Waiting,
    /// Sound detected, accumulating.
    Active,
    /// The time limit was reached and the release is being recorded.
    Tail,
    /// Capture has finished.
    Done,
}

/// What the recorder must do after a chunk has been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// Silence has lasted longer than the timeout.
    SilenceTimeout,
    /// The caller's time limit has been reached outside of the tail.
    TimeLimit,
}

/// Per-chunk metering information.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub state: State,
    pub elapsed: Duration,
    /// Peak of the last chunk per channel, as a fraction of full scale.
    pub channel_peaks: Vec<f64>,
    /// How far the silence run is towards the timeout, in [0, 1].
    pub silence: f64,
}

/// The silence gate. Holds the counters that decide when a capture starts and stops.
pub struct Gate {
    channels: usize,
    sample_rate: u32,
    bit_depth: BitDepth,
    threshold: f64,
    silence_timeout_frames: u64,
    limit: Option<Duration>,

    state: State,
    sound_detected: bool,
    silent_frames: u64,
    total_frames: u64,
    peak: u32,
    peak_frame: u64,
    release_time: Option<Duration>,
}

impl Gate {
    pub fn new(
        channels: u16,
        sample_rate: u32,
        bit_depth: BitDepth,
        threshold: f64,
        silence_timeout: Duration,
        limit: Option<Duration>,
    ) -> Gate {
        Gate {
            channels: usize::from(channels.max(1)),
            sample_rate,
            bit_depth,
            threshold,
            silence_timeout_frames: (silence_timeout.as_secs_f64() * f64::from(sample_rate))
                as u64,
            limit,
            state: State::Waiting,
            sound_detected: false,
            silent_frames: 0,
            total_frames: 0,
            peak: 0,
            peak_frame: 0,
            release_time: None,
        }
    }

    /// Feeds one interleaved chunk through the gate.
    pub fn process(&mut self, chunk: &[i32]) -> Step {
        let frames = (chunk.len() / self.channels) as u64;

        if let Some(index) = level::peak_index(chunk) {
            let chunk_peak = chunk[index].unsigned_abs();
            if chunk_peak > self.peak {
                self.peak = chunk_peak;
                self.peak_frame = self.total_frames + (index / self.channels) as u64;
            }
        }
        self.total_frames += frames;

        if level::is_silent(chunk, self.threshold, self.bit_depth) {
            self.silent_frames += frames;
        } else {
            self.sound_detected = true;
            if self.state == State::Waiting {
                self.state = State::Active;
            }
            self.silent_frames = 0;
        }

        if self.silent_frames > self.silence_timeout_frames {
            return Step::SilenceTimeout;
        }

        match self.limit {
            Some(limit) if self.state != State::Tail && self.elapsed() >= limit => Step::TimeLimit,
            _ => Step::Continue,
        }
    }

    /// Continues past the time limit to record the release. The silence run starts over
    /// and the same timeout applies to it.
    pub fn extend(&mut self) {
        self.silent_frames = 0;
        self.release_time = Some(self.elapsed());
        self.state = State::Tail;
    }

    pub fn finish(&mut self) {
        self.state = State::Done;
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// True once any chunk has been louder than the threshold.
    pub fn sound_detected(&self) -> bool {
        self.sound_detected
    }

    pub fn release_time(&self) -> Option<Duration> {
        self.release_time
    }

    /// The loudest sample seen and the frame it occurred at.
    pub fn peak(&self) -> (u32, u64) {
        (self.peak, self.peak_frame)
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(
            self.total_frames * 1_000_000_000 / u64::from(self.sample_rate.max(1)),
        )
    }

    /// Metering information for the chunk that was just processed.
    pub fn progress(&self, chunk: &[i32]) -> Progress {
        let full_scale = self.bit_depth.full_scale();
        let channel_peaks = (0..self.channels)
            .map(|channel| {
                let peak = chunk
                    .iter()
                    .skip(channel)
                    .step_by(self.channels)
                    .map(|sample| sample.unsigned_abs())
                    .max()
                    .unwrap_or(0);
                f64::from(peak) / full_scale
            })
            .collect();

        Progress {
            state: self.state,
            elapsed: self.elapsed(),
            channel_peaks,
            silence: if self.silence_timeout_frames == 0 {
                1.0
            } else {
                (self.silent_frames as f64 / self.silence_timeout_frames as f64).min(1.0)
            },
        }
    }
}
