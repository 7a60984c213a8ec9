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
use std::io::Write;

use super::gate::{Progress, State};
use crate::audio::{level, BitDepth};
use crate::util::duration_minutes_seconds;

const BAR_WIDTH: usize = 24;

/// A single-line VU meter drawn on stderr while a take is recorded.
pub struct Meter {
    bit_depth: BitDepth,
}

impl Meter {
    pub fn new(bit_depth: BitDepth) -> Meter {
        Meter { bit_depth }
    }

    /// Draws the progress line. Failing to write to the terminal is ignored.
    pub fn draw(&self, progress: &Progress) {
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r\x1b[2K{}", self.render(progress));
        let _ = stderr.flush();
    }

    /// Ends the progress line.
    pub fn clear(&self) {
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r\x1b[2K");
        let _ = stderr.flush();
    }

    fn render(&self, progress: &Progress) -> String {
        let state = match progress.state {
            State::Waiting => "waiting",
            State::Active => "active",
            State::Tail => "release",
            State::Done => "done",
        };

        let channels: Vec<String> = progress
            .channel_peaks
            .iter()
            .map(|peak| {
                let percent = level::dbfs_as_percent(level::amplitude_to_db(*peak), self.bit_depth);
                bar(percent)
            })
            .collect();

        format!(
            "{:<7} {} [{}] silence [{}]",
            state,
            duration_minutes_seconds(progress.elapsed),
            channels.join("|"),
            bar(progress.silence),
        )
    }
}

fn bar(fraction: f64) -> String {
    let filled = ((fraction.clamp(0.0, 1.0) * BAR_WIDTH as f64).round() as usize).min(BAR_WIDTH);
    format!("{}{}", "#".repeat(filled), " ".repeat(BAR_WIDTH - filled))
}
