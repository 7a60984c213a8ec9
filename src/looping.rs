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
//! Finds seamless sustain loops in a captured note.
//!
//! The autocorrelation of the note is searched for a pair of peaks at least a minimum
//! loop length apart, starting from a point well past the attack. The end of the loop
//! is then nudged to the nearby sample that best continues into the loop start. Several
//! search points and minimum lengths are tried and the smoothest seam wins.

use tracing::{debug, info};

mod autocorrelation;

pub use autocorrelation::autocorrelate;

/// Minimum loop lengths tried, in seconds.
pub const LOOP_WIDTHS: [f64; 9] = [0.2, 0.4, 0.6, 0.8, 1.0, 1.5, 2.0, 2.5, 3.0];

/// Search points tried, as fractions of the channel length.
const SEARCH_POINTS: [(usize, usize); 4] = [(3, 4), (2, 3), (1, 2), (1, 3)];

/// How far either side of a candidate loop end to look for a better seam, in samples.
const SEAM_SEARCH: usize = 100;

/// A sustain loop. Both ends are inclusive sample indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopPoints {
    pub start: usize,
    pub end: usize,
}

impl LoopPoints {
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }
}

/// Finds loop points for a multichannel capture, searching the channel with the higher peak.
pub fn find_loop_points(channels: &[Vec<i32>], sample_rate: u32) -> Option<LoopPoints> {
    let channel = channels
        .iter()
        .max_by_key(|channel| crate::audio::level::peak(channel))?;
    find_loop(channel, sample_rate)
}

/// Finds loop points for a single channel. Returns None if no combination of search point
/// and loop length fits in the audio.
pub fn find_loop(channel: &[i32], sample_rate: u32) -> Option<LoopPoints> {
    let signal: Vec<f64> = channel.iter().map(|sample| f64::from(*sample)).collect();
    let autocorrelation = autocorrelate(&signal);

    let mut best: Option<(u64, LoopPoints)> = None;
    for (numerator, denominator) in SEARCH_POINTS {
        let search_point = channel.len() * numerator / denominator;
        for width in LOOP_WIDTHS {
            let Some(points) = candidate(channel, &autocorrelation, search_point, width, sample_rate)
            else {
                debug!(search_point, width, "Loop search range collapsed.");
                continue;
            };
            let gap = seam_gap(channel, points);
            if best.map_or(true, |(best_gap, _)| gap < best_gap) {
                best = Some((gap, points));
            }
        }
    }

    match best {
        Some((gap, points)) => {
            info!(
                start = points.start,
                end = points.end,
                gap,
                "Found loop points."
            );
            Some(points)
        }
        None => None,
    }
}

/// The jump in amplitude when playback wraps from the loop end back to the loop start.
pub fn seam_gap(channel: &[i32], points: LoopPoints) -> u64 {
    let next = channel
        .get(points.end + 1)
        .or_else(|| channel.get(points.end))
        .copied()
        .unwrap_or(0);
    (i64::from(channel[points.start]) - i64::from(next)).unsigned_abs()
}

fn candidate(
    channel: &[i32],
    autocorrelation: &[f64],
    search_point: usize,
    width_seconds: f64,
    sample_rate: u32,
) -> Option<LoopPoints> {
    let min_width = (width_seconds * f64::from(sample_rate)) as usize;
    let start = first_peak_at_or_after(autocorrelation, search_point / 2)?;
    let rough_end = first_peak_at_or_after(autocorrelation, start + min_width)?;
    let seam = find_similar_sample_index(channel, start, rough_end, SEAM_SEARCH)?;

    // The seam sample is where playback resumes, so the loop ends just before it.
    let end = seam.checked_sub(1)?;
    (end > start && end < channel.len()).then_some(LoopPoints { start, end })
}

/// The first positive local maximum at or after the offset. Falls back to the largest value
/// if there is no such maximum, and returns None if the offset is out of range.
fn first_peak_at_or_after(values: &[f64], offset: usize) -> Option<usize> {
    if offset >= values.len() {
        return None;
    }

    let is_peak = |i: usize| {
        values[i] > 0.0
            && (i == 0 || values[i] > values[i - 1])
            && (i + 1 == values.len() || values[i] >= values[i + 1])
    };
    (offset..values.len()).find(|i| is_peak(*i)).or_else(|| {
        (offset..values.len()).max_by(|a, b| values[*a].total_cmp(&values[*b]))
    })
}

fn rising(channel: &[i32], index: usize) -> bool {
    channel[index + 1] > channel[index - 1]
}

/// Looks around `around` for the sample whose slope has the same direction as the slope at
/// `reference` and whose value is the closest to it. Returns None if the window has no room
/// to measure slopes.
fn find_similar_sample_index(
    channel: &[i32],
    reference: usize,
    around: usize,
    search: usize,
) -> Option<usize> {
    if channel.len() < 3 || reference == 0 || reference + 1 >= channel.len() {
        return None;
    }
    let low = around.saturating_sub(search).max(1);
    let high = (around + search).min(channel.len() - 1);
    if low >= high {
        return None;
    }

    let direction = rising(channel, reference);
    let target = i64::from(channel[reference]);
    (low..high)
        .filter(|i| rising(channel, *i) == direction)
        .min_by_key(|i| (i64::from(channel[*i]) - target).unsigned_abs())
        .or(Some(around).filter(|around| *around < channel.len()))
}

#[cfg(test)]
mod test {
    use std::f64::consts::PI;

    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::{find_loop, find_loop_points, first_peak_at_or_after, seam_gap, LoopPoints};

    const RATE: u32 = 8000;
    const PERIOD: usize = 100;

    fn periodic(len: usize, seed: u64) -> Vec<i32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len)
            .map(|i| {
                let phase = 2.0 * PI * i as f64 / PERIOD as f64 + 1.0;
                (10000.0 * phase.sin()) as i32 + rng.gen_range(-100..=100)
            })
            .collect()
    }

    #[test]
    fn loops_on_period_multiple() {
        let channel = periodic(RATE as usize * 4, 3);
        let points = find_loop(&channel, RATE).unwrap();

        assert!(points.start < points.end);
        assert!(points.end < channel.len());
        assert!(points.len() >= (0.2 * f64::from(RATE)) as usize - 100);

        let remainder = points.len() % PERIOD;
        assert!(
            remainder <= 3 || remainder >= PERIOD - 3,
            "loop of {} samples is not a period multiple",
            points.len()
        );

        let gap = seam_gap(&channel, points);
        let half_period = seam_gap(
            &channel,
            LoopPoints {
                start: points.start,
                end: points.start + PERIOD / 2 - 1,
            },
        );
        assert!(gap < 1000, "gap of {}", gap);
        assert!(gap < half_period);
    }

    #[test]
    fn uses_prominent_channel() {
        let loud = periodic(RATE as usize * 2, 5);
        let quiet: Vec<i32> = loud.iter().map(|sample| sample / 4).collect();
        assert_eq!(
            find_loop_points(&[quiet, loud.clone()], RATE),
            find_loop(&loud, RATE)
        );
    }

    #[test]
    fn too_short() {
        assert_eq!(find_loop(&[], RATE), None);
        assert_eq!(find_loop(&periodic(800, 1), RATE), None);
        assert_eq!(find_loop_points(&[], RATE), None);
    }

    #[test]
    fn silence_has_no_loop() {
        assert_eq!(find_loop(&vec![0; RATE as usize * 4], RATE), None);
    }

    #[test]
    fn peaks() {
        let values = [1.0, 0.2, 0.5, 0.4, -0.1, 0.3, 0.3, 0.1];
        assert_eq!(first_peak_at_or_after(&values, 0), Some(0));
        assert_eq!(first_peak_at_or_after(&values, 1), Some(2));
        assert_eq!(first_peak_at_or_after(&values, 3), Some(5));
        assert_eq!(first_peak_at_or_after(&values, 8), None);
        assert_eq!(first_peak_at_or_after(&[-1.0, -2.0, -0.5], 1), Some(2));
    }
}
