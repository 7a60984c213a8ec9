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
use rustfft::{num_complex::Complex, FftPlanner};

/// Normalized autocorrelation of the signal for lags 0..len/2.
///
/// The mean is removed and the result is divided by the signal energy, so lag 0 is 1.0. It is
/// computed through the power spectrum with enough zero padding that it matches the direct
/// time domain sum exactly. A signal with no energy yields all zeros.
pub fn autocorrelate(signal: &[f64]) -> Vec<f64> {
    let len = signal.len();
    let lags = len / 2;
    if lags == 0 {
        return Vec::new();
    }

    let mean = signal.iter().sum::<f64>() / len as f64;
    let energy: f64 = signal.iter().map(|x| (x - mean).powi(2)).sum();
    if energy == 0.0 {
        return vec![0.0; lags];
    }

    let size = fft_size(2 * len - 1);
    let mut buffer: Vec<Complex<f64>> = signal
        .iter()
        .map(|x| Complex::new(x - mean, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(size)
        .collect();

    let mut planner = FftPlanner::new();
    planner.plan_fft_forward(size).process(&mut buffer);
    buffer
        .iter_mut()
        .for_each(|bin| *bin = Complex::new(bin.norm_sqr(), 0.0));
    planner.plan_fft_inverse(size).process(&mut buffer);

    // The inverse transform is unnormalized.
    let scale = size as f64 * energy;
    buffer.iter().take(lags).map(|bin| bin.re / scale).collect()
}

/// The smallest length of at least `min` whose only prime factors are 2, 3 and 5.
pub fn fft_size(min: usize) -> usize {
    let mut size = min.max(1);
    loop {
        let mut remainder = size;
        for factor in [2, 3, 5] {
            while remainder % factor == 0 {
                remainder /= factor;
            }
        }
        if remainder == 1 {
            return size;
        }
        size += 1;
    }
}
