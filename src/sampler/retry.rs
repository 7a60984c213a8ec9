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
use tracing::warn;

use super::error::SamplerError;
use crate::sfz::Region;

/// Why a unit of work produced no region without failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Nothing above the silence threshold was heard.
    Silence,
}

/// The result of working on one zone and velocity.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitOutcome {
    Captured(Region),
    Skipped(SkipReason),
    ExhaustedRetries { attempts: usize, last_error: String },
}

/// Retries a capture immediately on transient failures, up to a fixed number of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize) -> RetryPolicy {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Runs the attempt until it captures a region, hears only silence, fails with a
    /// non-transient error or runs out of attempts. Attempts are numbered from 1.
    pub fn run<F>(&self, mut attempt: F) -> Result<UnitOutcome, SamplerError>
    where
        F: FnMut(usize) -> Result<Option<Region>, SamplerError>,
    {
        let mut last_error = String::new();
        for number in 1..=self.max_attempts {
            match attempt(number) {
                Ok(Some(region)) => return Ok(UnitOutcome::Captured(region)),
                Ok(None) => return Ok(UnitOutcome::Skipped(SkipReason::Silence)),
                Err(e) if e.is_transient() => {
                    warn!(
                        attempt = number,
                        max_attempts = self.max_attempts,
                        err = %e,
                        "Capture attempt failed."
                    );
                    last_error = e.to_string();
                }
                Err(e) => return Err(e),
            }
        }

        Ok(UnitOutcome::ExhaustedRetries {
            attempts: self.max_attempts,
            last_error,
        })
    }
}
