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

use std::error::Error;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Extracts a displayable file name from a path, returning a fallback if the name is unreadable.
pub fn filename_display(path: &Path) -> &str {
    path.file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("unreadable file name")
}

/// Outputs the given duration in a minutes:seconds format.
pub fn duration_minutes_seconds(duration: Duration) -> String {
    let minutes = duration.as_secs() / 60;
    let secs = duration.as_secs() - minutes * 60;
    format!("{}:{:02}", minutes, secs)
}

/// How a device is picked out of the devices a back-end reports.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeviceSelector {
    /// The first device reported.
    #[default]
    Default,
    /// A case-insensitive substring of the device name.
    Name(String),
    /// The position of the device in the listing.
    Index(usize),
}

impl DeviceSelector {
    /// Builds a selector from optional name and index settings. The name wins if both are set.
    pub fn from_parts(name: Option<&str>, index: Option<usize>) -> DeviceSelector {
        match (name, index) {
            (Some(name), _) => DeviceSelector::Name(name.to_string()),
            (None, Some(index)) => DeviceSelector::Index(index),
            (None, None) => DeviceSelector::Default,
        }
    }

    /// Mock devices are selected by names starting with "mock".
    pub fn is_mock(&self) -> bool {
        matches!(self, DeviceSelector::Name(name) if name.starts_with("mock"))
    }

    /// Picks one of the candidates. An exact (case-insensitive) name match is preferred over
    /// substring matches, and more than one substring match is rejected.
    pub fn select<T, F>(&self, candidates: Vec<T>, name_of: F) -> Result<T, Box<dyn Error>>
    where
        F: Fn(&T) -> String,
    {
        let available = || {
            candidates
                .iter()
                .map(&name_of)
                .collect::<Vec<String>>()
                .join(", ")
        };

        match self {
            DeviceSelector::Default => match candidates.into_iter().next() {
                Some(candidate) => Ok(candidate),
                None => Err("no devices found".into()),
            },
            DeviceSelector::Index(index) => {
                let listing = available();
                candidates.into_iter().nth(*index).ok_or_else(|| {
                    format!("no device found at index {} (devices: {})", index, listing).into()
                })
            }
            DeviceSelector::Name(name) => {
                let needle = name.to_lowercase();
                let listing = available();
                let mut matches: Vec<T> = candidates
                    .into_iter()
                    .filter(|candidate| name_of(candidate).to_lowercase().contains(&needle))
                    .collect();

                if let Some(exact) = matches
                    .iter()
                    .position(|candidate| name_of(candidate).to_lowercase() == needle)
                {
                    return Ok(matches.swap_remove(exact));
                }
                if matches.is_empty() {
                    return Err(
                        format!("no device found with name {} (devices: {})", name, listing).into(),
                    );
                }
                if matches.len() > 1 {
                    return Err(format!(
                        "found too many devices that match ({}), use a less ambiguous device name",
                        matches
                            .iter()
                            .map(&name_of)
                            .collect::<Vec<String>>()
                            .join(", ")
                    )
                    .into());
                }

                Ok(matches.swap_remove(0))
            }
        }
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelector::Default => write!(f, "default"),
            DeviceSelector::Name(name) => write!(f, "{}", name),
            DeviceSelector::Index(index) => write!(f, "#{}", index),
        }
    }
}
