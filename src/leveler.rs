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
//! Volume leveling of velocity layers.
//!
//! Each layer of a zone is measured by the RMS of a short window around its peak. The
//! group's velocity curve then scales every layer down at its lowest velocity to the
//! loudness of the layer below it, so that adjacent layers meet at the same level.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::audio::wav::{self, WavData};
use crate::sfz::{Group, Opcodes, Region, SfzFile};

#[derive(Debug, thiserror::Error)]
pub enum LevelingError {
    #[error("Sample {} has no energy, it is silent or corrupt", path.display())]
    ZeroRms { path: PathBuf },

    #[error("Unable to read sample {}: {source}", path.display())]
    Read { path: PathBuf, source: hound::Error },

    #[error("Region {region} has no {opcode} opcode")]
    MissingOpcode { opcode: &'static str, region: String },
}

/// The largest RMS level, as a fraction of full scale, of any window near the loudest
/// sample. Windows are 10ms long and centered at most 20ms either side of the peak.
pub fn peak_rms(data: &WavData) -> f64 {
    let window = (data.sample_rate / 100).max(2) as usize;
    let limit = (data.sample_rate / 50) as usize;
    let half = window / 2;

    let peak = data
        .channels
        .iter()
        .flat_map(|channel| {
            channel
                .iter()
                .enumerate()
                .map(|(index, sample)| (sample.unsigned_abs(), index))
        })
        .max()
        .map(|(_, index)| index);
    let Some(peak) = peak else {
        return 0.0;
    };
    let len = data.channels.iter().map(Vec::len).max().unwrap_or(0);

    let first = peak.saturating_sub(limit).max(half);
    let last = (peak + limit).min(len.saturating_sub(half));

    let mut loudest: f64 = 0.0;
    for channel in data.channels.iter() {
        let mut squares = Vec::with_capacity(channel.len() + 1);
        squares.push(0.0);
        for sample in channel {
            let previous = squares[squares.len() - 1];
            squares.push(previous + f64::from(*sample).powi(2));
        }

        for center in first..last {
            let start = center - half;
            let end = (center + half).min(channel.len());
            if end <= start {
                continue;
            }
            let rms = ((squares[end] - squares[start]) / (end - start) as f64).sqrt();
            loudest = loudest.max(rms);
        }
    }

    loudest / data.full_scale()
}

fn required<T: Copy>(
    value: Option<T>,
    opcode: &'static str,
    region: &Region,
) -> Result<T, LevelingError> {
    value.ok_or_else(|| LevelingError::MissingOpcode {
        opcode,
        region: region.opcodes.sample.clone().unwrap_or_else(|| region.to_string()),
    })
}

fn sample_path(root: &Path, region: &Region) -> Result<PathBuf, LevelingError> {
    region
        .opcodes
        .sample
        .as_ref()
        .map(|sample| root.join(sample))
        .ok_or_else(|| LevelingError::MissingOpcode {
            opcode: "sample",
            region: region.to_string(),
        })
}

fn measure(root: &Path, region: &Region) -> Result<(PathBuf, f64), LevelingError> {
    let path = sample_path(root, region)?;
    let data = wav::read_wav(&path).map_err(|source| LevelingError::Read {
        path: path.clone(),
        source,
    })?;
    let rms = peak_rms(&data);
    debug!(path = %path.display(), rms, "Measured peak RMS.");
    Ok((path, rms))
}

/// Levels the regions of one zone into a group carrying the velocity curve. Returns None for
/// an empty zone.
pub fn level_zone(regions: Vec<Region>, root: &Path) -> Result<Option<Group>, LevelingError> {
    if regions.is_empty() {
        return Ok(None);
    }

    let mut layers = Vec::with_capacity(regions.len());
    for mut region in regions {
        let lovel = required(region.opcodes.lovel, "lovel", &region)?;
        let hivel = required(region.opcodes.hivel, "hivel", &region)?;
        let (path, rms) = measure(root, &region)?;

        region.opcodes.velcurve.clear();
        region.opcodes.amp_veltrack = None;
        layers.push((region, lovel, hivel, path, rms));
    }
    layers.sort_by(|a, b| b.2.cmp(&a.2));

    let mut velcurve = BTreeMap::new();
    for pair in layers.windows(2) {
        let (_, lovel, hivel, path, rms) = &pair[0];
        let (_, _, _, _, quieter_rms) = &pair[1];
        if *rms == 0.0 {
            return Err(LevelingError::ZeroRms { path: path.clone() });
        }
        velcurve.insert(*hivel, 1.0);
        velcurve.insert(*lovel, quieter_rms / rms);
    }
    if let Some((_, lovel, hivel, _, _)) = layers.last() {
        velcurve.insert(*hivel, 1.0);
        velcurve.insert(*lovel, 0.0);
    }

    info!(
        layers = layers.len(),
        curve = format!("{:?}", velcurve),
        "Leveled zone."
    );

    let opcodes = Opcodes {
        velcurve,
        ..Opcodes::default()
    };
    let regions = layers.into_iter().map(|(region, ..)| region).collect();
    Ok(Some(Group::new(opcodes, regions)))
}

/// Levels every zone of an existing file, grouping regions by the key they were sampled at.
pub fn level_file(file: &SfzFile, root: &Path) -> Result<SfzFile, LevelingError> {
    let mut zones: BTreeMap<u8, Vec<Region>> = BTreeMap::new();
    for region in file.flattened_regions() {
        let key = region
            .key_center()
            .ok_or_else(|| LevelingError::MissingOpcode {
                opcode: "key",
                region: region.to_string(),
            })?;
        zones.entry(key).or_default().push(region);
    }

    let mut groups = Vec::new();
    for (_, regions) in zones {
        groups.extend(level_zone(regions, root)?);
    }
    Ok(SfzFile { groups })
}

#[cfg(test)]
mod test {
    use std::f64::consts::PI;
    use std::path::Path;

    use super::{level_file, level_zone, peak_rms, LevelingError};
    use crate::audio::wav::{write_wav, WavData};
    use crate::audio::BitDepth;
    use crate::sfz::{Opcodes, Region, SfzFile};

    const RATE: u32 = 8000;

    fn sine(amplitude: f64) -> Vec<i32> {
        (0..RATE / 2)
            .map(|i| (amplitude * 32767.0 * (2.0 * PI * f64::from(i) / 40.0).sin()).round() as i32)
            .collect()
    }

    fn layer(root: &Path, key: u8, lovel: u8, hivel: u8, amplitude: f64) -> Region {
        let sample = format!("{}_{}.wav", key, hivel);
        let channel = sine(amplitude);
        write_wav(
            &root.join(&sample),
            &[channel.clone(), channel],
            RATE,
            BitDepth::Sixteen,
        )
        .unwrap();

        let mut opcodes = Opcodes::default();
        opcodes.key = Some(key);
        opcodes.lovel = Some(lovel);
        opcodes.hivel = Some(hivel);
        opcodes.sample = Some(sample);
        opcodes.amp_veltrack = Some(100.0);
        opcodes.velcurve.insert(127, 1.0);
        Region::new(opcodes)
    }

    #[test]
    fn rms_of_sine() {
        let data = WavData {
            channels: vec![sine(0.5), sine(0.25)],
            sample_rate: RATE,
            bits_per_sample: 16,
        };
        let rms = peak_rms(&data);
        assert!((rms - 0.5 / 2f64.sqrt()).abs() < 1e-3, "rms {}", rms);
    }

    #[test]
    fn rms_of_nothing() {
        let data = WavData {
            channels: vec![vec![], vec![]],
            sample_rate: RATE,
            bits_per_sample: 16,
        };
        assert_eq!(peak_rms(&data), 0.0);
        let data = WavData {
            channels: vec![vec![0; 1000]],
            sample_rate: RATE,
            bits_per_sample: 16,
        };
        assert_eq!(peak_rms(&data), 0.0);
    }

    #[test]
    fn curve() {
        let dir = tempfile::tempdir().unwrap();
        let regions = vec![
            layer(dir.path(), 60, 1, 40, 0.1),
            layer(dir.path(), 60, 91, 127, 0.6),
            layer(dir.path(), 60, 41, 90, 0.3),
        ];

        let group = level_zone(regions, dir.path()).unwrap().unwrap();
        let curve = &group.opcodes.velcurve;
        assert_eq!(curve.get(&127), Some(&1.0));
        assert_eq!(curve.get(&90), Some(&1.0));
        assert_eq!(curve.get(&40), Some(&1.0));
        assert_eq!(curve.get(&1), Some(&0.0));
        assert!((curve[&91] - 0.5).abs() < 1e-3);
        assert!((curve[&41] - 1.0 / 3.0).abs() < 1e-3);
        assert!(curve.values().all(|gain| (0.0..=1.0).contains(gain)));

        let hivels: Vec<Option<u8>> = group.regions.iter().map(|r| r.opcodes.hivel).collect();
        assert_eq!(hivels, vec![Some(127), Some(90), Some(40)]);
        assert!(group
            .regions
            .iter()
            .all(|r| r.opcodes.velcurve.is_empty() && r.opcodes.amp_veltrack.is_none()));
    }

    #[test]
    fn single_layer() {
        let dir = tempfile::tempdir().unwrap();
        let group = level_zone(vec![layer(dir.path(), 60, 1, 127, 0.5)], dir.path())
            .unwrap()
            .unwrap();
        assert_eq!(group.opcodes.velcurve.len(), 2);
        assert_eq!(group.opcodes.velcurve.get(&127), Some(&1.0));
        assert_eq!(group.opcodes.velcurve.get(&1), Some(&0.0));
    }

    #[test]
    fn empty_zone() {
        let dir = tempfile::tempdir().unwrap();
        assert!(level_zone(Vec::new(), dir.path()).unwrap().is_none());
    }

    #[test]
    fn silent_reference_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let regions = vec![
            layer(dir.path(), 60, 1, 64, 0.2),
            layer(dir.path(), 60, 65, 127, 0.0),
        ];
        match level_zone(regions, dir.path()) {
            Err(LevelingError::ZeroRms { path }) => {
                assert_eq!(path, dir.path().join("60_127.wav"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn missing_sample_file() {
        let dir = tempfile::tempdir().unwrap();
        let region = layer(dir.path(), 60, 1, 127, 0.5);
        std::fs::remove_file(dir.path().join("60_127.wav")).unwrap();
        assert!(matches!(
            level_zone(vec![region], dir.path()),
            Err(LevelingError::Read { .. })
        ));
    }

    #[test]
    fn levels_file_by_key() {
        let dir = tempfile::tempdir().unwrap();
        let regions = vec![
            layer(dir.path(), 62, 1, 64, 0.2),
            layer(dir.path(), 60, 1, 64, 0.2),
            layer(dir.path(), 62, 65, 127, 0.4),
            layer(dir.path(), 60, 65, 127, 0.4),
        ];
        let file = SfzFile::parse(&crate::sfz::regions_to_string(&regions)).unwrap();

        let leveled = level_file(&file, dir.path()).unwrap();
        assert_eq!(leveled.groups.len(), 2);
        assert_eq!(leveled.groups[0].regions[0].opcodes.key, Some(60));
        assert_eq!(leveled.groups[1].regions[0].opcodes.key, Some(62));
        for group in leveled.groups.iter() {
            assert!((group.opcodes.velcurve[&65] - 0.5).abs() < 1e-3);
        }
    }
}
