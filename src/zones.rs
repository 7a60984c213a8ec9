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
//! Planning of the sweep: key zones, velocity layers and the regions they produce.

use std::fmt;

use crate::looping::LoopPoints;
use crate::sfz::{Opcodes, Region};

const NOTE_NAMES: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
];

/// MIDI note number of C0.
const C0: i32 = 12;

/// Release time written into every region, in seconds.
const AMPEG_RELEASE: f64 = 1.0;

/// The name of a MIDI note, e.g. 60 is C4.
pub fn note_name(note: u8) -> String {
    let from_c = i32::from(note) - C0;
    format!(
        "{}{}",
        NOTE_NAMES[from_c.rem_euclid(12) as usize],
        from_c.div_euclid(12)
    )
}

/// Parses a note name such as `C4`, `Db3`, `f#2` or `C-1` into a MIDI note number.
pub fn note_number(name: &str) -> Option<u8> {
    let mut chars = name.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    let rest = chars.as_str();
    let (accidental, octave) = match rest.chars().next() {
        Some('b') => (-1, &rest[1..]),
        Some('#') => (1, &rest[1..]),
        _ => (0, rest),
    };

    let natural = NOTE_NAMES
        .iter()
        .position(|n| n.len() == 1 && n.starts_with(letter))? as i32;
    let octave: i32 = octave.parse().ok()?;
    let note = C0 + natural + accidental + 12 * octave;
    u8::try_from(note).ok().filter(|note| *note <= 127)
}

/// A contiguous range of keys sampled from one representative pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zone {
    pub low: u8,
    pub high: u8,
    pub center: u8,
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.low == self.high {
            write!(f, "{}", note_name(self.center))
        } else {
            write!(
                f,
                "{} ({}-{})",
                note_name(self.center),
                note_name(self.low),
                note_name(self.high)
            )
        }
    }
}

/// Splits the keyboard into consecutive zones of `key_range` keys, each centered on its middle
/// key. The last zone is shortened if the range does not divide evenly.
pub fn partition(low_key: u8, high_key: u8, key_range: u8) -> Vec<Zone> {
    if key_range == 0 || low_key > high_key {
        return Vec::new();
    }

    let mut zones = Vec::new();
    let mut low = u16::from(low_key);
    while low <= u16::from(high_key) {
        let high = (low + u16::from(key_range) - 1).min(u16::from(high_key));
        zones.push(Zone {
            low: low as u8,
            high: high as u8,
            center: (low + (high - low) / 2) as u8,
        });
        low = high + 1;
    }
    zones
}

/// The velocity range a captured layer answers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VelocityLayer {
    pub lovel: u8,
    pub hivel: u8,
}

/// Derives the layer bounds for strictly increasing velocity levels. Each layer starts one
/// above the previous level, the first at 1.
pub fn velocity_layers(levels: &[u8]) -> Vec<VelocityLayer> {
    let mut lovel = 1;
    levels
        .iter()
        .map(|hivel| {
            let layer = VelocityLayer {
                lovel,
                hivel: *hivel,
            };
            lovel = hivel.saturating_add(1);
            layer
        })
        .collect()
}

/// One capture of the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkUnit {
    pub zone: Zone,
    pub layer: VelocityLayer,
    /// Set on the loudest layer, which completes the zone.
    pub completes_zone: bool,
}

/// Orders the sweep: zones by pitch in the requested direction and, within each zone,
/// velocities from quietest to loudest.
pub fn work_list(zones: &[Zone], layers: &[VelocityLayer], ascending: bool) -> Vec<WorkUnit> {
    let ordered: Box<dyn Iterator<Item = &Zone>> = if ascending {
        Box::new(zones.iter())
    } else {
        Box::new(zones.iter().rev())
    };

    ordered
        .flat_map(|zone| {
            layers.iter().enumerate().map(move |(i, layer)| WorkUnit {
                zone: *zone,
                layer: *layer,
                completes_zone: i + 1 == layers.len(),
            })
        })
        .collect()
}

/// The sample file name for a note and velocity.
pub fn filename_for(note: u8, velocity: u8) -> String {
    format!("{}_v{}.wav", note_name(note), velocity)
}

/// Builds the region for a captured sample.
pub fn region_for(zone: Zone, layer: VelocityLayer, loop_points: Option<LoopPoints>) -> Region {
    let mut opcodes = Opcodes {
        lovel: Some(layer.lovel),
        hivel: Some(layer.hivel),
        ampeg_release: Some(AMPEG_RELEASE),
        sample: Some(filename_for(zone.center, layer.hivel)),
        offset: Some(0),
        ..Opcodes::default()
    };

    if let Some(points) = loop_points {
        opcodes.loop_mode = Some("loop_continuous".to_string());
        opcodes.loop_start = Some(points.start as u64);
        opcodes.loop_end = Some(points.end as u64);
    }

    if zone.low == zone.high {
        opcodes.key = Some(zone.center);
    } else {
        opcodes.lokey = Some(zone.low);
        opcodes.hikey = Some(zone.high);
        opcodes.pitch_keycenter = Some(zone.center);
    }

    Region::new(opcodes)
}
