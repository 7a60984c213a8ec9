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
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Velocity curve opcodes are `amp_velcurve_N` for N in 0-127.
const VELCURVE_PREFIX: &str = "amp_velcurve_";

/// The opcodes of a region or group. The ones this crate reads or writes are typed, anything
/// else is carried through untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Opcodes {
    pub key: Option<u8>,
    pub lokey: Option<u8>,
    pub hikey: Option<u8>,
    pub pitch_keycenter: Option<u8>,
    pub lovel: Option<u8>,
    pub hivel: Option<u8>,
    pub sample: Option<String>,
    pub offset: Option<u64>,
    pub ampeg_release: Option<f64>,
    pub loop_mode: Option<String>,
    pub loop_start: Option<u64>,
    pub loop_end: Option<u64>,
    pub amp_veltrack: Option<f64>,
    /// Velocity to gain points.
    pub velcurve: BTreeMap<u8, f64>,
    /// Opcodes without a typed field.
    pub extra: BTreeMap<String, String>,
}

/// A typed opcode was given a value that does not parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidValue {
    pub opcode: String,
    pub value: String,
}

fn parse<T: FromStr>(opcode: &str, value: &str) -> Result<Option<T>, InvalidValue> {
    value.parse::<T>().map(Some).map_err(|_| InvalidValue {
        opcode: opcode.to_string(),
        value: value.to_string(),
    })
}

impl Opcodes {
    pub fn is_empty(&self) -> bool {
        *self == Opcodes::default()
    }

    /// Sets an opcode from its textual form.
    pub fn set(&mut self, opcode: &str, value: &str) -> Result<(), InvalidValue> {
        match opcode {
            "key" => self.key = parse(opcode, value)?,
            "lokey" => self.lokey = parse(opcode, value)?,
            "hikey" => self.hikey = parse(opcode, value)?,
            "pitch_keycenter" => self.pitch_keycenter = parse(opcode, value)?,
            "lovel" => self.lovel = parse(opcode, value)?,
            "hivel" => self.hivel = parse(opcode, value)?,
            "sample" => self.sample = Some(value.to_string()),
            "offset" => self.offset = parse(opcode, value)?,
            "ampeg_release" => self.ampeg_release = parse(opcode, value)?,
            "loop_mode" => self.loop_mode = Some(value.to_string()),
            "loop_start" => self.loop_start = parse(opcode, value)?,
            "loop_end" => self.loop_end = parse(opcode, value)?,
            "amp_veltrack" => self.amp_veltrack = parse(opcode, value)?,
            _ => match opcode
                .strip_prefix(VELCURVE_PREFIX)
                .and_then(|velocity| velocity.parse::<u8>().ok())
                .filter(|velocity| *velocity <= 127)
            {
                Some(velocity) => {
                    let gain = parse(opcode, value)?.unwrap_or_default();
                    self.velcurve.insert(velocity, gain);
                }
                None => {
                    self.extra.insert(opcode.to_string(), value.to_string());
                }
            },
        }
        Ok(())
    }

    /// All opcodes as name/value pairs in a stable order.
    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        let mut push = |name: &str, value: Option<String>| {
            if let Some(value) = value {
                pairs.push((name.to_string(), value));
            }
        };

        push("key", self.key.map(|v| v.to_string()));
        push("lokey", self.lokey.map(|v| v.to_string()));
        push("hikey", self.hikey.map(|v| v.to_string()));
        push("pitch_keycenter", self.pitch_keycenter.map(|v| v.to_string()));
        push("lovel", self.lovel.map(|v| v.to_string()));
        push("hivel", self.hivel.map(|v| v.to_string()));
        push("ampeg_release", self.ampeg_release.map(|v| v.to_string()));
        push("amp_veltrack", self.amp_veltrack.map(|v| v.to_string()));
        push("sample", self.sample.clone());
        push("offset", self.offset.map(|v| v.to_string()));
        push("loop_mode", self.loop_mode.clone());
        push("loop_start", self.loop_start.map(|v| v.to_string()));
        push("loop_end", self.loop_end.map(|v| v.to_string()));

        for (velocity, gain) in self.velcurve.iter() {
            pairs.push((format!("{}{}", VELCURVE_PREFIX, velocity), gain.to_string()));
        }
        for (name, value) in self.extra.iter() {
            pairs.push((name.clone(), value.clone()));
        }
        pairs
    }

    /// Combines these opcodes with inherited ones. Values set here take precedence.
    pub fn merged_with(&self, inherited: &Opcodes) -> Opcodes {
        let mut velcurve = inherited.velcurve.clone();
        velcurve.extend(self.velcurve.iter().map(|(k, v)| (*k, *v)));
        let mut extra = inherited.extra.clone();
        extra.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));

        Opcodes {
            key: self.key.or(inherited.key),
            lokey: self.lokey.or(inherited.lokey),
            hikey: self.hikey.or(inherited.hikey),
            pitch_keycenter: self.pitch_keycenter.or(inherited.pitch_keycenter),
            lovel: self.lovel.or(inherited.lovel),
            hivel: self.hivel.or(inherited.hivel),
            sample: self.sample.clone().or_else(|| inherited.sample.clone()),
            offset: self.offset.or(inherited.offset),
            ampeg_release: self.ampeg_release.or(inherited.ampeg_release),
            loop_mode: self.loop_mode.clone().or_else(|| inherited.loop_mode.clone()),
            loop_start: self.loop_start.or(inherited.loop_start),
            loop_end: self.loop_end.or(inherited.loop_end),
            amp_veltrack: self.amp_veltrack.or(inherited.amp_veltrack),
            velcurve,
            extra,
        }
    }
}

impl fmt::Display for Opcodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.pairs() {
            write!(f, "\n{}={}", name, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{InvalidValue, Opcodes};

    #[test]
    fn typed_and_extra() {
        let mut opcodes = Opcodes::default();
        opcodes.set("key", "60").unwrap();
        opcodes.set("sample", "C4_v15.wav").unwrap();
        opcodes.set("amp_velcurve_15", "1").unwrap();
        opcodes.set("amp_velcurve_1", "0.25").unwrap();
        opcodes.set("cutoff", "400").unwrap();
        opcodes.set("amp_velcurve_200", "1").unwrap();

        assert_eq!(opcodes.key, Some(60));
        assert_eq!(opcodes.sample.as_deref(), Some("C4_v15.wav"));
        assert_eq!(opcodes.velcurve.get(&1), Some(&0.25));
        assert_eq!(opcodes.velcurve.get(&15), Some(&1.0));
        assert_eq!(opcodes.extra.get("cutoff").map(String::as_str), Some("400"));
        assert_eq!(
            opcodes.extra.get("amp_velcurve_200").map(String::as_str),
            Some("1")
        );
    }

    #[test]
    fn invalid_value() {
        let mut opcodes = Opcodes::default();
        assert_eq!(
            opcodes.set("hivel", "loud"),
            Err(InvalidValue {
                opcode: "hivel".to_string(),
                value: "loud".to_string()
            })
        );
    }

    #[test]
    fn display() {
        let mut opcodes = Opcodes::default();
        opcodes.set("hivel", "15").unwrap();
        opcodes.set("lovel", "1").unwrap();
        opcodes.set("ampeg_release", "1").unwrap();
        opcodes.set("amp_velcurve_1", "0").unwrap();
        assert_eq!(
            opcodes.to_string(),
            "\nlovel=1\nhivel=15\nampeg_release=1\namp_velcurve_1=0"
        );
    }

    #[test]
    fn merge_prefers_own_values() {
        let mut group = Opcodes::default();
        group.set("ampeg_release", "2").unwrap();
        group.set("amp_velcurve_127", "1").unwrap();
        group.set("cutoff", "100").unwrap();

        let mut region = Opcodes::default();
        region.set("ampeg_release", "1").unwrap();
        region.set("key", "60").unwrap();
        region.set("cutoff", "200").unwrap();

        let merged = region.merged_with(&group);
        assert_eq!(merged.ampeg_release, Some(1.0));
        assert_eq!(merged.key, Some(60));
        assert_eq!(merged.velcurve.get(&127), Some(&1.0));
        assert_eq!(merged.extra.get("cutoff").map(String::as_str), Some("200"));
    }
}
