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
//! SFZ region metadata: parsing, serialization and flattening of `<group>`/`<region>` files.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use pest::Parser;
use pest_derive::Parser;
use tracing::warn;

mod opcodes;

pub use opcodes::Opcodes;

#[derive(Parser)]
#[grammar = "src/sfz/grammar.pest"]
struct SfzParser;

#[derive(Debug, thiserror::Error)]
pub enum SfzError {
    #[error("SFZ parsing error at line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Invalid value {value:?} for opcode {opcode} at line {line}, column {column}")]
    InvalidValue {
        opcode: String,
        value: String,
        line: usize,
        column: usize,
    },

    #[error("Unable to access {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// A single sample mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Region {
    pub opcodes: Opcodes,
}

impl Region {
    pub fn new(opcodes: Opcodes) -> Region {
        Region { opcodes }
    }

    /// The key the sample was recorded at.
    pub fn key_center(&self) -> Option<u8> {
        self.opcodes.key.or(self.opcodes.pitch_keycenter)
    }

    /// True if the region's sample exists relative to the given directory.
    pub fn sample_exists(&self, root: &Path) -> bool {
        self.opcodes
            .sample
            .as_ref()
            .is_some_and(|sample| root.join(sample).is_file())
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<region>{}", self.opcodes)
    }
}

/// Opcodes shared by a list of regions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Group {
    pub opcodes: Opcodes,
    pub regions: Vec<Region>,
}

impl Group {
    pub fn new(opcodes: Opcodes, regions: Vec<Region>) -> Group {
        Group { opcodes, regions }
    }

    /// The regions with the group's opcodes folded into each of them.
    pub fn flattened_regions(&self) -> Vec<Region> {
        self.regions
            .iter()
            .map(|region| Region::new(region.opcodes.merged_with(&self.opcodes)))
            .collect()
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<group>{}", self.opcodes)?;
        for region in self.regions.iter() {
            write!(f, "\n\n{}", region)?;
        }
        Ok(())
    }
}

/// A parsed SFZ file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SfzFile {
    pub groups: Vec<Group>,
}

impl SfzFile {
    /// Parses SFZ text. Regions before the first group form a group without opcodes. Headers
    /// other than `<group>` and `<region>` are skipped along with their opcodes.
    pub fn parse(content: &str) -> Result<SfzFile, SfzError> {
        let pairs = SfzParser::parse(Rule::file, content).map_err(|e| {
            let (line, column) = match e.line_col {
                pest::error::LineColLocation::Pos((line, col)) => (line, col),
                pest::error::LineColLocation::Span((line, col), _) => (line, col),
            };
            SfzError::Parse {
                line,
                column,
                message: e.variant.message().to_string(),
            }
        })?;

        enum Section {
            None,
            Group,
            Region,
            Skipped,
        }

        let mut builder = Builder::default();
        let mut section = Section::None;
        for pair in pairs.flatten() {
            match pair.as_rule() {
                Rule::header_name => {
                    section = match pair.as_str() {
                        "group" => {
                            builder.start_group();
                            Section::Group
                        }
                        "region" => {
                            builder.start_region();
                            Section::Region
                        }
                        other => {
                            let (line, _) = pair.line_col();
                            warn!(header = other, line, "Skipping unsupported SFZ header.");
                            Section::Skipped
                        }
                    };
                }
                Rule::opcode => {
                    let (line, column) = pair.line_col();
                    let mut inner = pair.into_inner();
                    let name = inner.next().map(|p| p.as_str()).unwrap_or_default();
                    let value = inner.next().map(|p| p.as_str()).unwrap_or_default();

                    let target = match section {
                        Section::Group => &mut builder.group,
                        Section::Region => &mut builder.region,
                        Section::Skipped => continue,
                        Section::None => {
                            return Err(SfzError::Parse {
                                line,
                                column,
                                message: format!("opcode {} appears before any header", name),
                            })
                        }
                    };
                    target.set(name, value).map_err(|e| SfzError::InvalidValue {
                        opcode: e.opcode,
                        value: e.value,
                        line,
                        column,
                    })?;
                }
                _ => {}
            }
        }

        Ok(builder.finish())
    }

    /// Reads and parses an SFZ file.
    pub fn read(path: &Path) -> Result<SfzFile, SfzError> {
        let content = fs::read_to_string(path).map_err(|source| SfzError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        SfzFile::parse(&content)
    }

    /// Every region with its group's opcodes folded in.
    pub fn flattened_regions(&self) -> Vec<Region> {
        self.groups
            .iter()
            .flat_map(|group| group.flattened_regions())
            .collect()
    }
}

impl fmt::Display for SfzFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let groups: Vec<String> = self.groups.iter().map(|group| group.to_string()).collect();
        write!(f, "{}", groups.join("\n\n"))
    }
}

#[derive(Default)]
struct Builder {
    groups: Vec<Group>,
    group: Opcodes,
    region: Opcodes,
    regions: Vec<Region>,
    in_group: bool,
}

impl Builder {
    fn start_group(&mut self) {
        self.end_region();
        self.end_group();
        self.in_group = true;
    }

    fn start_region(&mut self) {
        self.end_region();
    }

    fn end_region(&mut self) {
        if !self.region.is_empty() {
            self.regions
                .push(Region::new(std::mem::take(&mut self.region)));
        }
    }

    fn end_group(&mut self) {
        if self.in_group || !self.regions.is_empty() {
            self.groups.push(Group::new(
                std::mem::take(&mut self.group),
                std::mem::take(&mut self.regions),
            ));
        }
    }

    fn finish(mut self) -> SfzFile {
        self.end_region();
        self.end_group();
        SfzFile {
            groups: self.groups,
        }
    }
}

/// Serializes regions as a flat list.
pub fn regions_to_string(regions: &[Region]) -> String {
    let regions: Vec<String> = regions.iter().map(|region| region.to_string()).collect();
    regions.join("\n\n")
}

/// The leveled companion of an SFZ file, named after the whole file name: `file.sfz` becomes
/// `file.sfz.leveled.sfz`.
pub fn leveled_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".leveled.sfz");
    PathBuf::from(name)
}

/// Writes the content next to the destination and renames it into place, so that readers
/// never see a partially written file.
pub fn write_atomic(path: &Path, content: &str) -> Result<(), SfzError> {
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    let io_error = |source| SfzError::Io {
        path: path.to_path_buf(),
        source,
    };
    fs::write(&temp, format!("{}\n", content)).map_err(io_error)?;
    fs::rename(&temp, path).map_err(io_error)
}

#[cfg(test)]
mod test {
    use std::fs;

    use std::path::{Path, PathBuf};

    use super::{
        leveled_path, regions_to_string, write_atomic, Opcodes, Region, SfzError, SfzFile,
    };

    const LEVELED: &str = "<group>
amp_velcurve_1=0
amp_velcurve_15=1

<region>
key=60
lovel=1
hivel=15
sample=C4_v15.wav // quiet

<region>
key=60 lovel=16 hivel=44 sample=C4_v44.wav
loop_mode=loop_continuous loop_start=100 loop_end=2000
";

    #[test]
    fn parses_groups() {
        let file = SfzFile::parse(LEVELED).unwrap();
        assert_eq!(file.groups.len(), 1);
        let group = &file.groups[0];
        assert_eq!(group.opcodes.velcurve.len(), 2);
        assert_eq!(group.regions.len(), 2);
        assert_eq!(group.regions[0].opcodes.sample.as_deref(), Some("C4_v15.wav"));
        assert_eq!(group.regions[1].opcodes.hivel, Some(44));
        assert_eq!(group.regions[1].opcodes.loop_end, Some(2000));
        assert_eq!(
            group.regions[1].opcodes.loop_mode.as_deref(),
            Some("loop_continuous")
        );
    }

    #[test]
    fn regions_without_group() {
        let file = SfzFile::parse("<region>\nkey=60\n\n<region>\nkey=61\n").unwrap();
        assert_eq!(file.groups.len(), 1);
        assert!(file.groups[0].opcodes.is_empty());
        assert_eq!(file.groups[0].regions.len(), 2);
    }

    #[test]
    fn empty() {
        assert_eq!(SfzFile::parse("").unwrap(), SfzFile::default());
        assert_eq!(SfzFile::parse("// nothing\n").unwrap(), SfzFile::default());
    }

    #[test]
    fn skips_unknown_headers() {
        let file = SfzFile::parse("<control>\ndefault_path=x/\n<region>\nkey=60\n").unwrap();
        assert_eq!(file.groups.len(), 1);
        assert_eq!(file.groups[0].regions[0].opcodes.key, Some(60));
        assert!(file.groups[0].regions[0].opcodes.extra.is_empty());
    }

    #[test]
    fn round_trip() {
        let file = SfzFile::parse(LEVELED).unwrap();
        assert_eq!(SfzFile::parse(&file.to_string()).unwrap(), file);
    }

    #[test]
    fn flatten() {
        let file = SfzFile::parse(LEVELED).unwrap();
        let regions = file.flattened_regions();
        assert_eq!(regions.len(), 2);
        assert!(regions
            .iter()
            .all(|region| region.opcodes.velcurve.get(&15) == Some(&1.0)));
    }

    #[test]
    fn errors() {
        match SfzFile::parse("<region>\nkey=60\nbogus\n") {
            Err(SfzError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected result: {:?}", other),
        }
        match SfzFile::parse("<region>\n  hivel=loud\n") {
            Err(SfzError::InvalidValue {
                opcode,
                line,
                column,
                ..
            }) => {
                assert_eq!(opcode, "hivel");
                assert_eq!((line, column), (2, 3));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(matches!(
            SfzFile::parse("key=60\n<region>\n"),
            Err(SfzError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn flat_regions_and_atomic_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.sfz");

        let mut opcodes = Opcodes::default();
        opcodes.set("key", "60").unwrap();
        opcodes.set("sample", "C4_v15.wav").unwrap();
        let regions = vec![Region::new(opcodes.clone()), Region::new(opcodes)];

        write_atomic(&path, &regions_to_string(&regions)).unwrap();
        assert!(!dir.path().join("file.sfz.tmp").exists());

        let file = SfzFile::read(&path).unwrap();
        assert_eq!(file.flattened_regions(), regions);
        assert!(!regions[0].sample_exists(dir.path()));
        fs::write(dir.path().join("C4_v15.wav"), b"").unwrap();
        assert!(regions[0].sample_exists(dir.path()));
    }

    #[test]
    fn leveled_companion() {
        assert_eq!(
            leveled_path(Path::new("piano/file.sfz")),
            PathBuf::from("piano/file.sfz.leveled.sfz")
        );
        assert_eq!(
            leveled_path(Path::new("strings")),
            PathBuf::from("strings.leveled.sfz")
        );
    }
}
