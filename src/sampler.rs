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
//! Drives a whole sampling session: calibration, the sweep over zones and velocities, and
//! the metadata written along the way.
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use tracing::{debug, info, span, warn, Level};

use crate::{
    audio::{self, level, mock::VirtualSynth, trim, wav},
    calibrate::{self, ClippingCheck},
    capture::{NoteTrigger, Recorder},
    config::SessionConfig,
    leveler, looping,
    midi::{self, Trigger},
    sfz::{self, Group, Region, SfzFile},
    zones::{self, note_name, WorkUnit},
};

mod error;
mod retry;

pub use error::SamplerError;
pub use retry::{RetryPolicy, SkipReason, UnitOutcome};

/// The flat region list, rewritten after every captured region.
pub const METADATA_FILE: &str = "file.sfz";

/// Length of the throwaway capture played before each note when sampling with portamento.
const PORTAMENTO_PRESAMPLE: Duration = Duration::from_secs(2);

/// Pause after the portamento pre-sample.
const PORTAMENTO_WAIT: Duration = Duration::from_secs(1);

/// The leading edge of a sample is found at this multiple of the silence threshold.
const TRIM_START_FACTOR: f64 = 10.0;

/// Trimmed samples peaking above this fraction of full scale are reported as clipped.
const CLIP_WARNING: f64 = 0.9999;

/// What a sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub captured: usize,
    pub reused: usize,
    pub skipped: usize,
    pub failed: usize,
    pub groups: usize,
}

/// Owns the devices and the configuration of one session.
pub struct Sampler {
    config: SessionConfig,
    audio: Arc<dyn audio::Device>,
    trigger: Trigger,
}

impl Sampler {
    pub fn new(config: SessionConfig, audio: Arc<dyn audio::Device>, trigger: Trigger) -> Sampler {
        Sampler {
            config,
            audio,
            trigger,
        }
    }

    /// Opens the configured devices. When both are mocks they are wired to one virtual synth.
    pub fn connect(config: SessionConfig) -> Result<Sampler, SamplerError> {
        let (audio, midi): (Arc<dyn audio::Device>, Box<dyn midi::Device>) =
            if config.audio.device.is_mock() && config.midi.device.is_mock() {
                let synth = VirtualSynth::new();
                (
                    Arc::new(audio::mock::Device::with_synth(
                        &config.audio.device.to_string(),
                        synth.clone(),
                    )),
                    Box::new(midi::mock::Device::with_synth(
                        &config.midi.device.to_string(),
                        synth,
                    )),
                )
            } else {
                (
                    audio::get_device(&config.audio.device).map_err(|e| SamplerError::Device {
                        kind: "audio",
                        message: e.to_string(),
                    })?,
                    midi::get_device(&config.midi.device).map_err(|e| SamplerError::Device {
                        kind: "MIDI",
                        message: e.to_string(),
                    })?,
                )
            };

        info!(
            audio = audio.name(),
            midi = midi.name(),
            "Connected devices."
        );
        let trigger = Trigger::new(midi, config.midi.settle_delay);
        Ok(Sampler::new(config, audio, trigger))
    }

    fn metadata_path(&self) -> PathBuf {
        self.config.output_folder.join(METADATA_FILE)
    }

    /// Runs the whole session.
    pub fn run(&mut self) -> Result<Summary, SamplerError> {
        let folder = self.config.output_folder.clone();
        let span = span!(Level::INFO, "session", folder = %folder.display());
        let _enter = span.enter();

        fs::create_dir_all(&folder).map_err(|source| SamplerError::Io {
            path: folder.clone(),
            source,
        })?;

        let mut regions = load_prior_regions(&self.metadata_path(), &folder);
        let threshold = self.calibrate()?;

        let sampling = &self.config.sampling;
        let zones = zones::partition(sampling.low_key, sampling.high_key, sampling.key_range);
        let layers = zones::velocity_layers(&sampling.velocity_levels);
        let work = zones::work_list(&zones, &layers, sampling.ascending);
        info!(
            zones = zones.len(),
            layers = layers.len(),
            units = work.len(),
            "Starting sweep."
        );

        let mut summary = Summary::default();
        let mut zone_regions: Vec<Region> = Vec::new();
        let mut groups: Vec<Group> = Vec::new();
        for unit in work {
            let prior = regions
                .iter()
                .find(|region| matches_unit(region, &unit))
                .cloned();
            match prior {
                Some(region) => {
                    debug!(
                        note = note_name(unit.zone.center),
                        velocity = unit.layer.hivel,
                        "Reusing existing sample."
                    );
                    zone_regions.push(region);
                    summary.reused += 1;
                }
                None => match self.run_unit(unit, threshold)? {
                    UnitOutcome::Captured(region) => {
                        regions.push(region.clone());
                        zone_regions.push(region);
                        sfz::write_atomic(
                            &self.metadata_path(),
                            &sfz::regions_to_string(&regions),
                        )?;
                        summary.captured += 1;
                    }
                    UnitOutcome::Skipped(reason) => {
                        info!(
                            note = note_name(unit.zone.center),
                            velocity = unit.layer.hivel,
                            reason = format!("{:?}", reason),
                            "Skipped."
                        );
                        summary.skipped += 1;
                    }
                    UnitOutcome::ExhaustedRetries {
                        attempts,
                        last_error,
                    } => {
                        warn!(
                            note = note_name(unit.zone.center),
                            velocity = unit.layer.hivel,
                            attempts,
                            err = last_error,
                            "Giving up on sample."
                        );
                        summary.failed += 1;
                    }
                },
            }

            if unit.completes_zone {
                groups.extend(leveler::level_zone(
                    std::mem::take(&mut zone_regions),
                    &folder,
                )?);
            }
        }

        summary.groups = groups.len();
        sfz::write_atomic(
            &sfz::leveled_path(&self.metadata_path()),
            &SfzFile { groups }.to_string(),
        )?;

        if self.config.sampling.flac {
            info!(
                folder = %folder.display(),
                "FLAC output requested; encode the samples with an external tool."
            );
        }
        info!(
            captured = summary.captured,
            reused = summary.reused,
            skipped = summary.skipped,
            failed = summary.failed,
            "Sweep complete."
        );
        Ok(summary)
    }

    /// Switches program, resets the source and measures the noise floor and the clipping
    /// headroom. Returns the silence threshold.
    pub fn calibrate(&mut self) -> Result<f64, SamplerError> {
        let channel = self.config.midi.channel;
        let params = self.config.audio.params;
        let sampling = &self.config.sampling;

        if let Some(program) = self.config.midi.program {
            self.trigger.program_change(channel, program)?;
        }
        self.trigger.all_notes_off(channel)?;
        self.trigger.all_notes_off(channel)?;

        let floor = calibrate::noise_floor(self.audio.as_ref(), params, sampling.print_progress)?;
        calibrate::check_clipping(
            self.audio.as_ref(),
            &mut self.trigger,
            params,
            floor.threshold,
            ClippingCheck {
                channel,
                note: sampling.clipping_check_note,
                ceiling: sampling.clipping_ceiling,
                abort: sampling.abort_on_clipping,
            },
            sampling.print_progress,
        )?;

        self.trigger.all_notes_off(channel)?;
        self.trigger.all_notes_off(channel)?;
        Ok(floor.threshold)
    }

    /// Samples one zone and velocity, retrying transient failures.
    pub fn run_unit(&mut self, unit: WorkUnit, threshold: f64) -> Result<UnitOutcome, SamplerError> {
        let span = span!(
            Level::INFO,
            "sample",
            note = note_name(unit.zone.center),
            velocity = unit.layer.hivel
        );
        let _enter = span.enter();

        if self.config.sampling.portamento {
            self.presample(unit, threshold)?;
        }

        RetryPolicy::new(self.config.sampling.max_attempts).run(|attempt| {
            debug!(attempt, "Capturing.");
            self.capture_unit(unit, threshold)
        })
    }

    /// Plays the note once without keeping the result, so that the real capture glides
    /// from the same pitch.
    fn presample(&mut self, unit: WorkUnit, threshold: f64) -> Result<(), SamplerError> {
        let channel = self.config.midi.channel;
        self.trigger.all_notes_off(channel)?;

        let result = {
            let mut observer = NoteTrigger::new(
                &mut self.trigger,
                channel,
                unit.zone.center,
                unit.layer.hivel,
                false,
            );
            Recorder::new(self.config.audio.params, threshold)
                .limit(PORTAMENTO_PRESAMPLE)
                .silence_timeout(self.config.sampling.silence_timeout)
                .record(self.audio.as_ref(), &mut observer)
        };
        if let Err(e) = result {
            warn!(err = %e, "Portamento pre-sample failed.");
        }

        spin_sleep::sleep(PORTAMENTO_WAIT);
        Ok(())
    }

    /// One capture attempt. Returns None when only silence was heard.
    fn capture_unit(&mut self, unit: WorkUnit, threshold: f64) -> Result<Option<Region>, SamplerError> {
        let channel = self.config.midi.channel;
        let params = self.config.audio.params;
        let sampling = &self.config.sampling;
        let note = unit.zone.center;
        let velocity = unit.layer.hivel;

        self.trigger.all_notes_off(channel)?;
        let result = {
            let mut observer = NoteTrigger::new(&mut self.trigger, channel, note, velocity, true);
            Recorder::new(params, threshold)
                .limit(sampling.limit)
                .silence_timeout(sampling.silence_timeout)
                .show_progress(sampling.print_progress)
                .record(self.audio.as_ref(), &mut observer)?
        };

        let Some(channels) = result.channels else {
            return Ok(None);
        };
        if let Some(release) = result.release_time {
            debug!(release_ms = release.as_millis() as u64, "Recorded release.");
        }

        let raw = level::threshold_to_raw(threshold, params.bit_depth).max(1.0);
        let trimmed = trim::trim(&channels, raw * TRIM_START_FACTOR, raw, params.bit_depth);

        let peak = trimmed
            .iter()
            .map(|channel| level::peak_fraction(channel, params.bit_depth))
            .fold(0.0, f64::max);
        if peak > CLIP_WARNING {
            warn!(
                peak_dbfs = format!("{:.2}", level::amplitude_to_db(peak)),
                "Sample may be clipped."
            );
        }

        let loop_points = if sampling.looping {
            let points = looping::find_loop_points(&trimmed, params.sample_rate);
            match points {
                Some(points) => debug!(start = points.start, end = points.end, "Found loop."),
                None => warn!("No loop found, keeping the sample unlooped."),
            }
            points
        } else {
            None
        };

        let path = self
            .config
            .output_folder
            .join(zones::filename_for(note, velocity));
        wav::write_wav(&path, &trimmed, params.sample_rate, params.bit_depth).map_err(
            |source| SamplerError::Wav {
                path: path.clone(),
                source,
            },
        )?;
        info!(
            path = %path.display(),
            frames = trimmed.first().map_or(0, Vec::len),
            "Wrote sample."
        );

        Ok(Some(zones::region_for(unit.zone, unit.layer, loop_points)))
    }
}

/// Reads regions left by an earlier run. Regions whose sample is missing are dropped, and
/// unreadable metadata counts as no prior state.
fn load_prior_regions(path: &Path, folder: &Path) -> Vec<Region> {
    if !path.exists() {
        return Vec::new();
    }

    match SfzFile::read(path) {
        Ok(file) => {
            let regions: Vec<Region> = file
                .flattened_regions()
                .into_iter()
                .filter(|region| region.sample_exists(folder))
                .collect();
            info!(regions = regions.len(), "Resuming from existing metadata.");
            regions
        }
        Err(e) => {
            warn!(err = %e, "Ignoring unreadable metadata, starting from scratch.");
            Vec::new()
        }
    }
}

fn matches_unit(region: &Region, unit: &WorkUnit) -> bool {
    region.opcodes.hivel == Some(unit.layer.hivel) && region.key_center() == Some(unit.zone.center)
}

#[cfg(test)]
mod test {
    use std::{fs, path::Path, sync::Arc, time::Duration};

    use super::{Sampler, SamplerError, SkipReason, UnitOutcome, METADATA_FILE};
    use crate::{
        audio::{self, level::SILENCE_FLOOR, mock::VirtualSynth, wav, BitDepth, StreamParams},
        calibrate::CalibrationError,
        config::{AudioSettings, MidiSettings, SamplingSettings, SessionConfig},
        midi::{self, Trigger},
        sfz::{self, SfzFile},
        util::DeviceSelector,
        zones::{VelocityLayer, WorkUnit, Zone},
    };

    const LAYERS: [(u8, u8); 7] = [
        (1, 15),
        (16, 44),
        (45, 63),
        (64, 79),
        (80, 95),
        (96, 111),
        (112, 127),
    ];

    struct Rig {
        synth: VirtualSynth,
        audio: audio::mock::Device,
        midi: midi::mock::Device,
    }

    impl Rig {
        fn new() -> Rig {
            let synth = VirtualSynth::new();
            Rig {
                audio: audio::mock::Device::with_synth("mock-audio", synth.clone()),
                midi: midi::mock::Device::with_synth("mock-midi", synth.clone()),
                synth,
            }
        }

        fn sampler(&self, config: SessionConfig) -> Sampler {
            Sampler::new(
                config,
                Arc::new(self.audio.clone()),
                Trigger::new(Box::new(self.midi.clone()), Duration::ZERO),
            )
        }
    }

    fn config(folder: &Path) -> SessionConfig {
        SessionConfig {
            output_folder: folder.to_path_buf(),
            audio: AudioSettings {
                device: DeviceSelector::Name("mock-audio".to_string()),
                params: StreamParams {
                    channels: 2,
                    sample_rate: 8000,
                    bit_depth: BitDepth::Sixteen,
                    chunk_size: 256,
                },
            },
            midi: MidiSettings {
                device: DeviceSelector::Name("mock-midi".to_string()),
                channel: 1,
                program: None,
                settle_delay: Duration::ZERO,
            },
            sampling: SamplingSettings {
                low_key: 60,
                high_key: 60,
                velocity_levels: vec![15, 44, 63, 79, 95, 111, 127],
                key_range: 1,
                max_attempts: 3,
                limit: Duration::from_millis(300),
                silence_timeout: Duration::from_millis(200),
                portamento: false,
                ascending: false,
                looping: false,
                flac: false,
                print_progress: false,
                abort_on_clipping: true,
                clipping_ceiling: 0.85,
                clipping_check_note: 48,
            },
        }
    }

    fn unit(velocity: u8) -> WorkUnit {
        WorkUnit {
            zone: Zone {
                low: 60,
                high: 60,
                center: 60,
            },
            layer: VelocityLayer {
                lovel: 1,
                hivel: velocity,
            },
            completes_zone: false,
        }
    }

    fn layers_in(path: &Path) -> Vec<(u8, u8)> {
        let mut layers: Vec<(u8, u8)> = SfzFile::read(path)
            .unwrap()
            .flattened_regions()
            .iter()
            .map(|region| {
                (
                    region.opcodes.lovel.unwrap(),
                    region.opcodes.hivel.unwrap(),
                )
            })
            .collect();
        layers.sort();
        layers
    }

    #[test]
    fn samples_every_velocity_layer() {
        let dir = tempfile::tempdir().unwrap();
        let rig = Rig::new();
        let summary = rig.sampler(config(dir.path())).run().unwrap();

        assert_eq!(summary.captured, 7);
        assert_eq!(summary.reused, 0);
        assert_eq!(summary.groups, 1);

        let file = SfzFile::read(&dir.path().join(METADATA_FILE)).unwrap();
        let regions = file.flattened_regions();
        let layers: Vec<(u8, u8)> = regions
            .iter()
            .map(|region| {
                (
                    region.opcodes.lovel.unwrap(),
                    region.opcodes.hivel.unwrap(),
                )
            })
            .collect();
        assert_eq!(layers, LAYERS.to_vec());
        for region in regions.iter() {
            assert_eq!(region.opcodes.key, Some(60));
            assert!(region.sample_exists(dir.path()));
        }

        let leveled = SfzFile::read(&dir.path().join("file.sfz.leveled.sfz")).unwrap();
        assert_eq!(leveled.groups.len(), 1);
        let curve = &leveled.groups[0].opcodes.velcurve;
        assert_eq!(curve.get(&127), Some(&1.0));
        assert_eq!(curve.get(&1), Some(&0.0));
        assert!(curve.values().all(|value| (0.0..=1.0).contains(value)));
        assert_eq!(leveled.groups[0].regions.len(), 7);
    }

    #[test]
    fn resumes_an_interrupted_sweep() {
        const FLUSHED: usize = 3;

        let rig = Rig::new();
        let complete = tempfile::tempdir().unwrap();
        rig.sampler(config(complete.path())).run().unwrap();
        let regions = SfzFile::read(&complete.path().join(METADATA_FILE))
            .unwrap()
            .flattened_regions();

        // A crash after three flushes leaves their regions and samples, plus the sample of the
        // capture that was in flight without its region.
        let dir = tempfile::tempdir().unwrap();
        for region in regions.iter().take(FLUSHED + 1) {
            let sample = region.opcodes.sample.as_ref().unwrap();
            fs::copy(complete.path().join(sample), dir.path().join(sample)).unwrap();
        }
        fs::write(
            dir.path().join(METADATA_FILE),
            sfz::regions_to_string(&regions[..FLUSHED]),
        )
        .unwrap();

        let opens = rig.audio.opens();
        let summary = rig.sampler(config(dir.path())).run().unwrap();
        assert_eq!(summary.reused, FLUSHED);
        assert_eq!(summary.captured, LAYERS.len() - FLUSHED);
        // Noise floor, clipping check and the samples that were never flushed.
        assert_eq!(rig.audio.opens() - opens, 2 + LAYERS.len() - FLUSHED);

        assert_eq!(layers_in(&dir.path().join(METADATA_FILE)), LAYERS.to_vec());
        let resumed = SfzFile::read(&dir.path().join(METADATA_FILE))
            .unwrap()
            .flattened_regions();
        assert_eq!(resumed[..FLUSHED], regions[..FLUSHED]);
        assert!(resumed.iter().all(|region| region.sample_exists(dir.path())));
    }

    #[test]
    fn unreadable_metadata_starts_over() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(METADATA_FILE), "sample=C4_v15.wav\n").unwrap();

        let rig = Rig::new();
        let summary = rig.sampler(config(dir.path())).run().unwrap();
        assert_eq!(summary.captured, 7);
        assert_eq!(layers_in(&dir.path().join(METADATA_FILE)), LAYERS.to_vec());
    }

    #[test]
    fn silence_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let rig = Rig::new();
        rig.synth.set_muted(true);
        let mut sampler = rig.sampler(config(dir.path()));

        let outcome = sampler.run_unit(unit(63), SILENCE_FLOOR).unwrap();
        assert_eq!(outcome, UnitOutcome::Skipped(SkipReason::Silence));
        assert_eq!(rig.audio.opens(), 1);
        assert!(!dir.path().join("C4_v63.wav").exists());
    }

    #[test]
    fn silent_source_aborts_before_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let rig = Rig::new();
        rig.synth.set_muted(true);

        let result = rig.sampler(config(dir.path())).run();
        assert!(matches!(
            result,
            Err(SamplerError::Calibration(CalibrationError::Silent))
        ));
        assert!(!dir.path().join(METADATA_FILE).exists());
    }

    #[test]
    fn clipping_aborts_before_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let rig = Rig::new();
        let mut config = config(dir.path());
        config.sampling.clipping_ceiling = 0.1;

        let result = rig.sampler(config).run();
        assert!(matches!(
            result,
            Err(SamplerError::Calibration(CalibrationError::Clipping { .. }))
        ));
        assert_eq!(rig.audio.opens(), 2);
        assert!(!dir.path().join(METADATA_FILE).exists());
    }

    #[test]
    fn retries_transient_failures() {
        let dir = tempfile::tempdir().unwrap();
        let rig = Rig::new();
        let mut sampler = rig.sampler(config(dir.path()));

        rig.audio.fail_next_streams(2);
        let outcome = sampler.run_unit(unit(95), SILENCE_FLOOR).unwrap();
        assert!(matches!(outcome, UnitOutcome::Captured(_)));
        assert_eq!(rig.audio.opens(), 3);
        assert!(dir.path().join("C4_v95.wav").is_file());
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let rig = Rig::new();
        let mut sampler = rig.sampler(config(dir.path()));

        rig.audio.fail_next_streams(3);
        let outcome = sampler.run_unit(unit(95), SILENCE_FLOOR).unwrap();
        match outcome {
            UnitOutcome::ExhaustedRetries { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(!dir.path().join("C4_v95.wav").exists());
    }

    #[test]
    fn portamento_plays_the_note_twice() {
        let dir = tempfile::tempdir().unwrap();
        let rig = Rig::new();
        let mut config = config(dir.path());
        config.sampling.portamento = true;
        let mut sampler = rig.sampler(config);

        let outcome = sampler.run_unit(unit(127), SILENCE_FLOOR).unwrap();
        assert!(matches!(outcome, UnitOutcome::Captured(_)));
        assert_eq!(rig.audio.opens(), 2);
        let note_ons = rig
            .midi
            .emitted()
            .into_iter()
            .filter(|event| event == &vec![0x90, 60, 127])
            .count();
        assert_eq!(note_ons, 2);
    }

    #[test]
    fn loops_sustained_samples() {
        let dir = tempfile::tempdir().unwrap();
        let rig = Rig::new();
        let mut config = config(dir.path());
        config.sampling.looping = true;
        config.sampling.limit = Duration::from_secs(1);
        let mut sampler = rig.sampler(config);

        let region = match sampler.run_unit(unit(127), SILENCE_FLOOR).unwrap() {
            UnitOutcome::Captured(region) => region,
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert_eq!(region.opcodes.loop_mode.as_deref(), Some("loop_continuous"));
        let start = region.opcodes.loop_start.unwrap();
        let end = region.opcodes.loop_end.unwrap();
        assert!(start < end);

        let data = wav::read_wav(&dir.path().join("C4_v127.wav")).unwrap();
        assert!((end as usize) < data.channels[0].len());
    }
}
