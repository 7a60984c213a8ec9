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
mod audio;
mod calibrate;
mod capture;
mod config;
mod leveler;
mod looping;
mod midi;
mod sampler;
mod sfz;
mod util;
mod zones;

use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{crate_version, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::{Overrides, SessionConfig};
use crate::sampler::Sampler;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "Samples an external MIDI instrument into an SFZ library."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Samples the instrument into the output folder.
    Sample {
        /// The folder the samples and metadata are written to.
        output_folder: Option<PathBuf>,
        /// A YAML session config. Command line options override it.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// The audio input device name.
        #[arg(long)]
        audio_device: Option<String>,
        /// The audio input device index, as listed by `devices`.
        #[arg(long)]
        audio_device_index: Option<usize>,
        /// The sample rate in Hz.
        #[arg(long)]
        sample_rate: Option<u32>,
        /// The bit depth, 16 or 24.
        #[arg(long)]
        bit_depth: Option<u16>,
        /// The MIDI output device name.
        #[arg(long)]
        midi_device: Option<String>,
        /// The MIDI output device index, as listed by `midi-devices`.
        #[arg(long)]
        midi_device_index: Option<usize>,
        /// The MIDI channel, 1-16.
        #[arg(long)]
        midi_channel: Option<u8>,
        /// A program to switch to before sampling.
        #[arg(long)]
        program: Option<u8>,
        /// The lowest key, as a number or a name such as A0.
        #[arg(long)]
        low_key: Option<String>,
        /// The highest key, as a number or a name such as C8.
        #[arg(long)]
        high_key: Option<String>,
        /// Comma separated velocity levels, for example 15,44,63,79,95,111,127.
        #[arg(long, value_delimiter = ',')]
        velocity_levels: Option<Vec<u8>>,
        /// The number of keys covered by each sample.
        #[arg(long)]
        key_range: Option<u8>,
        /// Attempts per sample before giving up on I/O errors.
        #[arg(long)]
        max_attempts: Option<usize>,
        /// How long each note is held, for example 45s.
        #[arg(long)]
        limit: Option<String>,
        /// Play each note once before sampling it.
        #[arg(long)]
        portamento: bool,
        /// Sample from low to high.
        #[arg(long)]
        ascending: bool,
        /// Search for sustain loops.
        #[arg(long = "loop")]
        looping: bool,
        /// Request a FLAC pass over the finished samples.
        #[arg(long)]
        flac: bool,
        /// Draw a level meter while recording.
        #[arg(long)]
        print_progress: bool,
    },
    /// Lists the available audio input devices.
    Devices {},
    /// Lists the available MIDI output devices.
    MidiDevices {},
    /// Levels the velocity layers of an existing SFZ file.
    Level {
        /// The SFZ file to level. Sample paths are resolved from its folder.
        path: PathBuf,
        /// Where to write the leveled file (default: the input path with .leveled.sfz appended).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Prints the loop points found in a WAV file.
    Loop {
        /// The WAV file to search.
        path: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sample {
            output_folder,
            config,
            audio_device,
            audio_device_index,
            sample_rate,
            bit_depth,
            midi_device,
            midi_device_index,
            midi_channel,
            program,
            low_key,
            high_key,
            velocity_levels,
            key_range,
            max_attempts,
            limit,
            portamento,
            ascending,
            looping,
            flac,
            print_progress,
        } => {
            let overrides = Overrides::new()
                .set(
                    "output_folder",
                    output_folder.map(|path| path.to_string_lossy().to_string()),
                )
                .set("audio.device", audio_device)
                .set("audio.device_index", audio_device_index.map(|i| i as i64))
                .set("audio.sample_rate", sample_rate.map(i64::from))
                .set("audio.bit_depth", bit_depth.map(i64::from))
                .set("midi.device", midi_device)
                .set("midi.device_index", midi_device_index.map(|i| i as i64))
                .set("midi.channel", midi_channel.map(i64::from))
                .set("midi.program", program.map(i64::from))
                .set("sampling.low_key", low_key)
                .set("sampling.high_key", high_key)
                .set(
                    "sampling.velocity_levels",
                    velocity_levels.map(|levels| {
                        levels.into_iter().map(i64::from).collect::<Vec<i64>>()
                    }),
                )
                .set("sampling.key_range", key_range.map(i64::from))
                .set("sampling.max_attempts", max_attempts.map(|n| n as i64))
                .set("sampling.limit", limit)
                .set("sampling.portamento", portamento.then_some(true))
                .set("sampling.ascending", ascending.then_some(true))
                .set("sampling.looping", looping.then_some(true))
                .set("sampling.flac", flac.then_some(true))
                .set("sampling.print_progress", print_progress.then_some(true));

            let config = SessionConfig::load(config.as_deref(), overrides)?;
            let summary = Sampler::connect(config)?.run()?;
            println!(
                "Captured {}, reused {}, skipped {}, failed {} samples in {} zones.",
                summary.captured, summary.reused, summary.skipped, summary.failed, summary.groups
            );
        }
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for (index, device) in devices.iter().enumerate() {
                println!("{}: {}", index, device);
            }
        }
        Commands::MidiDevices {} => {
            let devices = midi::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for (index, device) in devices.iter().enumerate() {
                println!("{}: {}", index, device);
            }
        }
        Commands::Level { path, output } => {
            let root = path.parent().unwrap_or(Path::new(".")).to_path_buf();
            let output = output.unwrap_or_else(|| sfz::leveled_path(&path));

            let file = sfz::SfzFile::read(&path)?;
            let leveled = leveler::level_file(&file, &root)?;
            sfz::write_atomic(&output, &leveled.to_string())?;
            println!(
                "Leveled {} zones into {}.",
                leveled.groups.len(),
                util::filename_display(&output)
            );
        }
        Commands::Loop { path } => {
            let data = audio::wav::read_wav(&path)?;
            match looping::find_loop_points(&data.channels, data.sample_rate) {
                Some(points) => println!(
                    "loop_start={} loop_end={} ({} frames)",
                    points.start,
                    points.end,
                    points.len()
                ),
                None => println!("No loop found in {}.", util::filename_display(&path)),
            }
        }
    }

    Ok(())
}
