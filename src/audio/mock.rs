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
use std::{
    error::Error,
    f64::consts::PI,
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use midly::{live::LiveEvent, MidiMessage};
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::debug;

use super::format::{BitDepth, StreamParams};

/// Streams end after this much audio so that a runaway capture cannot spin forever.
const MAX_STREAM_SECONDS: u64 = 600;

/// Release time constant of a voice, in seconds.
const RELEASE_SECONDS: f64 = 0.05;

/// Voices quieter than this (fraction of full scale) are dropped.
const VOICE_CUTOFF: f64 = 1e-7;

/// Gain of the right channel relative to the left.
const RIGHT_CHANNEL_GAIN: f64 = 0.9;

struct Voice {
    note: u8,
    velocity: u8,
    start: u64,
    release: Option<u64>,
}

#[derive(Default)]
struct SynthState {
    /// Frames rendered so far across every stream.
    clock: u64,
    voices: Vec<Voice>,
    muted: bool,
}

/// A simulated instrument. The MIDI mock feeds it note events and the audio mock
/// renders it, so that a pair of mock devices behaves like a real sound source.
/// Each voice is a sustained sine at the note's pitch whose level grows with the
/// square of the velocity and which decays exponentially after note off.
#[derive(Clone, Default)]
pub struct VirtualSynth {
    state: Arc<Mutex<SynthState>>,
}

impl VirtualSynth {
    pub fn new() -> VirtualSynth {
        VirtualSynth::default()
    }

    /// Silences the instrument: note events are still accepted but nothing is rendered.
    pub fn set_muted(&self, muted: bool) {
        self.state.lock().muted = muted;
    }

    /// Applies a MIDI event to the instrument.
    pub fn handle(&self, event: &LiveEvent) {
        if let LiveEvent::Midi { message, .. } = event {
            match message {
                MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                    self.note_on(key.as_int(), vel.as_int())
                }
                MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                    self.note_off(key.as_int())
                }
                MidiMessage::Controller { controller, .. } if controller.as_int() == 123 => {
                    self.all_notes_off()
                }
                _ => {}
            }
        }
    }

    fn note_on(&self, note: u8, velocity: u8) {
        let mut state = self.state.lock();
        let start = state.clock;
        debug!(note, velocity, frame = start, "Virtual synth note on.");
        state.voices.push(Voice {
            note,
            velocity,
            start,
            release: None,
        });
    }

    fn note_off(&self, note: u8) {
        let mut state = self.state.lock();
        let clock = state.clock;
        state
            .voices
            .iter_mut()
            .filter(|voice| voice.note == note && voice.release.is_none())
            .for_each(|voice| voice.release = Some(clock));
    }

    /// The mock has no wall clock between streams, so the settle time a real source gets
    /// after all notes off is modelled by dropping every voice at once.
    fn all_notes_off(&self) {
        self.state.lock().voices.clear();
    }

    /// The number of voices still sounding.
    pub fn active_voices(&self) -> usize {
        self.state.lock().voices.len()
    }

    /// Renders the given number of frames as fractions of full scale and advances the clock.
    fn render(&self, frames: usize, sample_rate: u32) -> Vec<f64> {
        let mut state = self.state.lock();
        let rate = f64::from(sample_rate);
        let start_clock = state.clock;
        let mut output = vec![0.0; frames];

        if !state.muted {
            for voice in state.voices.iter() {
                let frequency = 440.0 * 2f64.powf((f64::from(voice.note) - 69.0) / 12.0);
                let level = 0.5 * (f64::from(voice.velocity) / 127.0).powi(2);
                for (offset, sample) in output.iter_mut().enumerate() {
                    let frame = start_clock + offset as u64;
                    if frame < voice.start {
                        continue;
                    }
                    let t = (frame - voice.start) as f64 / rate;
                    let envelope = match voice.release {
                        Some(release) if frame >= release => {
                            (-((frame - release) as f64 / rate) / RELEASE_SECONDS).exp()
                        }
                        _ => 1.0,
                    };
                    *sample += level * envelope * (2.0 * PI * frequency * t).sin();
                }
            }
        }

        state.clock += frames as u64;
        let clock = state.clock;
        state.voices.retain(|voice| match voice.release {
            Some(release) if clock > release => {
                (-((clock - release) as f64 / rate) / RELEASE_SECONDS).exp() > VOICE_CUTOFF
            }
            _ => true,
        });

        output
    }
}

/// A mock input device. Renders its virtual synth (if any) plus optional noise.
#[derive(Clone)]
pub struct Device {
    name: String,
    synth: Option<VirtualSynth>,
    noise: f64,
    pending_failures: Arc<AtomicUsize>,
    opens: Arc<AtomicUsize>,
}

impl Device {
    /// Gets the given mock device. Without a synth it only produces noise.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            synth: None,
            noise: 0.0,
            pending_failures: Arc::new(AtomicUsize::new(0)),
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Gets a mock device that renders the given synth.
    pub fn with_synth(name: &str, synth: VirtualSynth) -> Device {
        Device {
            synth: Some(synth),
            ..Device::get(name)
        }
    }

    /// Adds uniform noise with the given peak, as a fraction of full scale.
    pub fn with_noise(mut self, noise: f64) -> Device {
        self.noise = noise;
        self
    }

    /// Makes the next `count` opened streams fail on their first read.
    pub fn fail_next_streams(&self, count: usize) {
        self.pending_failures.store(count, Ordering::Relaxed);
    }

    /// The number of streams opened so far.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::Relaxed)
    }
}

impl super::Device for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn open(&self, params: &StreamParams) -> Result<Box<dyn super::InputStream>, Box<dyn Error>> {
        let opened = self.opens.fetch_add(1, Ordering::Relaxed);
        let fail = self
            .pending_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |pending| {
                pending.checked_sub(1)
            })
            .is_ok();

        Ok(Box::new(Stream {
            synth: self.synth.clone(),
            params: *params,
            noise: self.noise,
            rng: StdRng::seed_from_u64(opened as u64),
            fail,
            frames: 0,
        }))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

struct Stream {
    synth: Option<VirtualSynth>,
    params: StreamParams,
    noise: f64,
    rng: StdRng,
    fail: bool,
    frames: u64,
}

impl Stream {
    fn to_sample(value: f64, bit_depth: BitDepth) -> i32 {
        let full_scale = bit_depth.full_scale();
        (value * full_scale)
            .round()
            .clamp(-full_scale, f64::from(bit_depth.max_sample())) as i32
    }
}

impl super::InputStream for Stream {
    fn next_chunk(&mut self) -> Result<Option<Vec<i32>>, Box<dyn Error>> {
        if self.fail {
            return Err("mock input overflowed".into());
        }
        if self.frames >= MAX_STREAM_SECONDS * u64::from(self.params.sample_rate) {
            return Ok(None);
        }

        let frames = self.params.chunk_size;
        let signal = match &self.synth {
            Some(synth) => synth.render(frames, self.params.sample_rate),
            None => vec![0.0; frames],
        };
        self.frames += frames as u64;

        let channels = usize::from(self.params.channels);
        let mut chunk = Vec::with_capacity(frames * channels);
        for value in signal {
            for channel in 0..channels {
                let gain = if channel == 0 { 1.0 } else { RIGHT_CHANNEL_GAIN };
                let noise = if self.noise > 0.0 {
                    self.rng.gen_range(-self.noise..=self.noise)
                } else {
                    0.0
                };
                chunk.push(Stream::to_sample(
                    value * gain + noise,
                    self.params.bit_depth,
                ));
            }
        }

        Ok(Some(chunk))
    }
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use midly::{
        live::LiveEvent,
        num::{u4, u7},
        MidiMessage,
    };

    use super::{Device, VirtualSynth};
    use crate::audio::{level, BitDepth, Device as _, InputStream as _, StreamParams};

    fn params() -> StreamParams {
        StreamParams {
            channels: 2,
            sample_rate: 8000,
            bit_depth: BitDepth::Sixteen,
            chunk_size: 256,
        }
    }

    fn note_on(key: u8, vel: u8) -> LiveEvent<'static> {
        LiveEvent::Midi {
            channel: u4::from(0),
            message: MidiMessage::NoteOn {
                key: u7::from(key),
                vel: u7::from(vel),
            },
        }
    }

    fn note_off(key: u8) -> LiveEvent<'static> {
        LiveEvent::Midi {
            channel: u4::from(0),
            message: MidiMessage::NoteOff {
                key: u7::from(key),
                vel: u7::from(0),
            },
        }
    }

    #[test]
    fn renders_silence_without_notes() -> Result<(), Box<dyn Error>> {
        let device = Device::with_synth("mock", VirtualSynth::new());
        let mut stream = device.open(&params())?;
        let chunk = stream.next_chunk()?.expect("chunk");
        assert_eq!(chunk.len(), 512);
        assert!(chunk.iter().all(|sample| *sample == 0));
        Ok(())
    }

    #[test]
    fn louder_with_velocity() -> Result<(), Box<dyn Error>> {
        let synth = VirtualSynth::new();
        let device = Device::with_synth("mock", synth.clone());
        let mut stream = device.open(&params())?;

        synth.handle(&note_on(60, 32));
        let soft = level::peak(&stream.next_chunk()?.expect("chunk"));
        synth.handle(&note_off(60));
        for _ in 0..40 {
            stream.next_chunk()?;
        }
        assert_eq!(synth.active_voices(), 0);

        synth.handle(&note_on(60, 127));
        let loud = level::peak(&stream.next_chunk()?.expect("chunk"));
        assert!(loud > soft * 4, "loud {} soft {}", loud, soft);
        Ok(())
    }

    #[test]
    fn muted_synth_is_silent() -> Result<(), Box<dyn Error>> {
        let synth = VirtualSynth::new();
        synth.set_muted(true);
        let device = Device::with_synth("mock", synth.clone());
        let mut stream = device.open(&params())?;
        synth.handle(&note_on(60, 127));
        assert_eq!(level::peak(&stream.next_chunk()?.expect("chunk")), 0);
        Ok(())
    }

    #[test]
    fn scripted_failures() -> Result<(), Box<dyn Error>> {
        let device = Device::get("mock");
        device.fail_next_streams(1);
        assert!(device.open(&params())?.next_chunk().is_err());
        assert!(device.open(&params())?.next_chunk().is_ok());
        assert_eq!(device.opens(), 2);
        Ok(())
    }

    #[test]
    fn noise_stays_within_bounds() -> Result<(), Box<dyn Error>> {
        let device = Device::get("mock").with_noise(0.001);
        let mut stream = device.open(&params())?;
        let chunk = stream.next_chunk()?.expect("chunk");
        let peak = level::peak(&chunk);
        assert!(peak > 0);
        assert!(peak <= 33);
        Ok(())
    }

    #[test]
    fn all_notes_off_silences_at_once() -> Result<(), Box<dyn Error>> {
        let synth = VirtualSynth::new();
        let device = Device::with_synth("mock", synth.clone());
        let mut stream = device.open(&params())?;
        synth.handle(&note_on(60, 127));
        synth.handle(&note_on(64, 127));
        stream.next_chunk()?;
        synth.handle(&LiveEvent::Midi {
            channel: u4::from(0),
            message: MidiMessage::Controller {
                controller: u7::from(123),
                value: u7::from(0),
            },
        });
        assert_eq!(synth.active_voices(), 0);
        assert_eq!(level::peak(&stream.next_chunk()?.expect("chunk")), 0);
        Ok(())
    }
}
