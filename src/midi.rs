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
use std::{error::Error, fmt, time::Duration};

use midly::{
    live::LiveEvent,
    num::{u4, u7},
    MidiMessage,
};
use tracing::{debug, info};

use crate::util::DeviceSelector;

mod midir;
pub mod mock;

/// The "all notes off" channel mode message.
const CC_ALL_NOTES_OFF: u8 = 0x7B;

/// The "reset all controllers" channel mode message.
const CC_RESET_ALL_CONTROLLERS: u8 = 0x79;

/// A MIDI output that trigger messages are sent through.
pub trait Device: fmt::Display {
    /// Returns the name of the device.
    fn name(&self) -> String;

    /// Emits an event.
    fn emit(&mut self, event: LiveEvent<'static>) -> Result<(), Box<dyn Error>>;
}

#[derive(Debug, thiserror::Error)]
pub enum MidiError {
    #[error("MIDI channel {0} is out of range, expected 1-16")]
    InvalidChannel(u8),

    #[error("MIDI data byte {0} is out of range, expected 0-127")]
    InvalidData(u8),

    #[error("Unable to send MIDI to {device}: {message}")]
    Send { device: String, message: String },
}

/// Lists MIDI output devices known to midir.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, Box<dyn Error>> {
    midir::list()
}

/// Gets the MIDI output device matching the selector.
pub fn get_device(selector: &DeviceSelector) -> Result<Box<dyn Device>, Box<dyn Error>> {
    if selector.is_mock() {
        return Ok(Box::new(mock::Device::get(&selector.to_string())));
    }

    Ok(Box::new(midir::get(selector)?))
}

/// Sends the trigger protocol used to play the sound source. Channels are 1-based.
pub struct Trigger {
    device: Box<dyn Device>,
    settle_delay: Duration,
}

impl Trigger {
    /// Creates a trigger that waits `settle_delay` after resets and program changes.
    pub fn new(device: Box<dyn Device>, settle_delay: Duration) -> Trigger {
        Trigger {
            device,
            settle_delay,
        }
    }

    pub fn note_on(&mut self, channel: u8, note: u8, velocity: u8) -> Result<(), MidiError> {
        self.send(
            channel,
            MidiMessage::NoteOn {
                key: data_byte(note)?,
                vel: data_byte(velocity)?,
            },
        )
    }

    pub fn note_off(&mut self, channel: u8, note: u8) -> Result<(), MidiError> {
        self.send(
            channel,
            MidiMessage::NoteOff {
                key: data_byte(note)?,
                vel: u7::from(0),
            },
        )
    }

    /// Switches the source to the given program and waits for it to settle.
    pub fn program_change(&mut self, channel: u8, program: u8) -> Result<(), MidiError> {
        info!(channel, program, "Sending program change.");
        self.send(
            channel,
            MidiMessage::ProgramChange {
                program: data_byte(program)?,
            },
        )?;
        self.settle();
        Ok(())
    }

    pub fn control_change(
        &mut self,
        channel: u8,
        controller: u8,
        value: u8,
    ) -> Result<(), MidiError> {
        self.send(
            channel,
            MidiMessage::Controller {
                controller: data_byte(controller)?,
                value: data_byte(value)?,
            },
        )
    }

    /// Silences every note, resets controllers and waits for the source to settle.
    pub fn all_notes_off(&mut self, channel: u8) -> Result<(), MidiError> {
        self.control_change(channel, CC_ALL_NOTES_OFF, 0)?;
        self.control_change(channel, CC_RESET_ALL_CONTROLLERS, 0)?;
        self.settle();
        Ok(())
    }

    fn settle(&self) {
        if !self.settle_delay.is_zero() {
            spin_sleep::sleep(self.settle_delay);
        }
    }

    fn send(&mut self, channel: u8, message: MidiMessage) -> Result<(), MidiError> {
        let event = LiveEvent::Midi {
            channel: wire_channel(channel)?,
            message,
        };
        debug!(event = format!("{:?}", event), "Sending trigger.");
        self.device.emit(event).map_err(|e| MidiError::Send {
            device: self.device.name(),
            message: e.to_string(),
        })
    }
}

/// Maps a 1-based channel onto the 0-based wire channel.
fn wire_channel(channel: u8) -> Result<u4, MidiError> {
    if !(1..=16).contains(&channel) {
        return Err(MidiError::InvalidChannel(channel));
    }
    Ok(u4::from(channel - 1))
}

fn data_byte(value: u8) -> Result<u7, MidiError> {
    u7::try_from(value).ok_or(MidiError::InvalidData(value))
}
