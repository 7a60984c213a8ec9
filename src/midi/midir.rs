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
use std::{error::Error, fmt};

use midir::{MidiOutput, MidiOutputConnection, MidiOutputPort};
use midly::live::LiveEvent;
use tracing::{debug, info, span, Level};

use crate::util::DeviceSelector;

/// A midir output port. The connection is opened when the device is selected and
/// held for the whole session.
pub struct Device {
    name: String,
    port: MidiOutputPort,
    connection: Option<MidiOutputConnection>,
}

impl super::Device for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn emit(&mut self, event: LiveEvent<'static>) -> Result<(), Box<dyn Error>> {
        let span = span!(Level::DEBUG, "emit (midir)");
        let _enter = span.enter();

        let connection = match self.connection.as_mut() {
            Some(connection) => connection,
            None => return Err(format!("MIDI device {} is not connected", self.name).into()),
        };

        debug!(
            device = self.name,
            event = format!("{:?}", event),
            "Emitting event."
        );

        // Channel messages are at most three bytes.
        let mut buf: Vec<u8> = Vec::with_capacity(3);
        event.write(&mut buf)?;
        connection.send(&buf)?;

        Ok(())
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Output)", self.name)
    }
}

/// Lists midir output devices and produces the Device trait.
pub fn list() -> Result<Vec<Box<dyn super::Device>>, Box<dyn Error>> {
    Ok(list_midir_devices()?
        .into_iter()
        .map(|device| {
            let device: Box<dyn super::Device> = Box::new(device);
            device
        })
        .collect())
}

/// Lists midir output devices, sorted by name.
fn list_midir_devices() -> Result<Vec<Device>, Box<dyn Error>> {
    let output = MidiOutput::new("autosampler output listing")?;

    let mut devices = output
        .ports()
        .into_iter()
        .map(|port| {
            Ok(Device {
                name: output.port_name(&port)?,
                port,
                connection: None,
            })
        })
        .collect::<Result<Vec<Device>, Box<dyn Error>>>()?;

    devices.sort_by_key(|device| device.name.clone());
    Ok(devices)
}

/// Gets the midir output matching the selector and connects to it.
pub fn get(selector: &DeviceSelector) -> Result<Device, Box<dyn Error>> {
    let mut device = selector.select(list_midir_devices()?, |device| device.name.clone())?;

    let output = MidiOutput::new("autosampler output")?;
    device.connection = Some(output.connect(&device.port, "autosampler trigger")?);
    info!(device = device.name, "Connected to MIDI output.");

    Ok(device)
}
