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
use std::{error::Error, fmt, sync::Arc};

use midly::live::LiveEvent;
use parking_lot::Mutex;

use crate::audio::mock::VirtualSynth;

/// A mock device. Records everything it emits and forwards events to a virtual synth, if any.
#[derive(Clone)]
pub struct Device {
    name: String,
    emitted: Arc<Mutex<Vec<Vec<u8>>>>,
    synth: Option<VirtualSynth>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            emitted: Arc::new(Mutex::new(Vec::new())),
            synth: None,
        }
    }

    /// Gets a mock device that plays the given synth.
    pub fn with_synth(name: &str, synth: VirtualSynth) -> Device {
        Device {
            synth: Some(synth),
            ..Device::get(name)
        }
    }

    /// Gets every event emitted so far, in wire format.
    pub fn emitted(&self) -> Vec<Vec<u8>> {
        self.emitted.lock().clone()
    }
}

impl super::Device for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn emit(&mut self, event: LiveEvent<'static>) -> Result<(), Box<dyn Error>> {
        let mut buf: Vec<u8> = Vec::with_capacity(3);
        event.write(&mut buf)?;
        self.emitted.lock().push(buf);

        if let Some(synth) = &self.synth {
            synth.handle(&event);
        }

        Ok(())
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
