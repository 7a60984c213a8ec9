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
use super::{CaptureError, CaptureObserver};
use crate::midi::Trigger;

/// Plays a note through the trigger once the stream is running and releases it when the
/// take is over.
pub struct NoteTrigger<'a> {
    trigger: &'a mut Trigger,
    channel: u8,
    note: u8,
    velocity: u8,
    extend: bool,
    released: bool,
}

impl<'a> NoteTrigger<'a> {
    /// Creates a note trigger. If `extend` is set, the take continues past the time limit to
    /// record the release.
    pub fn new(
        trigger: &'a mut Trigger,
        channel: u8,
        note: u8,
        velocity: u8,
        extend: bool,
    ) -> NoteTrigger<'a> {
        NoteTrigger {
            trigger,
            channel,
            note,
            velocity,
            extend,
            released: false,
        }
    }

    fn release(&mut self) -> Result<(), CaptureError> {
        if !self.released {
            self.released = true;
            self.trigger.note_off(self.channel, self.note)?;
        }
        Ok(())
    }
}

impl CaptureObserver for NoteTrigger<'_> {
    fn on_first_chunk(&mut self) -> Result<(), CaptureError> {
        self.trigger
            .note_on(self.channel, self.note, self.velocity)?;
        Ok(())
    }

    fn on_time_limit_reached(&mut self) -> Result<bool, CaptureError> {
        self.release()?;
        Ok(self.extend)
    }

    fn on_silence_timeout(&mut self) -> Result<(), CaptureError> {
        self.release()
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::NoteTrigger;
    use crate::capture::CaptureObserver;
    use crate::midi::{mock, Trigger};

    #[test]
    fn plays_and_releases_once() {
        let device = mock::Device::get("mock-midi");
        let mut trigger = Trigger::new(Box::new(device.clone()), Duration::ZERO);
        {
            let mut note = NoteTrigger::new(&mut trigger, 2, 60, 100, true);
            note.on_first_chunk().unwrap();
            assert!(note.on_time_limit_reached().unwrap());
            note.on_silence_timeout().unwrap();
        }
        assert_eq!(device.emitted(), vec![vec![0x91, 60, 100], vec![0x81, 60, 0]]);
    }

    #[test]
    fn no_extension() {
        let device = mock::Device::get("mock-midi");
        let mut trigger = Trigger::new(Box::new(device.clone()), Duration::ZERO);
        let mut note = NoteTrigger::new(&mut trigger, 1, 48, 127, false);
        assert!(!note.on_time_limit_reached().unwrap());
    }

    #[test]
    fn invalid_note_is_not_transient() {
        let device = mock::Device::get("mock-midi");
        let mut trigger = Trigger::new(Box::new(device), Duration::ZERO);
        let mut note = NoteTrigger::new(&mut trigger, 1, 200, 127, false);
        assert!(!note.on_first_chunk().unwrap_err().is_transient());
    }
}
