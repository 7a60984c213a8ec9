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

use crate::util::DeviceSelector;

pub mod cpal;
pub mod format;
pub mod level;
pub mod mock;
pub mod trim;
pub mod wav;

pub use format::{BitDepth, StreamParams};

/// An audio input that can be opened for a single capture.
pub trait Device: fmt::Display + std::marker::Send + std::marker::Sync {
    /// Returns the name of the device.
    fn name(&self) -> String;

    /// Opens an input stream. The stream is running once this returns and is
    /// closed when dropped.
    fn open(&self, params: &StreamParams) -> Result<Box<dyn InputStream>, Box<dyn Error>>;
}

/// A running input stream delivering interleaved integer samples.
pub trait InputStream {
    /// Blocks until the next chunk of `chunk_size` frames is available.
    /// Returns None once the stream has ended.
    fn next_chunk(&mut self) -> Result<Option<Vec<i32>>, Box<dyn Error>>;
}

/// Lists input devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, Box<dyn Error>> {
    cpal::Device::list()
}

/// Gets the input device matching the selector.
pub fn get_device(selector: &DeviceSelector) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    if selector.is_mock() {
        return Ok(Arc::new(mock::Device::get(&selector.to_string())));
    }

    Ok(Arc::new(cpal::Device::get(selector)?))
}
