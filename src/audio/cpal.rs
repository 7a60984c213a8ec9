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

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{error, info, span, Level};

use super::format::StreamParams;
use crate::util::DeviceSelector;

/// How long to wait for the driver to deliver audio before treating the read as failed.
const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// A small wrapper around a cpal::Device used for capture.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The maximum number of input channels the device supports.
    max_channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

impl Device {
    /// Lists cpal input devices and produces the Device trait.
    pub fn list() -> Result<Vec<Box<dyn super::Device>>, Box<dyn Error>> {
        Ok(Device::list_cpal_devices()?
            .into_iter()
            .map(|device| {
                let device: Box<dyn super::Device> = Box::new(device);
                device
            })
            .collect())
    }

    /// Lists cpal input devices, sorted by name.
    fn list_cpal_devices() -> Result<Vec<Device>, Box<dyn Error>> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.input_devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list input devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let input_configs = match device.supported_input_configs() {
                    Ok(input_configs) => input_configs,
                    Err(_) => continue,
                };
                let max_channels = input_configs
                    .map(|config| config.channels())
                    .max()
                    .unwrap_or(0);

                if max_channels > 0 {
                    devices.push(Device {
                        name: device.name()?,
                        max_channels,
                        host_id,
                        device,
                    })
                }
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Gets the cpal input device matching the selector.
    pub fn get(selector: &DeviceSelector) -> Result<Device, Box<dyn Error>> {
        selector.select(Device::list_cpal_devices()?, |device| {
            device.name.trim().to_string()
        })
    }
}

impl super::Device for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn open(&self, params: &StreamParams) -> Result<Box<dyn super::InputStream>, Box<dyn Error>> {
        let span = span!(Level::DEBUG, "open input (cpal)");
        let _enter = span.enter();

        if self.max_channels < params.channels {
            return Err(format!(
                "{} input channels requested, audio device {} only has {}",
                params.channels, self.name, self.max_channels
            )
            .into());
        }

        let config = cpal::StreamConfig {
            channels: params.channels,
            sample_rate: cpal::SampleRate(params.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        // Samples arrive as full-range i32 and are shifted down to the capture bit depth.
        let shift = 32 - u32::from(params.bit_depth.bits());
        let (sender, receiver) = crossbeam_channel::unbounded();

        let sample_format = self.device.default_input_config()?.sample_format();
        let stream = match sample_format {
            cpal::SampleFormat::I16 => build_stream::<i16>(&self.device, &config, shift, sender)?,
            cpal::SampleFormat::I32 => build_stream::<i32>(&self.device, &config, shift, sender)?,
            cpal::SampleFormat::F32 => build_stream::<f32>(&self.device, &config, shift, sender)?,
            format => {
                return Err(format!(
                    "unsupported input sample format {} on {}",
                    format, self.name
                )
                .into())
            }
        };
        stream.play()?;

        info!(
            device = self.name,
            sample_rate = params.sample_rate,
            bit_depth = params.bit_depth.bits(),
            format = sample_format.to_string(),
            "Input stream started."
        );

        Ok(Box::new(Stream {
            _stream: stream,
            receiver,
            pending: Vec::with_capacity(params.chunk_samples() * 2),
            chunk_samples: params.chunk_samples(),
        }))
    }
}

/// Builds an input stream that forwards converted buffers over the channel.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    shift: u32,
    sender: Sender<Result<Vec<i32>, String>>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample,
    i32: cpal::FromSample<T>,
{
    let error_sender = sender.clone();
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let converted = data
                .iter()
                .map(|sample| <i32 as cpal::Sample>::from_sample(*sample) >> shift)
                .collect();
            // The receiver is only gone once the capture has finished.
            let _ = sender.send(Ok(converted));
        },
        move |err| {
            error!("CPAL input stream error: {}", err);
            let _ = error_sender.send(Err(err.to_string()));
        },
        None,
    )
}

/// A running cpal input stream. Closed when dropped.
struct Stream {
    _stream: cpal::Stream,
    receiver: Receiver<Result<Vec<i32>, String>>,
    pending: Vec<i32>,
    chunk_samples: usize,
}

impl super::InputStream for Stream {
    fn next_chunk(&mut self) -> Result<Option<Vec<i32>>, Box<dyn Error>> {
        while self.pending.len() < self.chunk_samples {
            match self.receiver.recv_timeout(READ_TIMEOUT) {
                Ok(Ok(data)) => self.pending.extend(data),
                Ok(Err(e)) => return Err(e.into()),
                Err(RecvTimeoutError::Timeout) => {
                    return Err("timed out waiting for audio input".into())
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(None),
            }
        }

        Ok(Some(self.pending.drain(..self.chunk_samples).collect()))
    }
}
