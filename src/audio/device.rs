//! cpal device enumeration and lookup
//!
//! Device ids are `input:<name>` or `output:<name>`.

use cpal::traits::{DeviceTrait, HostTrait};

use crate::error::AudioError;

/// Listing entry for a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub is_input: bool,
    pub is_default: bool,
}

/// Direction of a device lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    fn prefix(self) -> &'static str {
        match self {
            Direction::Input => "input:",
            Direction::Output => "output:",
        }
    }
}

/// List every input and output device of the default host
pub fn list_devices() -> Vec<DeviceInfo> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    let default_input_name = host.default_input_device().and_then(|d| d.name().ok());
    let default_output_name = host.default_output_device().and_then(|d| d.name().ok());

    if let Ok(inputs) = host.input_devices() {
        for device in inputs {
            if let Ok(name) = device.name() {
                devices.push(DeviceInfo {
                    id: format!("{}{}", Direction::Input.prefix(), name),
                    is_default: default_input_name.as_ref() == Some(&name),
                    name,
                    is_input: true,
                });
            }
        }
    }

    if let Ok(outputs) = host.output_devices() {
        for device in outputs {
            if let Ok(name) = device.name() {
                devices.push(DeviceInfo {
                    id: format!("{}{}", Direction::Output.prefix(), name),
                    is_default: default_output_name.as_ref() == Some(&name),
                    name,
                    is_input: false,
                });
            }
        }
    }

    devices
}

/// Find a device by id, or the host default when `id` is `None`
pub fn find_device(direction: Direction, id: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();

    let Some(id) = id else {
        let device = match direction {
            Direction::Input => host.default_input_device(),
            Direction::Output => host.default_output_device(),
        };
        return device.ok_or_else(|| {
            AudioError::DeviceNotFound(format!("No default {:?} device", direction))
        });
    };

    // Bare names are accepted for hand-written configs
    let name = id.strip_prefix(direction.prefix()).unwrap_or(id);

    let devices = match direction {
        Direction::Input => host.input_devices(),
        Direction::Output => host.output_devices(),
    }
    .map_err(|e| AudioError::CpalError(e.to_string()))?;

    for device in devices {
        if device.name().map(|n| n == name).unwrap_or(false) {
            return Ok(device);
        }
    }

    Err(AudioError::DeviceNotFound(id.to_string()))
}
