//! Host error types

use std::time::Duration;

use thiserror::Error;
use ticklink_protocol::{DeviceError, Direction};

/// Errors raised by a host session
#[derive(Debug, Error)]
pub enum HostError {
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("no answer within {0:?}")]
    Timeout(Duration),

    #[error("device replied {0}")]
    Device(#[from] DeviceError),

    #[error("unexpected line `{line}`: {reason}")]
    Protocol { line: String, reason: String },

    #[error("device handshake failed: {0}")]
    InitFailed(String),

    #[error("calibration of motor {channel} failed ({direction:?}, step {step:?})")]
    CalibrationFailed {
        channel: u8,
        direction: Option<Direction>,
        step: Option<u8>,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("link to the device is closed")]
    Disconnected,
}

impl HostError {
    pub(crate) fn protocol(line: &str, reason: impl ToString) -> Self {
        HostError::Protocol {
            line: line.to_string(),
            reason: reason.to_string(),
        }
    }

    /// The device error behind this failure, if any
    pub fn device_error(&self) -> Option<DeviceError> {
        match self {
            HostError::Device(e) => Some(*e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, HostError>;
