//! Calibration strings
//!
//! One direction of one motor channel is described by
//! `<minHex>(~<hex>){N}`: the minimum working duty followed by the
//! corrected duty for the first `N` ladder steps. The same text is used
//! inside `mot` command fields and as the persisted calibration artifact.

use core::fmt;

use heapless::Vec;

use crate::fields::{parse_hex, FieldError};

/// Separator between values of one calibration string
pub const CAL_SEP: char = '~';

/// Speed percentages sampled during calibration, in order
pub const CALIBRATION_LADDER: [u8; 10] = [10, 20, 30, 40, 50, 60, 70, 80, 90, 100];

/// Maximum corrected values per direction
pub const MAX_CAL_POINTS: usize = CALIBRATION_LADDER.len();

/// Full-scale duty value
pub const FULL_DUTY: u8 = 255;

/// Linear percent → duty scaling (step (a) of the duty mapping)
pub const fn percent_to_duty(percent: u8) -> u8 {
    let p = if percent > 100 { 100 } else { percent };
    (p as u16 * FULL_DUTY as u16 / 100) as u8
}

/// Table key for the ladder step at `index`
pub fn ladder_level(index: usize) -> Option<u8> {
    CALIBRATION_LADDER.get(index).map(|&p| percent_to_duty(p))
}

/// Calibration of one motor direction as carried on the wire
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DirectionCalibration {
    /// Minimum duty that reliably moves the motor
    pub min_duty: u8,
    /// Corrected duty for each ladder step, in ladder order
    pub values: Vec<u8, MAX_CAL_POINTS>,
}

impl DirectionCalibration {
    /// Calibration with a minimum duty and no correction table
    pub fn uncorrected(min_duty: u8) -> Self {
        Self {
            min_duty,
            values: Vec::new(),
        }
    }

    /// Parse a calibration string located at `offset` inside a line
    pub fn parse(text: &str, offset: usize) -> Result<Self, FieldError> {
        let mut parts = text.split(CAL_SEP);
        let mut pos = offset;

        // split() always yields at least one item
        let min_text = parts.next().unwrap_or("");
        let min_duty = parse_hex(min_text, 2).map_err(|e| e.at(pos))? as u8;
        pos += min_text.len() + 1;

        let mut values = Vec::new();
        for part in parts {
            let value = parse_hex(part, 2).map_err(|e| e.at(pos))? as u8;
            values
                .push(value)
                .map_err(|_| FieldError::Overflow { offset: pos })?;
            pos += part.len() + 1;
        }

        Ok(Self { min_duty, values })
    }
}

impl fmt::Display for DirectionCalibration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.min_duty)?;
        for value in &self.values {
            write!(f, "{}{:x}", CAL_SEP, value)?;
        }
        Ok(())
    }
}
