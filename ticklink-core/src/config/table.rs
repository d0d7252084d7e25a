//! Duty correction tables
//!
//! A table maps a raw duty level (the linear percent scaling) to the duty
//! that actually produces that fraction of full speed. Keys are strictly
//! increasing; lookups between keys interpolate linearly.

use heapless::Vec;

use ticklink_protocol::{ladder_level, MAX_CAL_POINTS};

/// Errors building a correction table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TableError {
    /// More than [`MAX_CAL_POINTS`] entries
    Full,
    /// Key not greater than the previous key
    NotIncreasing,
}

/// One table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TablePoint {
    /// Raw duty level
    pub level: u8,
    /// Corrected duty at that level
    pub duty: u8,
}

/// Correction table for one direction of one motor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationTable {
    points: Vec<TablePoint, MAX_CAL_POINTS>,
}

impl CalibrationTable {
    /// Empty table (identity mapping)
    pub const fn new() -> Self {
        Self { points: Vec::new() }
    }

    /// Table keyed by the calibration ladder
    ///
    /// `values[i]` is the corrected duty for ladder step `i`.
    pub fn from_ladder(values: &[u8]) -> Result<Self, TableError> {
        let mut table = Self::new();
        for (i, &duty) in values.iter().enumerate() {
            let level = ladder_level(i).ok_or(TableError::Full)?;
            table.push(level, duty)?;
        }
        Ok(table)
    }

    /// Append an entry; keys must be strictly increasing
    pub fn push(&mut self, level: u8, duty: u8) -> Result<(), TableError> {
        if let Some(last) = self.points.last() {
            if level <= last.level {
                return Err(TableError::NotIncreasing);
            }
        }
        self.points
            .push(TablePoint { level, duty })
            .map_err(|_| TableError::Full)
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn points(&self) -> &[TablePoint] {
        &self.points
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Corrected duty for a raw level
    ///
    /// Exact keys return their stored value, levels between keys are
    /// interpolated, levels below the first key are interpolated from
    /// (0, 0) and levels above the last key take the last value.
    pub fn correct(&self, raw: u8) -> u8 {
        let Some(last) = self.points.last() else {
            return raw;
        };
        if raw >= last.level {
            return last.duty;
        }

        let mut lower = TablePoint { level: 0, duty: 0 };
        for &upper in self.points.iter() {
            if raw == upper.level {
                return upper.duty;
            }
            if raw < upper.level {
                return interpolate(lower, upper, raw);
            }
            lower = upper;
        }
        last.duty
    }
}

fn interpolate(lower: TablePoint, upper: TablePoint, raw: u8) -> u8 {
    let span = upper.level as i32 - lower.level as i32;
    if span <= 0 {
        return upper.duty;
    }
    let offset = raw as i32 - lower.level as i32;
    let rise = upper.duty as i32 - lower.duty as i32;
    (lower.duty as i32 + rise * offset / span).clamp(0, 255) as u8
}
