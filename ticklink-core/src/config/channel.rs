//! Motor channel configuration
//!
//! Each of the three motor channels carries one [`DirectionProfile`] per
//! direction and an optional input channel whose ticks measure it.

use ticklink_protocol::{
    percent_to_duty, Direction, DirectionCalibration, MotorSetup, FULL_DUTY, INPUT_CHANNELS,
    MOTOR_CHANNELS,
};

use super::table::{CalibrationTable, TableError};

/// Duty mapping for one direction of one motor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DirectionProfile {
    /// Minimum duty that moves the motor at all
    pub min_duty: u8,
    pub table: CalibrationTable,
}

impl DirectionProfile {
    /// Profile with a minimum duty and an empty table
    pub const fn with_min(min_duty: u8) -> Self {
        Self {
            min_duty,
            table: CalibrationTable::new(),
        }
    }

    /// Build from a wire calibration string
    pub fn from_calibration(cal: &DirectionCalibration) -> Result<Self, TableError> {
        Ok(Self {
            min_duty: cal.min_duty,
            table: CalibrationTable::from_ladder(&cal.values)?,
        })
    }

    /// Output duty for a speed percentage (1–100)
    pub fn duty_for(&self, percent: u8) -> u8 {
        let raw = percent_to_duty(percent);
        let corrected = self.table.correct(raw) as u32;
        let min = self.min_duty as u32;
        let span = FULL_DUTY as u32 - min;
        (min + corrected * span / FULL_DUTY as u32) as u8
    }
}

/// Configuration of one motor channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorChannelConfig {
    pub forward: DirectionProfile,
    pub reverse: DirectionProfile,
    /// Input channel counting this motor's ticks
    pub input: Option<u8>,
}

impl MotorChannelConfig {
    /// Build from one `mot` group
    pub fn from_setup(setup: &MotorSetup) -> Result<Self, TableError> {
        Ok(Self {
            forward: DirectionProfile::from_calibration(&setup.forward)?,
            reverse: DirectionProfile::from_calibration(&setup.reverse)?,
            input: setup.input,
        })
    }

    pub fn profile(&self, direction: Direction) -> &DirectionProfile {
        match direction {
            Direction::Forward => &self.forward,
            Direction::Reverse => &self.reverse,
        }
    }

    /// Output duty for `percent` in `direction`
    pub fn duty_for(&self, direction: Direction, percent: u8) -> u8 {
        self.profile(direction).duty_for(percent)
    }

    /// Store calibrated minima and drop both correction tables
    pub fn set_minima(&mut self, forward: u8, reverse: u8) {
        self.forward = DirectionProfile::with_min(forward);
        self.reverse = DirectionProfile::with_min(reverse);
    }

    /// Input channel index, if mapped
    pub fn input_index(&self) -> Option<usize> {
        self.input
            .map(usize::from)
            .filter(|&i| i < INPUT_CHANNELS)
    }
}

/// Configuration of every motor channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelConfigs {
    channels: [MotorChannelConfig; MOTOR_CHANNELS],
}

impl ChannelConfigs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore every channel to the default (min 0, no tables, unmapped)
    pub fn restore_defaults(&mut self) {
        *self = Self::default();
    }

    pub fn get(&self, channel: usize) -> Option<&MotorChannelConfig> {
        self.channels.get(channel)
    }

    pub fn get_mut(&mut self, channel: usize) -> Option<&mut MotorChannelConfig> {
        self.channels.get_mut(channel)
    }

    /// Replace one channel's configuration
    pub fn apply(&mut self, channel: usize, config: MotorChannelConfig) -> bool {
        match self.channels.get_mut(channel) {
            Some(slot) => {
                *slot = config;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &MotorChannelConfig> {
        self.channels.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_maps_linearly() {
        let profile = DirectionProfile::default();
        assert_eq!(profile.duty_for(50), 0x7f);
        assert_eq!(profile.duty_for(100), 0xff);
        assert_eq!(profile.duty_for(1), 2);
    }

    #[test]
    fn test_min_duty_offsets_range() {
        let profile = DirectionProfile::with_min(55);
        assert_eq!(profile.duty_for(100), 255);
        // 55 + 127 * 200 / 255
        assert_eq!(profile.duty_for(50), 154);
    }

    #[test]
    fn test_table_applied_before_min() {
        let mut profile = DirectionProfile::with_min(0);
        profile.table = CalibrationTable::from_ladder(&[10, 20, 30, 40, 200]).unwrap();
        // ladder key for 50% is 127
        assert_eq!(profile.duty_for(50), 200);
        assert_eq!(profile.duty_for(100), 200);
    }

    #[test]
    fn test_from_setup() {
        let mut setup = MotorSetup::new(0, Some(1));
        setup.forward = DirectionCalibration::parse("3c~40~80", 0).unwrap();
        setup.reverse = DirectionCalibration::uncorrected(0x20);
        let config = MotorChannelConfig::from_setup(&setup).unwrap();
        assert_eq!(config.forward.min_duty, 0x3c);
        assert_eq!(config.forward.table.len(), 2);
        assert!(config.reverse.table.is_empty());
        assert_eq!(config.input_index(), Some(1));
    }

    #[test]
    fn test_set_minima_clears_tables() {
        let mut config = MotorChannelConfig::default();
        config.forward.table = CalibrationTable::from_ladder(&[1, 2]).unwrap();
        config.set_minima(40, 50);
        assert_eq!(config.forward, DirectionProfile::with_min(40));
        assert_eq!(config.reverse, DirectionProfile::with_min(50));
    }

    #[test]
    fn test_restore_defaults() {
        let mut configs = ChannelConfigs::new();
        let mut custom = MotorChannelConfig::default();
        custom.input = Some(0);
        assert!(configs.apply(2, custom));
        assert!(!configs.apply(3, MotorChannelConfig::default()));
        configs.restore_defaults();
        assert_eq!(configs.get(2), Some(&MotorChannelConfig::default()));
    }
}
