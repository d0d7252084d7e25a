//! Motor driver traits

use ticklink_protocol::Direction;

/// Errors that can occur with motor operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotorError {
    /// PWM output rejected the duty cycle
    Pwm,
    /// Direction pin could not be driven
    DirectionPin,
}

/// Base trait for the H-bridge motor drivers
pub trait MotorDriver {
    /// Run in `direction` at a raw duty (0–255)
    fn drive(&mut self, direction: Direction, duty: u8) -> Result<(), MotorError>;

    /// Stop the motor (duty 0)
    fn stop(&mut self);

    /// Direction while running
    fn direction(&self) -> Option<Direction>;

    /// Duty currently applied
    fn duty(&self) -> u8;

    /// Check if the motor is currently running
    fn is_running(&self) -> bool {
        self.direction().is_some()
    }
}

/// Interrupt-safe stop path
///
/// Called from the input interrupt when a trap fires, while the main
/// loop still owns the driver. Implementations write the PWM compare
/// register directly.
pub trait ForceStop {
    fn force_stop(&self, motor: u8);
}

impl<T: ForceStop + ?Sized> ForceStop for &T {
    fn force_stop(&self, motor: u8) {
        (**self).force_stop(motor)
    }
}
