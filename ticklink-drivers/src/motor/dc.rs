//! DC motor driver for an H-bridge with a PWM input and a direction pin
//!
//! This driver provides:
//! - PWM duty control with the full 0-255 duty range
//! - Direction control through one output pin
//! - Optional direction inversion for motors wired backwards
//!
//! The driver never ramps: a trap must be able to stop the motor on the
//! exact tick it fires, and the board's force-stop path writes the PWM
//! output directly.
//!
//! ```ignore
//! let mut motor = DcMotor::new(pwm, dir_pin, DcMotorConfig::default());
//! motor.drive(Direction::Forward, 0x7f)?;
//! motor.stop();
//! ```

use embedded_hal::digital::OutputPin;
use embedded_hal::pwm::{Error as _, SetDutyCycle};

use ticklink_core::traits::{MotorDriver, MotorError};
use ticklink_protocol::{Direction, FULL_DUTY};

/// DC motor driver configuration
#[derive(Debug, Clone, Default)]
pub struct DcMotorConfig {
    /// Swap the direction pin level
    pub invert_direction: bool,
}

/// DC motor driver state
pub struct DcMotor<P, D> {
    pwm: P,
    dir_pin: D,
    config: DcMotorConfig,
    /// Current direction, `None` while stopped
    direction: Option<Direction>,
    /// Duty currently applied to the PWM output
    duty: u8,
}

impl<P: SetDutyCycle, D: OutputPin> DcMotor<P, D> {
    /// Create a new DC motor driver; the output starts fully off
    pub fn new(pwm: P, dir_pin: D, config: DcMotorConfig) -> Self {
        let mut motor = Self {
            pwm,
            dir_pin,
            config,
            direction: None,
            duty: 0,
        };
        motor.stop();
        motor
    }

    /// Get the configuration
    pub fn config(&self) -> &DcMotorConfig {
        &self.config
    }

    /// Release the PWM output and direction pin
    pub fn release(self) -> (P, D) {
        (self.pwm, self.dir_pin)
    }

    /// Forget the running state after the output was stopped elsewhere
    ///
    /// Used once a trap force-stopped the motor from the interrupt path.
    pub fn mark_stopped(&mut self) {
        self.direction = None;
        self.duty = 0;
    }

    fn set_direction_pin(&mut self, direction: Direction) -> Result<(), MotorError> {
        let high = (direction == Direction::Forward) != self.config.invert_direction;
        let result = if high {
            self.dir_pin.set_high()
        } else {
            self.dir_pin.set_low()
        };
        result.map_err(|_| MotorError::DirectionPin)
    }

    fn set_pwm(&mut self, duty: u8) -> Result<(), MotorError> {
        self.pwm
            .set_duty_cycle_fraction(duty as u16, FULL_DUTY as u16)
            .map_err(|_| MotorError::Pwm)
    }
}

impl<P: SetDutyCycle, D: OutputPin> MotorDriver for DcMotor<P, D> {
    fn drive(&mut self, direction: Direction, duty: u8) -> Result<(), MotorError> {
        if self.direction != Some(direction) {
            // Never reverse the bridge under load
            self.set_pwm(0)?;
            self.set_direction_pin(direction)?;
        }
        self.set_pwm(duty)?;
        self.direction = Some(direction);
        self.duty = duty;
        Ok(())
    }

    fn stop(&mut self) {
        if let Err(e) = self.pwm.set_duty_cycle_fully_off() {
            log::warn!("pwm did not switch off: {:?}", e.kind());
        }
        self.mark_stopped();
    }

    fn direction(&self) -> Option<Direction> {
        self.direction
    }

    fn duty(&self) -> u8 {
        self.duty
    }
}


#[cfg(test)]
mod tests {
    use super::mock::{MockPin, MockPwm};
    use super::*;

    fn motor() -> DcMotor<MockPwm, MockPin> {
        DcMotor::new(MockPwm::default(), MockPin::default(), DcMotorConfig::default())
    }

    #[test]
    fn test_initial_state() {
        let motor = motor();
        assert!(!motor.is_running());
        assert_eq!(motor.duty(), 0);
        assert_eq!(motor.direction(), None);
    }

    #[test]
    fn test_drive_scales_duty() {
        let mut motor = motor();
        motor.drive(Direction::Forward, 255).unwrap();
        assert_eq!(motor.duty(), 255);
        assert!(motor.is_running());
        let (pwm, pin) = motor.release();
        assert_eq!(pwm.duty, 1000);
        assert!(pin.high);
    }

    #[test]
    fn test_reverse_sets_pin_low() {
        let mut motor = motor();
        motor.drive(Direction::Reverse, 0x7f).unwrap();
        assert_eq!(motor.direction(), Some(Direction::Reverse));
        let (pwm, pin) = motor.release();
        // 127 * 1000 / 255
        assert_eq!(pwm.duty, 498);
        assert!(!pin.high);
    }

    #[test]
    fn test_inverted_direction() {
        let config = DcMotorConfig {
            invert_direction: true,
        };
        let mut motor = DcMotor::new(MockPwm::default(), MockPin::default(), config);
        motor.drive(Direction::Forward, 10).unwrap();
        let (_, pin) = motor.release();
        assert!(!pin.high);
    }

    #[test]
    fn test_stop() {
        let mut motor = motor();
        motor.drive(Direction::Forward, 200).unwrap();
        motor.stop();
        assert!(!motor.is_running());
        assert_eq!(motor.duty(), 0);
        let (pwm, _) = motor.release();
        assert_eq!(pwm.duty, 0);
    }

    #[test]
    fn test_stop_with_broken_output() {
        let mut motor = motor();
        motor.drive(Direction::Forward, 200).unwrap();
        let (mut pwm, pin) = motor.release();
        pwm.broken = true;

        let mut motor = DcMotor::new(pwm, pin, DcMotorConfig::default());
        assert_eq!(motor.drive(Direction::Reverse, 10), Err(MotorError::Pwm));
        motor.stop();
        assert!(!motor.is_running());
        assert_eq!(motor.duty(), 0);
    }

    #[test]
    fn test_same_direction_skips_bridge_off() {
        let mut motor = motor();
        motor.drive(Direction::Forward, 100).unwrap();
        motor.drive(Direction::Forward, 150).unwrap();
        let (pwm, _) = motor.release();
        // stop() in new, off + on for the first drive, one write for the second
        assert_eq!(pwm.writes, 4);
    }
}
