//! Tick-counted moves ("traps")
//!
//! A servo move resets the mapped counter, arms a trap for the target
//! tick count and starts the motor. The input interrupt stops the motor
//! once the target is reached.

use ticklink_core::config::MotorChannelConfig;
use ticklink_core::traits::{MotorDriver, MotorError};
use ticklink_core::{ArmOutcome, TickShared, Trap};
use ticklink_protocol::Direction;

/// Result of starting a servo move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ServoStart {
    /// Trap armed and motor running
    Started,
    /// A trap was already armed on the mapped input; nothing changed
    Ignored,
    /// The channel has no input mapping; the motor was stopped
    Unmapped,
}

/// A servo move request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServoMove {
    pub motor: u8,
    pub direction: Direction,
    pub percent: u8,
    pub target: u16,
}

/// Arm the trap for `request` and start the motor
pub fn start_servo<M: MotorDriver>(
    driver: &mut M,
    ticks: &TickShared,
    config: &MotorChannelConfig,
    request: ServoMove,
) -> Result<ServoStart, MotorError> {
    let Some(input) = config.input_index() else {
        driver.stop();
        return Ok(ServoStart::Unmapped);
    };

    let trap = Trap {
        target: request.target,
        motor: request.motor,
    };
    match ticks.arm(input, trap) {
        ArmOutcome::Armed => {}
        ArmOutcome::AlreadyArmed => return Ok(ServoStart::Ignored),
        ArmOutcome::NoInput => {
            driver.stop();
            return Ok(ServoStart::Unmapped);
        }
    }

    let duty = config.duty_for(request.direction, request.percent);
    if let Err(e) = driver.drive(request.direction, duty) {
        ticks.disarm_motor(request.motor);
        driver.stop();
        return Err(e);
    }
    Ok(ServoStart::Started)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::calibrate::sim::{SimMotor, World};

    fn request(target: u16) -> ServoMove {
        ServoMove {
            motor: 0,
            direction: Direction::Forward,
            percent: 50,
            target,
        }
    }

    fn mapped(input: u8) -> MotorChannelConfig {
        MotorChannelConfig {
            input: Some(input),
            ..Default::default()
        }
    }

    #[test]
    fn test_unmapped_stops_motor() {
        let world = World::new(0, 0);
        let mut motor = SimMotor(&world);
        motor.drive(Direction::Reverse, 200).unwrap();
        let ticks = TickShared::new();
        let result = start_servo(&mut motor, &ticks, &MotorChannelConfig::default(), request(100));
        assert_eq!(result, Ok(ServoStart::Unmapped));
        assert!(!motor.is_running());
    }

    #[test]
    fn test_started_then_trapped() {
        let world = World::new(0, 0);
        let mut motor = SimMotor(&world);
        let ticks = TickShared::new();
        ticks.on_tick(1, &world);

        let result = start_servo(&mut motor, &ticks, &mapped(1), request(2));
        assert_eq!(result, Ok(ServoStart::Started));
        assert_eq!(ticks.count(1), 0);
        assert_eq!(motor.duty(), 0x7f);

        ticks.on_tick(1, &world);
        ticks.on_tick(1, &world);
        assert_eq!(world.duty.get(), 0);
        assert_eq!(ticks.take_events(), 1);
    }

    #[test]
    fn test_rearm_ignored() {
        let world = World::new(0, 0);
        let mut motor = SimMotor(&world);
        let ticks = TickShared::new();
        start_servo(&mut motor, &ticks, &mapped(0), request(50)).unwrap();
        let mut second = request(5);
        second.direction = Direction::Reverse;
        assert_eq!(
            start_servo(&mut motor, &ticks, &mapped(0), second),
            Ok(ServoStart::Ignored)
        );
        assert_eq!(motor.direction(), Some(Direction::Forward));
        assert_eq!(ticks.trap(0).map(|t| t.target), Some(50));
    }
}
