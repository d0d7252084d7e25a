//! Motor driver implementations
//!
//! - DC motor on an H-bridge (PWM + direction pin)
//! - Calibration engine (minimum duty search, ladder sampling, polarity)
//! - Tick-counted servo moves

pub mod calibrate;
pub mod dc;
pub mod servo;

pub use calibrate::{search_min_duty, CalibrationError, ProbeRig};
pub use dc::{DcMotor, DcMotorConfig};
pub use servo::{start_servo, ServoMove, ServoStart};
