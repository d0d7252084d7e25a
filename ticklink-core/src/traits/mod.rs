//! Hardware abstraction traits
//!
//! These traits define the interface between the interpreter and the
//! board-specific implementations. PWM, pins and delays use
//! `embedded-hal` directly.

pub mod clock;
pub mod motor;

pub use clock::Clock;
pub use motor::{ForceStop, MotorDriver, MotorError};
